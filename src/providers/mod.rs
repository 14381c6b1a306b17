pub mod base;
pub mod hosted_provider;
pub mod oauth;
pub mod oidc_provider;
pub mod providers;
pub mod token_provider;

// Re-export so we can do "use crate::providers::*;"
pub use base::{IdentityProvider, ProviderEvent};
pub use providers::*;
pub use token_provider::{TokenProvider, TokenSource};
