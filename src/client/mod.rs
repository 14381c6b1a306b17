//! The authenticated request pipeline every backend call goes through.

pub mod error;
pub mod pipeline;

pub use error::ApiError;
pub use pipeline::{ApiClient, ReauthTrigger};
