//! The session context: who is signed in and what they may do.

pub mod context;
pub mod navigator;
pub mod roles;

pub use context::{SessionContext, SessionSnapshot, SessionState};
pub use navigator::{LogNavigator, Navigator};
pub use roles::{resolve_roles, RoleResolutionError};
