pub mod credential;
pub mod entities;
pub mod role;
pub mod user;

pub use credential::Credential;
pub use entities::*;
pub use role::{Role, RoleSet};
pub use user::AuthenticatedUser;
