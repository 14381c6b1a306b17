use tokio::sync::broadcast;
use url::Url;

use crate::models::AuthenticatedUser;

/// Lifecycle notifications an identity provider emits, in dispatch order.
#[derive(Debug, Clone)]
pub enum ProviderEvent {
    /// A user record became available (sign-in callback or silent renewal).
    UserLoaded(Box<AuthenticatedUser>),
    /// The user record was removed (sign-out).
    UserUnloaded,
    /// The stored access token was observed past its expiry.
    AccessTokenExpired,
    /// A silent renewal attempt failed.
    SilentRenewError(String),
}

/// An identity strategy (OIDC redirect flow, hosted login widget, ...).
///
/// Exactly one implementation is active per process. All methods are
/// asynchronous and report failures as strings; callers decide whether a
/// failure means "not authenticated" or something to surface.
#[async_trait::async_trait]
pub trait IdentityProvider: Send + Sync {
    fn get_name(&self) -> &str;
    fn get_type(&self) -> &str;

    /// Claims beyond `role`/`roles`/`groups` that carry role names for this provider.
    fn role_claims(&self) -> &[String] {
        &[]
    }

    /// The current user record, if any. Does not renew.
    async fn get_user(&self) -> Result<Option<AuthenticatedUser>, String>;

    /// Prepare an interactive sign-in and return the URL to navigate to.
    async fn signin_redirect(&self) -> Result<Url, String>;

    /// Complete an interactive sign-in with the values from the redirect callback.
    async fn handle_callback(&self, code: &str, state: &str) -> Result<AuthenticatedUser, String>;

    /// Obtain a fresh user record without user interaction.
    async fn signin_silent(&self) -> Result<AuthenticatedUser, String>;

    /// Drop the local user record and return the provider's logout URL, if it has one.
    async fn signout_redirect(&self) -> Result<Option<Url>, String>;

    fn subscribe(&self) -> broadcast::Receiver<ProviderEvent>;
}
