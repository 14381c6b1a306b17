use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::base::IdentityProvider;
use crate::models::Credential;
use crate::utils::log_throttle::{FailureThrottle, Report};

const FAILURE_LOG_WINDOW: Duration = Duration::from_secs(30);

/// Source of bearer credentials for outgoing requests.
///
/// `None` always means "not authenticated"; failures never propagate.
#[async_trait::async_trait]
pub trait TokenSource: Send + Sync {
    /// A currently valid credential, renewing silently when the cached one is
    /// expired or about to expire.
    async fn get_token(&self) -> Option<Credential>;

    /// A credential other than `stale`, renewing unless someone else already did.
    async fn renew_token(&self, stale: Option<&Credential>) -> Option<Credential>;
}

/// Hands out the active identity provider's access token.
pub struct TokenProvider {
    provider: Arc<dyn IdentityProvider>,
    renew_skew: chrono::Duration,
    timeout: Duration,
    /// Serializes renewals so concurrent callers share one refresh.
    renewal: Mutex<()>,
    failures: FailureThrottle,
}

impl TokenProvider {
    pub fn new(
        provider: Arc<dyn IdentityProvider>,
        renew_skew: chrono::Duration,
        timeout: Duration,
    ) -> Self {
        Self {
            provider,
            renew_skew,
            timeout,
            renewal: Mutex::new(()),
            failures: FailureThrottle::new(FAILURE_LOG_WINDOW),
        }
    }

    /// Run a provider call under the configured timeout, reducing failures to `None`.
    async fn bounded<T, F>(&self, what: &'static str, fut: F) -> Option<T>
    where
        F: Future<Output = Result<T, String>>,
    {
        let error = match timeout(self.timeout, fut).await {
            Ok(Ok(value)) => {
                if let Some(failures) = self.failures.success(what) {
                    info!(
                        provider = self.provider.get_name(),
                        "Identity provider {} recovered after {} failures", what, failures
                    );
                }
                return Some(value);
            }
            Ok(Err(e)) => e,
            Err(_) => format!("timed out after {:?}", self.timeout),
        };

        match self.failures.failure(what) {
            Report::Warn { failures, silenced } => warn!(
                provider = self.provider.get_name(),
                failures, silenced, "Identity provider {} failed: {}", what, error
            ),
            Report::Silent => debug!("Identity provider {} failed: {}", what, error),
        }
        None
    }

    async fn current(&self) -> Option<Credential> {
        self.bounded("get_user", self.provider.get_user())
            .await
            .flatten()
            .map(|user| user.credential)
    }

    async fn renew_after(&self, stale: Option<&str>) -> Option<Credential> {
        let _guard = self.renewal.lock().await;

        if let Some(current) = self.current().await {
            let replaced = stale != Some(current.access_token.as_str());
            if replaced && !current.is_expiring(self.renew_skew) {
                debug!("Credential was renewed by a concurrent caller");
                return Some(current);
            }
        }

        self.bounded("signin_silent", self.provider.signin_silent())
            .await
            .map(|user| user.credential)
    }
}

#[async_trait::async_trait]
impl TokenSource for TokenProvider {
    async fn get_token(&self) -> Option<Credential> {
        let credential = self.current().await?;
        if !credential.is_expiring(self.renew_skew) {
            return Some(credential);
        }
        debug!("Credential is expiring, renewing silently");
        self.renew_after(Some(&credential.access_token)).await
    }

    async fn renew_token(&self, stale: Option<&Credential>) -> Option<Credential> {
        self.renew_after(stale.map(|c| c.access_token.as_str())).await
    }
}
