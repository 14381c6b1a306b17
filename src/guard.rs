use std::future::Future;
use std::sync::Arc;
use tracing::debug;

use crate::session::{SessionContext, SessionState};

/// What a protected view should show right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardDecision {
    /// Show a neutral waiting indicator.
    Waiting,
    /// Show the protected content.
    Render,
}

#[derive(Debug, PartialEq, Eq)]
pub enum Guarded<T> {
    Waiting,
    Rendered(T),
}

/// Gate in front of protected views.
///
/// Holds content back until the session has settled and starts a login when
/// it settled unauthenticated. Role checks are left to the views.
pub struct ViewGuard {
    session: Arc<SessionContext>,
}

impl ViewGuard {
    pub fn new(session: Arc<SessionContext>) -> Self {
        Self { session }
    }

    pub async fn check(&self) -> GuardDecision {
        match self.session.snapshot().state {
            SessionState::Unsettled => GuardDecision::Waiting,
            SessionState::Authenticated => GuardDecision::Render,
            SessionState::Unauthenticated => {
                if self.session.request_login().await {
                    debug!("Protected view requested without a session, started login");
                }
                GuardDecision::Waiting
            }
        }
    }

    /// Produce the protected content only when the session allows it.
    pub async fn render<T, F, Fut>(&self, content: F) -> Guarded<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        match self.check().await {
            GuardDecision::Waiting => Guarded::Waiting,
            GuardDecision::Render => Guarded::Rendered(content().await),
        }
    }

    /// Wait for the session to settle, then decide once.
    pub async fn settled(&self) -> GuardDecision {
        self.session.wait_settled().await;
        self.check().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::token_provider::tests::{user_with, FakeProvider};
    use crate::providers::ProviderEvent;
    use crate::client::ReauthTrigger;
    use crate::session::context::tests::session;

    #[tokio::test]
    async fn unsettled_session_shows_waiting_without_login() {
        let (ctx, nav) = session(FakeProvider::new(None, true));
        let guard = ViewGuard::new(ctx);
        assert_eq!(guard.check().await, GuardDecision::Waiting);
        assert!(nav.visits.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn unauthenticated_visit_logs_in_once_then_renders() {
        let (ctx, nav) = session(FakeProvider::new(None, true));
        ctx.initialize().await;
        let guard = ViewGuard::new(ctx.clone());

        assert_eq!(guard.settled().await, GuardDecision::Waiting);
        assert_eq!(guard.render(|| async { "roster" }).await, Guarded::Waiting);
        assert_eq!(nav.visits.lock().unwrap().len(), 1);

        // Provider callback with a valid identity.
        ctx.apply(ProviderEvent::UserLoaded(Box::new(user_with("a", 3600))));

        assert_eq!(
            guard.render(|| async { "roster" }).await,
            Guarded::Rendered("roster")
        );
        assert!(ctx.is_authenticated());
        assert_eq!(nav.visits.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn next_unauthenticated_episode_logs_in_again() {
        let (ctx, nav) = session(FakeProvider::new(None, true));
        ctx.initialize().await;
        let guard = ViewGuard::new(ctx.clone());

        guard.check().await;
        ctx.apply(ProviderEvent::UserLoaded(Box::new(user_with("a", 3600))));
        guard.check().await;
        ctx.apply(ProviderEvent::AccessTokenExpired);
        guard.check().await;

        assert_eq!(nav.visits.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn failed_renewal_redirects_once_across_pipeline_and_guard() {
        let (ctx, nav) = session(FakeProvider::new(Some(("t1", 3600)), true));
        ctx.initialize().await;
        let guard = ViewGuard::new(ctx.clone());
        assert_eq!(guard.check().await, GuardDecision::Render);

        // The pipeline gives up on a 401 before the renewal error is applied.
        ReauthTrigger::reauthenticate(ctx.as_ref()).await;
        ctx.apply(ProviderEvent::SilentRenewError("invalid_grant".into()));

        assert_eq!(guard.check().await, GuardDecision::Waiting);
        assert_eq!(guard.check().await, GuardDecision::Waiting);
        assert_eq!(nav.visits.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn stalled_login_start_leaves_view_waiting() {
        let mut fake = FakeProvider::new(None, true);
        fake.redirect_delay = std::time::Duration::from_secs(30);
        let (ctx, nav) = session(fake);
        ctx.initialize().await;
        let guard = ViewGuard::new(ctx.clone());

        assert_eq!(guard.check().await, GuardDecision::Waiting);
        assert!(nav.visits.lock().unwrap().is_empty());
        assert!(!ctx.snapshot().is_authenticated());
    }
}
