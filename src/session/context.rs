use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::navigator::Navigator;
use super::roles::resolve_roles;
use crate::models::{AuthenticatedUser, Role, RoleSet};
use crate::providers::{IdentityProvider, ProviderEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// The identity check has not completed yet.
    Unsettled,
    Authenticated,
    Unauthenticated,
}

/// A consistent view of the session at one point in time.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub user: Option<AuthenticatedUser>,
    pub roles: RoleSet,
    /// Number of login attempts that have settled so far.
    pub settle_count: u64,
    attempt: u64,
    settled_attempt: Option<u64>,
}

impl SessionSnapshot {
    fn unsettled() -> Self {
        Self {
            state: SessionState::Unsettled,
            user: None,
            roles: RoleSet::new(),
            settle_count: 0,
            attempt: 0,
            settled_attempt: None,
        }
    }

    pub fn is_loading(&self) -> bool {
        self.state == SessionState::Unsettled
    }

    pub fn is_authenticated(&self) -> bool {
        self.state == SessionState::Authenticated
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    pub fn has_any_role(&self, roles: &[Role]) -> bool {
        roles.iter().any(|r| self.has_role(*r))
    }

    fn settle(&mut self, state: SessionState) {
        self.state = state;
        if self.settled_attempt != Some(self.attempt) {
            self.settled_attempt = Some(self.attempt);
            self.settle_count += 1;
        }
    }
}

/// Single source of truth for the signed-in user and their roles.
///
/// Created once at startup, shared as `Arc<SessionContext>`, and driven by the
/// identity provider's events. Every provider call is bounded by `timeout`.
pub struct SessionContext {
    provider: Arc<dyn IdentityProvider>,
    navigator: Arc<dyn Navigator>,
    state: watch::Sender<SessionSnapshot>,
    timeout: Duration,
    /// Set once a login was requested since the session was last authenticated.
    login_requested: AtomicBool,
}

impl SessionContext {
    pub fn new(
        provider: Arc<dyn IdentityProvider>,
        navigator: Arc<dyn Navigator>,
        timeout: Duration,
    ) -> Self {
        let (state, _) = watch::channel(SessionSnapshot::unsettled());
        Self {
            provider,
            navigator,
            state,
            timeout,
            login_requested: AtomicBool::new(false),
        }
    }

    async fn bounded<T, F>(&self, what: &str, fut: F) -> Result<T, String>
    where
        F: Future<Output = Result<T, String>>,
    {
        tokio::time::timeout(self.timeout, fut)
            .await
            .map_err(|_| format!("{} timed out after {:?}", what, self.timeout))?
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.state.borrow().clone()
    }

    /// Receive every subsequent change of the session.
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.state.subscribe()
    }

    pub fn is_loading(&self) -> bool {
        self.state.borrow().is_loading()
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.borrow().is_authenticated()
    }

    pub fn roles(&self) -> RoleSet {
        self.state.borrow().roles.clone()
    }

    pub fn user(&self) -> Option<AuthenticatedUser> {
        self.state.borrow().user.clone()
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.state.borrow().has_role(role)
    }

    /// Like [`has_role`](Self::has_role) for a role name; unrecognized names are never held.
    pub fn has_role_named(&self, role: &str) -> bool {
        role.parse::<Role>().is_ok_and(|r| self.has_role(r))
    }

    pub fn has_any_role(&self, roles: &[Role]) -> bool {
        self.state.borrow().has_any_role(roles)
    }

    /// Wait until the first identity check has completed.
    pub async fn wait_settled(&self) -> SessionSnapshot {
        let mut rx = self.state.subscribe();
        let settled = match rx.wait_for(|s| !s.is_loading()).await {
            Ok(snapshot) => snapshot.clone(),
            Err(_) => self.snapshot(),
        };
        settled
    }

    /// Resolve the provider's current user once and settle accordingly.
    ///
    /// Without a stored user a silent sign-in is attempted, so a session can
    /// resume from a refresh token.
    pub async fn initialize(&self) {
        debug!(
            "Initializing session with identity provider '{}'",
            self.provider.get_name()
        );
        let user = match self.bounded("get_user", self.provider.get_user()).await {
            Ok(Some(user)) => Some(user),
            Ok(None) => match self
                .bounded("signin_silent", self.provider.signin_silent())
                .await
            {
                Ok(user) => Some(user),
                Err(e) => {
                    debug!("No session to resume: {}", e);
                    None
                }
            },
            Err(e) => {
                warn!("Identity provider could not report the current user: {}", e);
                None
            }
        };

        match user {
            Some(user) => self.apply(ProviderEvent::UserLoaded(Box::new(user))),
            None => self.apply(ProviderEvent::UserUnloaded),
        }
    }

    /// Apply one identity-provider event.
    pub fn apply(&self, event: ProviderEvent) {
        match event {
            ProviderEvent::UserLoaded(user) => {
                let roles = self.derive_roles(&user);
                info!(
                    "Session authenticated for '{}' with roles {:?}",
                    user.username(),
                    roles
                );
                let mut resumed = false;
                self.state.send_modify(|s| {
                    resumed = !s.is_authenticated();
                    s.user = Some(*user);
                    s.roles = roles;
                    s.settle(SessionState::Authenticated);
                });
                if resumed {
                    self.login_requested.store(false, Ordering::SeqCst);
                }
            }
            other => {
                match &other {
                    ProviderEvent::SilentRenewError(e) => {
                        warn!("Session ended after failed silent renewal: {}", e)
                    }
                    ProviderEvent::AccessTokenExpired => debug!("Session access token expired"),
                    _ => debug!("Session user unloaded"),
                }
                self.state.send_modify(|s| {
                    s.user = None;
                    s.roles.clear();
                    s.settle(SessionState::Unauthenticated);
                });
            }
        }
    }

    fn derive_roles(&self, user: &AuthenticatedUser) -> RoleSet {
        match resolve_roles(&user.claims, self.provider.role_claims()) {
            Ok(roles) => roles,
            Err(e) => {
                warn!("Could not resolve roles for '{}': {}", user.username(), e);
                RoleSet::new()
            }
        }
    }

    /// Consume provider events in delivery order until the provider goes away.
    pub async fn run(self: Arc<Self>, mut events: broadcast::Receiver<ProviderEvent>) {
        loop {
            match events.recv().await {
                Ok(event) => self.apply(event),
                Err(RecvError::Lagged(missed)) => {
                    warn!("Session missed {} identity events, resynchronizing", missed);
                    match self.bounded("get_user", self.provider.get_user()).await {
                        Ok(Some(user)) => self.apply(ProviderEvent::UserLoaded(Box::new(user))),
                        _ => self.apply(ProviderEvent::UserUnloaded),
                    }
                }
                Err(RecvError::Closed) => break,
            }
        }
        debug!("Identity event stream closed");
    }

    /// Subscribe to the provider and apply its events on a background task.
    pub fn spawn_event_loop(self: &Arc<Self>) -> JoinHandle<()> {
        let events = self.provider.subscribe();
        tokio::spawn(Arc::clone(self).run(events))
    }

    /// Start an interactive login. The state changes only once the provider
    /// reports the outcome.
    pub async fn login(&self) -> Result<(), String> {
        self.state.send_modify(|s| s.attempt += 1);
        let url = self
            .bounded("signin_redirect", self.provider.signin_redirect())
            .await
            .map_err(|e| {
                warn!("Could not start login: {}", e);
                e
            })?;
        info!("Redirecting to identity provider for login");
        self.navigator.navigate(&url);
        Ok(())
    }

    /// Start a login unless one was already requested since the session was
    /// last authenticated. Returns whether a redirect happened.
    ///
    /// Protected views and the request pipeline both go through here, so one
    /// lost session leads to one redirect.
    pub async fn request_login(&self) -> bool {
        if self.login_requested.swap(true, Ordering::SeqCst) {
            debug!("Login already requested for this session");
            return false;
        }
        match self.login().await {
            Ok(()) => true,
            Err(_) => {
                self.login_requested.store(false, Ordering::SeqCst);
                false
            }
        }
    }

    /// Finish an interactive login with the values from the redirect callback.
    pub async fn complete_login(&self, code: &str, state: &str) -> Result<(), String> {
        let user = self
            .bounded("handle_callback", self.provider.handle_callback(code, state))
            .await?;
        self.apply(ProviderEvent::UserLoaded(Box::new(user)));
        Ok(())
    }

    /// Sign out at the provider and settle unauthenticated.
    pub async fn logout(&self) {
        match self
            .bounded("signout_redirect", self.provider.signout_redirect())
            .await
        {
            Ok(Some(url)) => self.navigator.navigate(&url),
            Ok(None) => {}
            Err(e) => warn!("Provider sign-out failed: {}", e),
        }
        self.apply(ProviderEvent::UserUnloaded);
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::Credential;
    use crate::providers::token_provider::tests::{user_with, FakeProvider};
    use serde_json::{json, Map, Value};
    use std::sync::Mutex;
    use url::Url;

    #[derive(Default)]
    pub(crate) struct RecordingNavigator {
        pub visits: Mutex<Vec<Url>>,
    }

    impl Navigator for RecordingNavigator {
        fn navigate(&self, url: &Url) {
            self.visits.lock().unwrap().push(url.clone());
        }
    }

    pub(crate) fn session(fake: FakeProvider) -> (Arc<SessionContext>, Arc<RecordingNavigator>) {
        let nav = Arc::new(RecordingNavigator::default());
        let ctx = Arc::new(SessionContext::new(
            Arc::new(fake),
            nav.clone(),
            Duration::from_millis(500),
        ));
        (ctx, nav)
    }

    fn user_claiming(claims: Value) -> AuthenticatedUser {
        AuthenticatedUser::new(
            Credential::new("t", None),
            None,
            None,
            claims.as_object().cloned().unwrap_or_else(Map::new),
        )
    }

    #[test]
    fn starts_unsettled() {
        let (ctx, _) = session(FakeProvider::new(None, true));
        assert!(ctx.is_loading());
        assert!(!ctx.is_authenticated());
        assert!(ctx.roles().is_empty());
    }

    #[test]
    fn settles_once_whatever_the_event_order() {
        let orders: Vec<Vec<ProviderEvent>> = vec![
            vec![
                ProviderEvent::UserLoaded(Box::new(user_with("a", 60))),
                ProviderEvent::AccessTokenExpired,
                ProviderEvent::UserUnloaded,
            ],
            vec![
                ProviderEvent::UserUnloaded,
                ProviderEvent::UserLoaded(Box::new(user_with("a", 60))),
                ProviderEvent::AccessTokenExpired,
            ],
            vec![
                ProviderEvent::AccessTokenExpired,
                ProviderEvent::UserUnloaded,
                ProviderEvent::UserLoaded(Box::new(user_with("a", 60))),
            ],
        ];
        for events in orders {
            let (ctx, _) = session(FakeProvider::new(None, true));
            for event in events {
                ctx.apply(event);
                assert!(!ctx.is_loading());
            }
            assert_eq!(ctx.snapshot().settle_count, 1);
        }
    }

    #[test]
    fn roles_follow_the_identity_record() {
        let (ctx, _) = session(FakeProvider::new(None, true));
        ctx.apply(ProviderEvent::UserLoaded(Box::new(user_claiming(
            json!({"sub": "1", "role": "karyakarta"}),
        ))));
        assert!(ctx.is_authenticated());
        assert_eq!(ctx.roles(), RoleSet::from([Role::Karyakarta]));
        assert!(ctx.has_role(Role::Karyakarta));
        assert!(ctx.has_role_named("karyakarta"));
        assert!(!ctx.has_role_named("owner"));
        assert!(ctx.has_any_role(&[Role::Admin, Role::Karyakarta]));
        assert!(!ctx.has_any_role(&[Role::Admin, Role::Superadmin]));

        ctx.apply(ProviderEvent::SilentRenewError("consent required".into()));
        assert!(!ctx.is_authenticated());
        assert!(ctx.roles().is_empty());
    }

    #[test]
    fn broken_role_claims_still_authenticate() {
        let (ctx, _) = session(FakeProvider::new(None, true));
        ctx.apply(ProviderEvent::UserLoaded(Box::new(user_claiming(
            json!({"sub": "1", "roles": [true]}),
        ))));
        assert!(ctx.is_authenticated());
        assert!(ctx.roles().is_empty());
    }

    #[tokio::test]
    async fn initialize_with_stored_user_authenticates() {
        let (ctx, _) = session(FakeProvider::new(Some(("t1", 3600)), true));
        ctx.initialize().await;
        let snapshot = ctx.wait_settled().await;
        assert!(snapshot.is_authenticated());
    }

    #[tokio::test]
    async fn initialize_resumes_via_silent_signin() {
        let (ctx, _) = session(FakeProvider::new(None, false));
        ctx.initialize().await;
        assert!(ctx.is_authenticated());
        assert_eq!(
            ctx.user().unwrap().credential.access_token,
            "renewed-1".to_string()
        );
    }

    #[tokio::test]
    async fn initialize_without_session_settles_unauthenticated() {
        let (ctx, nav) = session(FakeProvider::new(None, true));
        ctx.initialize().await;
        assert!(!ctx.is_loading());
        assert!(!ctx.is_authenticated());
        assert!(nav.visits.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn login_navigates_without_changing_state() {
        let (ctx, nav) = session(FakeProvider::new(None, true));
        ctx.initialize().await;
        ctx.login().await.unwrap();
        assert_eq!(nav.visits.lock().unwrap().len(), 1);
        assert_eq!(ctx.snapshot().state, SessionState::Unauthenticated);

        // The provider's callback settles the new attempt.
        ctx.apply(ProviderEvent::UserLoaded(Box::new(user_with("a", 60))));
        assert!(ctx.is_authenticated());
        assert_eq!(ctx.snapshot().settle_count, 2);
    }

    #[tokio::test]
    async fn stalled_silent_signin_still_settles() {
        let mut fake = FakeProvider::new(None, false);
        fake.renew_delay = Duration::from_secs(30);
        let (ctx, _) = session(fake);

        tokio::time::timeout(Duration::from_secs(5), ctx.initialize())
            .await
            .unwrap();
        assert!(!ctx.is_loading());
        assert!(!ctx.is_authenticated());
    }

    #[tokio::test]
    async fn stalled_login_start_fails_without_navigating() {
        let mut fake = FakeProvider::new(None, true);
        fake.redirect_delay = Duration::from_secs(30);
        let (ctx, nav) = session(fake);
        ctx.initialize().await;

        let err = tokio::time::timeout(Duration::from_secs(5), ctx.login())
            .await
            .unwrap()
            .unwrap_err();
        assert!(err.contains("timed out"));
        assert!(nav.visits.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn login_is_requested_once_until_authenticated() {
        let (ctx, nav) = session(FakeProvider::new(Some(("t1", 3600)), true));
        ctx.initialize().await;

        assert!(ctx.request_login().await);
        // A late event for the same user does not re-arm the request.
        ctx.apply(ProviderEvent::UserLoaded(Box::new(user_with("t1", 3600))));
        ctx.apply(ProviderEvent::SilentRenewError("invalid_grant".into()));
        assert!(!ctx.request_login().await);
        assert_eq!(nav.visits.lock().unwrap().len(), 1);

        ctx.apply(ProviderEvent::UserLoaded(Box::new(user_with("t2", 3600))));
        ctx.apply(ProviderEvent::AccessTokenExpired);
        assert!(ctx.request_login().await);
        assert_eq!(nav.visits.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn logout_clears_session() {
        let (ctx, _) = session(FakeProvider::new(Some(("t1", 3600)), true));
        ctx.initialize().await;
        ctx.logout().await;
        assert!(!ctx.is_authenticated());
        assert!(ctx.user().is_none());
    }

    #[tokio::test]
    async fn event_loop_applies_provider_events() {
        let fake = FakeProvider::new(None, true);
        let sender = fake.event_sender();
        let (ctx, _) = session(fake);
        let handle = ctx.spawn_event_loop();
        let mut changes = ctx.subscribe();

        sender
            .send(ProviderEvent::UserLoaded(Box::new(user_with("a", 60))))
            .unwrap();
        changes.changed().await.unwrap();
        assert!(ctx.is_authenticated());
        handle.abort();
    }
}
