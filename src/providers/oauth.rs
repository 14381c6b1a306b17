//! Authorization-code + PKCE plumbing shared by the redirect-based identity strategies.
//!
//! Holds the provider-side user record, the pending interactive logins and the
//! event channel. Strategies only decide which endpoints to talk to.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::Deserialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, Mutex, RwLock};
use tracing::{debug, info, warn};
use url::Url;

use super::base::ProviderEvent;
use crate::models::{AuthenticatedUser, Credential};

const EVENT_CHANNEL_CAPACITY: usize = 32;
/// Logins awaiting their callback; the oldest is dropped beyond this.
const MAX_PENDING_LOGINS: usize = 8;
const PENDING_LOGIN_TTL: Duration = Duration::from_secs(600);

/// Endpoints of the authorization server in use.
#[derive(Debug, Clone)]
pub struct Endpoints {
    pub authorization: Url,
    pub token: Url,
    pub userinfo: Option<Url>,
    pub end_session: Option<Url>,
}

/// Client registration values shared by every strategy.
#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub client_id: String,
    pub client_secret: Option<String>,
    pub redirect_uri: String,
    pub post_logout_redirect_uri: Option<String>,
    pub scope: String,
    pub audience: Option<String>,
    pub load_user_info: bool,
}

#[derive(Debug)]
struct PendingLogin {
    verifier: String,
    started: Instant,
}

#[derive(Deserialize, Debug)]
struct TokenResponse {
    access_token: String,
    expires_in: Option<i64>,
    refresh_token: Option<String>,
    id_token: Option<String>,
}

pub struct OAuthSession {
    http: reqwest::Client,
    settings: ClientSettings,
    user: RwLock<Option<AuthenticatedUser>>,
    /// Refresh token handed in at startup, used until a user record exists.
    offline_token: Mutex<Option<String>>,
    /// `state` -> PKCE code verifier for logins awaiting their callback.
    pending: Mutex<HashMap<String, PendingLogin>>,
    expired_notified: AtomicBool,
    events: broadcast::Sender<ProviderEvent>,
}

impl OAuthSession {
    pub fn new(
        settings: ClientSettings,
        offline_token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, String> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| format!("Failed to build HTTP client: {}", e))?;
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Ok(Self {
            http,
            settings,
            user: RwLock::new(None),
            offline_token: Mutex::new(offline_token),
            pending: Mutex::new(HashMap::new()),
            expired_notified: AtomicBool::new(false),
            events,
        })
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProviderEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: ProviderEvent) {
        // No receivers simply means nobody is listening yet.
        let _ = self.events.send(event);
    }

    /// Current user record. Emits `AccessTokenExpired` once per expired credential.
    pub async fn current_user(&self) -> Option<AuthenticatedUser> {
        let user = self.user.read().await.clone();
        if let Some(u) = &user {
            if u.credential.is_expiring(chrono::Duration::zero())
                && !self.expired_notified.swap(true, Ordering::SeqCst)
            {
                debug!("Stored access token for '{}' has expired", u.username());
                self.emit(ProviderEvent::AccessTokenExpired);
            }
        }
        user
    }

    /// Build the authorization URL and remember the PKCE verifier for its `state`.
    pub async fn authorization_url(&self, endpoint: &Url) -> Url {
        let state = uuid::Uuid::new_v4().simple().to_string();
        let verifier = format!(
            "{}{}",
            uuid::Uuid::new_v4().simple(),
            uuid::Uuid::new_v4().simple()
        );
        let challenge = pkce_challenge(&verifier);
        {
            let mut pending = self.pending.lock().await;
            pending.retain(|_, login| login.started.elapsed() < PENDING_LOGIN_TTL);
            while pending.len() >= MAX_PENDING_LOGINS {
                let Some(oldest) = pending
                    .iter()
                    .min_by_key(|(_, login)| login.started)
                    .map(|(state, _)| state.clone())
                else {
                    break;
                };
                debug!("Dropping abandoned login '{}'", oldest);
                pending.remove(&oldest);
            }
            pending.insert(
                state.clone(),
                PendingLogin {
                    verifier,
                    started: Instant::now(),
                },
            );
        }

        let mut url = endpoint.clone();
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("response_type", "code")
                .append_pair("client_id", &self.settings.client_id)
                .append_pair("redirect_uri", &self.settings.redirect_uri)
                .append_pair("scope", &self.settings.scope)
                .append_pair("state", &state)
                .append_pair("code_challenge", &challenge)
                .append_pair("code_challenge_method", "S256");
            if let Some(audience) = &self.settings.audience {
                query.append_pair("audience", audience);
            }
        }
        url
    }

    /// Exchange an authorization code for tokens and load the user.
    pub async fn complete(
        &self,
        endpoints: &Endpoints,
        code: &str,
        state: &str,
    ) -> Result<AuthenticatedUser, String> {
        let verifier = self
            .pending
            .lock()
            .await
            .remove(state)
            .filter(|login| login.started.elapsed() < PENDING_LOGIN_TTL)
            .map(|login| login.verifier)
            .ok_or_else(|| "Unknown, expired or already used login state".to_string())?;

        let form = vec![
            ("grant_type", "authorization_code".to_string()),
            ("code", code.to_string()),
            ("redirect_uri", self.settings.redirect_uri.clone()),
            ("code_verifier", verifier),
        ];
        let tokens = self.token_request(&endpoints.token, form).await?;
        let user = self.build_user(endpoints, tokens, None).await?;
        info!("Signed in user '{}'", user.username());
        self.store_user(user.clone()).await;
        Ok(user)
    }

    /// Use the refresh token to obtain a fresh user record. Emits
    /// `SilentRenewError` on failure.
    pub async fn refresh(&self, endpoints: &Endpoints) -> Result<AuthenticatedUser, String> {
        match self.try_refresh(endpoints).await {
            Ok(user) => {
                debug!("Silent renewal succeeded for '{}'", user.username());
                self.store_user(user.clone()).await;
                Ok(user)
            }
            Err(e) => {
                warn!("Silent renewal failed: {}", e);
                self.emit(ProviderEvent::SilentRenewError(e.clone()));
                Err(e)
            }
        }
    }

    async fn try_refresh(&self, endpoints: &Endpoints) -> Result<AuthenticatedUser, String> {
        let previous = self.user.read().await.clone();
        let refresh_token = match previous.as_ref().and_then(|u| u.refresh_token.clone()) {
            Some(t) => t,
            None => self
                .offline_token
                .lock()
                .await
                .clone()
                .ok_or_else(|| "No refresh token available".to_string())?,
        };

        let form = vec![
            ("grant_type", "refresh_token".to_string()),
            ("refresh_token", refresh_token.clone()),
        ];
        let mut tokens = self.token_request(&endpoints.token, form).await?;
        if tokens.refresh_token.is_none() {
            tokens.refresh_token = Some(refresh_token);
        }
        self.build_user(endpoints, tokens, previous.as_ref()).await
    }

    /// Forget the user and build the provider logout URL when there is one.
    pub async fn signout(&self, end_session: Option<&Url>) -> Option<Url> {
        let previous = self.user.write().await.take();
        self.offline_token.lock().await.take();
        self.emit(ProviderEvent::UserUnloaded);

        end_session.map(|endpoint| {
            let mut url = endpoint.clone();
            {
                let mut query = url.query_pairs_mut();
                query.append_pair("client_id", &self.settings.client_id);
                if let Some(id_token) = previous.as_ref().and_then(|u| u.id_token.as_deref()) {
                    query.append_pair("id_token_hint", id_token);
                }
                if let Some(target) = &self.settings.post_logout_redirect_uri {
                    query.append_pair("post_logout_redirect_uri", target);
                }
            }
            url
        })
    }

    /// Replace the user record without contacting the provider.
    pub async fn store_user(&self, user: AuthenticatedUser) {
        *self.user.write().await = Some(user.clone());
        self.expired_notified.store(false, Ordering::SeqCst);
        self.emit(ProviderEvent::UserLoaded(Box::new(user)));
    }

    async fn token_request(
        &self,
        endpoint: &Url,
        mut form: Vec<(&'static str, String)>,
    ) -> Result<TokenResponse, String> {
        form.push(("client_id", self.settings.client_id.clone()));
        if let Some(secret) = &self.settings.client_secret {
            form.push(("client_secret", secret.clone()));
        }

        let resp = self
            .http
            .post(endpoint.clone())
            .form(&form)
            .send()
            .await
            .map_err(|e| format!("Failed to call token endpoint: {}", e))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(format!("Token endpoint returned {}: {}", status, body));
        }

        resp.json::<TokenResponse>()
            .await
            .map_err(|e| format!("Failed to parse token response: {}", e))
    }

    async fn build_user(
        &self,
        endpoints: &Endpoints,
        tokens: TokenResponse,
        previous: Option<&AuthenticatedUser>,
    ) -> Result<AuthenticatedUser, String> {
        let claims = match &tokens.id_token {
            Some(id_token) => decode_id_token_claims(id_token)?,
            None => previous.map(|u| u.claims.clone()).unwrap_or_default(),
        };
        let id_token = tokens
            .id_token
            .or_else(|| previous.and_then(|u| u.id_token.clone()));

        let mut user = AuthenticatedUser::new(
            Credential::expiring_in(tokens.access_token, tokens.expires_in),
            tokens.refresh_token,
            id_token,
            claims,
        );

        if self.settings.load_user_info {
            if let Some(userinfo) = &endpoints.userinfo {
                user.merge_claims(self.fetch_userinfo(userinfo, &user.credential).await?);
            }
        }
        Ok(user)
    }

    async fn fetch_userinfo(
        &self,
        endpoint: &Url,
        credential: &Credential,
    ) -> Result<Map<String, Value>, String> {
        let resp = self
            .http
            .get(endpoint.clone())
            .bearer_auth(&credential.access_token)
            .send()
            .await
            .map_err(|e| format!("Failed to call userinfo endpoint: {}", e))?;
        if !resp.status().is_success() {
            return Err(format!("Userinfo endpoint returned {}", resp.status()));
        }
        resp.json::<Map<String, Value>>()
            .await
            .map_err(|e| format!("Failed to parse userinfo JSON: {}", e))
    }
}

/// S256 code challenge for a PKCE verifier.
pub fn pkce_challenge(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

/// Read the claims of an id token received directly from the token endpoint.
///
/// The token arrived over the authenticated TLS channel of the code exchange,
/// so its signature is not checked here.
pub fn decode_id_token_claims(id_token: &str) -> Result<Map<String, Value>, String> {
    let mut validation = Validation::default();
    validation.insecure_disable_signature_validation();
    validation.validate_aud = false;
    validation.validate_exp = false;
    validation.required_spec_claims.clear();

    decode::<Map<String, Value>>(id_token, &DecodingKey::from_secret(&[]), &validation)
        .map(|data| data.claims)
        .map_err(|e| format!("Failed to decode id token: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use mockito::Server;
    use serde_json::json;

    fn settings() -> ClientSettings {
        ClientSettings {
            client_id: "console".to_string(),
            client_secret: None,
            redirect_uri: "http://localhost:5173/".to_string(),
            post_logout_redirect_uri: Some("http://localhost:5173/".to_string()),
            scope: "openid profile".to_string(),
            audience: None,
            load_user_info: false,
        }
    }

    fn endpoints(base: &str) -> Endpoints {
        Endpoints {
            authorization: Url::parse(&format!("{}/authorize", base)).unwrap(),
            token: Url::parse(&format!("{}/token", base)).unwrap(),
            userinfo: Some(Url::parse(&format!("{}/userinfo", base)).unwrap()),
            end_session: Some(Url::parse(&format!("{}/logout", base)).unwrap()),
        }
    }

    fn id_token(claims: Value) -> String {
        encode(&Header::default(), &claims, &EncodingKey::from_secret(b"irrelevant")).unwrap()
    }

    #[test]
    fn pkce_challenge_matches_rfc7636_example() {
        assert_eq!(
            pkce_challenge("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk"),
            "E9Melhoa2OwvFrEMTJguCp7xsQ0UcZ0x5Zj6WG8NgOs"
        );
    }

    #[test]
    fn id_token_claims_are_read_without_key() {
        let token = id_token(json!({"sub": "u1", "role": "admin", "exp": 1}));
        let claims = decode_id_token_claims(&token).unwrap();
        assert_eq!(claims["sub"], "u1");
        assert_eq!(claims["role"], "admin");
    }

    #[tokio::test]
    async fn authorization_url_carries_pkce_and_state() {
        let session = OAuthSession::new(settings(), None, Duration::from_secs(5)).unwrap();
        let ep = endpoints("https://idp.example.org");
        let url = session.authorization_url(&ep.authorization).await;
        let query: HashMap<_, _> = url.query_pairs().into_owned().collect();
        assert_eq!(query["response_type"], "code");
        assert_eq!(query["code_challenge_method"], "S256");
        assert!(session.pending.lock().await.contains_key(&query["state"]));
    }

    #[tokio::test]
    async fn abandoned_logins_are_bounded() {
        let session = OAuthSession::new(settings(), None, Duration::from_secs(5)).unwrap();
        let ep = endpoints("https://idp.example.org");
        let state_of = |url: Url| {
            url.query_pairs()
                .find(|(k, _)| k == "state")
                .map(|(_, v)| v.into_owned())
                .unwrap()
        };

        let first = state_of(session.authorization_url(&ep.authorization).await);
        let mut last = first.clone();
        for _ in 0..3 * MAX_PENDING_LOGINS {
            last = state_of(session.authorization_url(&ep.authorization).await);
        }

        let pending = session.pending.lock().await;
        assert_eq!(pending.len(), MAX_PENDING_LOGINS);
        assert!(!pending.contains_key(&first));
        assert!(pending.contains_key(&last));
    }

    #[tokio::test]
    async fn expired_login_state_is_rejected() {
        let session = OAuthSession::new(settings(), None, Duration::from_secs(5)).unwrap();
        let ep = endpoints("http://127.0.0.1:9");
        // The monotonic clock may not reach back far enough right after boot.
        let Some(started) = Instant::now().checked_sub(PENDING_LOGIN_TTL * 2) else {
            return;
        };
        session.pending.lock().await.insert(
            "stale".to_string(),
            PendingLogin {
                verifier: "v".to_string(),
                started,
            },
        );

        let err = session.complete(&ep, "code", "stale").await.unwrap_err();
        assert!(err.contains("expired"));
        assert!(session.pending.lock().await.is_empty());
    }

    #[tokio::test]
    async fn callback_exchanges_code_once() {
        let mut server = Server::new_async().await;
        let body = json!({
            "access_token": "access-1",
            "expires_in": 300,
            "refresh_token": "refresh-1",
            "id_token": id_token(json!({"sub": "u1", "preferred_username": "asha"})),
        });
        let m = server
            .mock("POST", "/token")
            .match_body(mockito::Matcher::UrlEncoded(
                "grant_type".into(),
                "authorization_code".into(),
            ))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(body.to_string())
            .expect(1)
            .create_async()
            .await;

        let session = OAuthSession::new(settings(), None, Duration::from_secs(5)).unwrap();
        let mut events = session.subscribe();
        let ep = endpoints(&server.url());
        let url = session.authorization_url(&ep.authorization).await;
        let state = url
            .query_pairs()
            .find(|(k, _)| k == "state")
            .map(|(_, v)| v.into_owned())
            .unwrap();

        let user = session.complete(&ep, "code-1", &state).await.unwrap();
        assert_eq!(user.username(), "asha");
        assert_eq!(user.refresh_token.as_deref(), Some("refresh-1"));
        assert!(matches!(events.recv().await.unwrap(), ProviderEvent::UserLoaded(_)));

        // The state is single-use.
        assert!(session.complete(&ep, "code-1", &state).await.is_err());
        m.assert_async().await;
    }

    #[tokio::test]
    async fn refresh_without_token_reports_silent_renew_error() {
        let session = OAuthSession::new(settings(), None, Duration::from_secs(5)).unwrap();
        let mut events = session.subscribe();
        let err = session
            .refresh(&endpoints("https://idp.example.org"))
            .await
            .unwrap_err();
        assert!(err.contains("No refresh token"));
        assert!(matches!(
            events.recv().await.unwrap(),
            ProviderEvent::SilentRenewError(_)
        ));
    }

    #[tokio::test]
    async fn refresh_keeps_previous_refresh_token_and_claims() {
        let mut server = Server::new_async().await;
        let m = server
            .mock("POST", "/token")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"access_token": "access-2", "expires_in": 300}"#)
            .create_async()
            .await;

        let session =
            OAuthSession::new(settings(), Some("offline-1".into()), Duration::from_secs(5))
                .unwrap();
        let ep = endpoints(&server.url());
        let user = session.refresh(&ep).await.unwrap();
        m.assert_async().await;
        assert_eq!(user.credential.access_token, "access-2");
        assert_eq!(user.refresh_token.as_deref(), Some("offline-1"));
        assert!(session.current_user().await.is_some());
    }

    #[tokio::test]
    async fn signout_clears_user_and_builds_logout_url() {
        let session = OAuthSession::new(settings(), None, Duration::from_secs(5)).unwrap();
        let ep = endpoints("https://idp.example.org");
        session
            .store_user(AuthenticatedUser::new(
                Credential::new("t", None),
                None,
                Some("idt".into()),
                Map::new(),
            ))
            .await;

        let url = session.signout(ep.end_session.as_ref()).await.unwrap();
        assert!(url.as_str().contains("id_token_hint=idt"));
        assert!(session.current_user().await.is_none());
    }
}
