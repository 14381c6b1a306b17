#[allow(unused_imports)]
use cached::proc_macro::cached;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info};
use url::Url;

use super::base::{IdentityProvider, ProviderEvent};
use super::oauth::{ClientSettings, Endpoints, OAuthSession};
use crate::models::AuthenticatedUser;

/// Config for a redirect-based OpenID Connect provider (authorization code + PKCE).
#[derive(Deserialize, Serialize, JsonSchema, Debug, Clone)]
pub struct OidcProviderConfig {
    pub name: String,
    /// Issuer URL; endpoints are read from its discovery document.
    pub authority: String,
    pub client_id: String,
    #[serde(default)]
    pub client_secret: Option<String>,
    pub redirect_uri: String,
    #[serde(default)]
    pub post_logout_redirect_uri: Option<String>,
    #[serde(default = "default_scope")]
    pub scope: String,
    #[serde(default = "default_load_user_info")]
    pub load_user_info: bool,
    /// Claims carrying role names beyond `role`, `roles` and `groups`.
    #[serde(default = "default_role_claims")]
    pub role_claims: Vec<String>,
    /// Refresh token to resume a session without an interactive login.
    #[serde(default)]
    pub offline_token: Option<String>,
}

fn default_scope() -> String {
    "openid profile email offline_access urn:zitadel:iam:org:project:roles".to_string()
}

fn default_load_user_info() -> bool {
    true
}

fn default_role_claims() -> Vec<String> {
    vec!["urn:zitadel:iam:org:project:roles".to_string()]
}

/// The subset of the discovery document the console uses.
#[derive(Deserialize, Debug, Clone)]
struct DiscoveryDocument {
    authorization_endpoint: String,
    token_endpoint: String,
    userinfo_endpoint: Option<String>,
    end_session_endpoint: Option<String>,
}

/// Fetch and parse the issuer's discovery document with the session's timed client.
#[cfg_attr(
    not(test),
    cached(
        time = 3600,
        result = true,
        key = "String",
        convert = r#"{ authority.clone() }"#
    )
)]
async fn fetch_endpoints(
    http: &reqwest::Client,
    authority: String,
) -> Result<Endpoints, String> {
    let url = format!(
        "{}/.well-known/openid-configuration",
        authority.trim_end_matches('/')
    );
    debug!("Fetching OIDC discovery document from '{}'", url);

    let doc = http
        .get(&url)
        .send()
        .await
        .map_err(|e| format!("Failed to fetch discovery document: {}", e))?
        .error_for_status()
        .map_err(|e| format!("Discovery endpoint failed: {}", e))?
        .json::<DiscoveryDocument>()
        .await
        .map_err(|e| format!("Failed to parse discovery document: {}", e))?;

    let parse = |s: &str| Url::parse(s).map_err(|e| format!("Invalid endpoint '{}': {}", s, e));
    Ok(Endpoints {
        authorization: parse(&doc.authorization_endpoint)?,
        token: parse(&doc.token_endpoint)?,
        userinfo: doc.userinfo_endpoint.as_deref().map(parse).transpose()?,
        end_session: doc.end_session_endpoint.as_deref().map(parse).transpose()?,
    })
}

/// Identity strategy speaking plain OIDC to an issuer such as Zitadel.
pub struct OidcProvider {
    config: OidcProviderConfig,
    session: OAuthSession,
}

impl OidcProvider {
    pub fn new(config: &OidcProviderConfig, timeout: Duration) -> Result<Self, String> {
        info!(
            "Creating OIDC provider '{}' for authority '{}'",
            config.name, config.authority
        );
        let settings = ClientSettings {
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            redirect_uri: config.redirect_uri.clone(),
            post_logout_redirect_uri: config
                .post_logout_redirect_uri
                .clone()
                .or_else(|| Some(config.redirect_uri.clone())),
            scope: config.scope.clone(),
            audience: None,
            load_user_info: config.load_user_info,
        };
        Ok(Self {
            config: config.clone(),
            session: OAuthSession::new(settings, config.offline_token.clone(), timeout)?,
        })
    }

    async fn endpoints(&self) -> Result<Endpoints, String> {
        fetch_endpoints(self.session.http(), self.config.authority.clone()).await
    }
}

#[async_trait::async_trait]
impl IdentityProvider for OidcProvider {
    fn get_name(&self) -> &str {
        &self.config.name
    }

    fn get_type(&self) -> &str {
        "oidc"
    }

    fn role_claims(&self) -> &[String] {
        &self.config.role_claims
    }

    async fn get_user(&self) -> Result<Option<AuthenticatedUser>, String> {
        Ok(self.session.current_user().await)
    }

    async fn signin_redirect(&self) -> Result<Url, String> {
        let endpoints = self.endpoints().await?;
        Ok(self.session.authorization_url(&endpoints.authorization).await)
    }

    async fn handle_callback(&self, code: &str, state: &str) -> Result<AuthenticatedUser, String> {
        let endpoints = self.endpoints().await?;
        self.session.complete(&endpoints, code, state).await
    }

    async fn signin_silent(&self) -> Result<AuthenticatedUser, String> {
        let endpoints = self.endpoints().await?;
        self.session.refresh(&endpoints).await
    }

    async fn signout_redirect(&self) -> Result<Option<Url>, String> {
        // A failed discovery must not keep the local session alive.
        let end_session = self.endpoints().await.ok().and_then(|e| e.end_session);
        Ok(self.session.signout(end_session.as_ref()).await)
    }

    fn subscribe(&self) -> broadcast::Receiver<ProviderEvent> {
        self.session.subscribe()
    }
}
