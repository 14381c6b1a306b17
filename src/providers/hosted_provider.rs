use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::info;
use url::Url;

use super::base::{IdentityProvider, ProviderEvent};
use super::oauth::{ClientSettings, Endpoints, OAuthSession};
use crate::models::AuthenticatedUser;

/// Config for a hosted login-widget tenant (`https://{domain}/authorize`, ...).
#[derive(Deserialize, Serialize, JsonSchema, Debug, Clone)]
pub struct HostedProviderConfig {
    pub name: String,
    /// Tenant domain, e.g. `example.eu.auth0.com`. A full URL is accepted too.
    pub domain: String,
    pub client_id: String,
    #[serde(default)]
    pub client_secret: Option<String>,
    pub redirect_uri: String,
    #[serde(default)]
    pub post_logout_redirect_uri: Option<String>,
    /// API identifier the access token is issued for.
    #[serde(default)]
    pub audience: Option<String>,
    #[serde(default = "default_scope")]
    pub scope: String,
    /// Namespaced claims that carry role names, e.g. `https://example.org/roles`.
    #[serde(default)]
    pub role_claims: Vec<String>,
    #[serde(default)]
    pub offline_token: Option<String>,
}

fn default_scope() -> String {
    "openid profile email offline_access".to_string()
}

/// Identity strategy backed by a hosted login widget tenant.
pub struct HostedProvider {
    config: HostedProviderConfig,
    endpoints: Endpoints,
    session: OAuthSession,
}

impl HostedProvider {
    pub fn new(config: &HostedProviderConfig, timeout: Duration) -> Result<Self, String> {
        info!(
            "Creating hosted identity provider '{}' for domain '{}'",
            config.name, config.domain
        );
        let endpoints = tenant_endpoints(&config.domain)?;
        let settings = ClientSettings {
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            redirect_uri: config.redirect_uri.clone(),
            post_logout_redirect_uri: config
                .post_logout_redirect_uri
                .clone()
                .or_else(|| Some(config.redirect_uri.clone())),
            scope: config.scope.clone(),
            audience: config.audience.clone(),
            load_user_info: false,
        };
        Ok(Self {
            config: config.clone(),
            endpoints,
            session: OAuthSession::new(settings, config.offline_token.clone(), timeout)?,
        })
    }
}

/// Fixed endpoint layout of a hosted tenant.
fn tenant_endpoints(domain: &str) -> Result<Endpoints, String> {
    let base = if domain.starts_with("http://") || domain.starts_with("https://") {
        domain.trim_end_matches('/').to_string()
    } else {
        format!("https://{}", domain.trim_end_matches('/'))
    };
    let parse = |path: &str| {
        Url::parse(&format!("{}{}", base, path))
            .map_err(|e| format!("Invalid tenant domain '{}': {}", domain, e))
    };
    Ok(Endpoints {
        authorization: parse("/authorize")?,
        token: parse("/oauth/token")?,
        userinfo: Some(parse("/userinfo")?),
        end_session: Some(parse("/v2/logout")?),
    })
}

#[async_trait::async_trait]
impl IdentityProvider for HostedProvider {
    fn get_name(&self) -> &str {
        &self.config.name
    }

    fn get_type(&self) -> &str {
        "hosted"
    }

    fn role_claims(&self) -> &[String] {
        &self.config.role_claims
    }

    async fn get_user(&self) -> Result<Option<AuthenticatedUser>, String> {
        Ok(self.session.current_user().await)
    }

    async fn signin_redirect(&self) -> Result<Url, String> {
        Ok(self
            .session
            .authorization_url(&self.endpoints.authorization)
            .await)
    }

    async fn handle_callback(&self, code: &str, state: &str) -> Result<AuthenticatedUser, String> {
        self.session.complete(&self.endpoints, code, state).await
    }

    async fn signin_silent(&self) -> Result<AuthenticatedUser, String> {
        self.session.refresh(&self.endpoints).await
    }

    async fn signout_redirect(&self) -> Result<Option<Url>, String> {
        let url = self
            .session
            .signout(self.endpoints.end_session.as_ref())
            .await
            .map(|mut url| {
                // The tenant logout endpoint names the landing page `returnTo`.
                if let Some(target) = &self.config.post_logout_redirect_uri {
                    url.query_pairs_mut().append_pair("returnTo", target);
                }
                url
            });
        Ok(url)
    }

    fn subscribe(&self) -> broadcast::Receiver<ProviderEvent> {
        self.session.subscribe()
    }
}
