use super::{
    base::IdentityProvider,
    hosted_provider::{HostedProvider, HostedProviderConfig},
    oidc_provider::{OidcProvider, OidcProviderConfig},
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Configuration of the identity strategy. Exactly one is active per process.
#[derive(Deserialize, Serialize, JsonSchema, Debug, Clone)]
#[serde(tag = "type")]
pub enum ProviderConfig {
    #[serde(rename = "oidc")]
    Oidc(OidcProviderConfig),
    #[serde(rename = "hosted")]
    Hosted(HostedProviderConfig),
}

/// Create the identity strategy selected by the config.
pub fn create_identity_provider(
    config: &ProviderConfig,
    timeout: Duration,
) -> Result<Arc<dyn IdentityProvider>, String> {
    Ok(match config {
        ProviderConfig::Oidc(cfg) => Arc::new(OidcProvider::new(cfg, timeout)?),
        ProviderConfig::Hosted(cfg) => Arc::new(HostedProvider::new(cfg, timeout)?),
    })
}
