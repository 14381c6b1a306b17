use figment::providers::{Env, Format, Yaml};
use figment::Figment;
use schemars::{schema_for, JsonSchema};
use serde::{Deserialize, Serialize};

use super::logging::LoggingConfig;
use crate::providers::ProviderConfig;

/// Environment variable that points at an alternative config file.
pub const CONFIG_PATH_ENV: &str = "SABHADESK_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "./config.yaml";

/// A top-level enum for versioned configurations.
#[derive(Deserialize, Serialize, JsonSchema)]
#[serde(tag = "version")]
pub enum Config {
    #[serde(rename = "1.0.0")]
    ConfigV1(ConfigV1),
}

/// Main config for v1.0.0: backend API, identity strategy, token handling and logging.
#[derive(Deserialize, Serialize, Debug, Clone, JsonSchema)]
pub struct ConfigV1 {
    pub api: ApiConfig,
    /// The single identity strategy used for the lifetime of the process.
    pub identity: ProviderConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Where the request and renewal counters are exported.
#[derive(Deserialize, Serialize, Debug, Clone, Default, JsonSchema)]
pub struct MetricsConfig {
    /// File rewritten in Prometheus text format after each command, for a
    /// node-exporter textfile collector.
    #[serde(default)]
    pub textfile: Option<String>,
}

/// Backend REST API the data stores talk to.
#[derive(Deserialize, Serialize, Debug, Clone, JsonSchema)]
pub struct ApiConfig {
    pub base_url: String,
    #[serde(default = "default_api_timeout")]
    pub timeout_in_ms: u64,
}

/// Token lifecycle knobs shared by every identity strategy.
#[derive(Deserialize, Serialize, Debug, Clone, JsonSchema)]
pub struct AuthConfig {
    /// Upper bound for a single identity-provider call.
    #[serde(default = "default_auth_timeout")]
    pub timeout_in_ms: u64,
    /// Tokens expiring within this many seconds are renewed before use.
    #[serde(default = "default_renew_skew")]
    pub renew_skew_in_s: i64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            timeout_in_ms: default_auth_timeout(),
            renew_skew_in_s: default_renew_skew(),
        }
    }
}

fn default_api_timeout() -> u64 {
    120_000
}

fn default_auth_timeout() -> u64 {
    10_000
}

fn default_renew_skew() -> i64 {
    60
}

/// Build the figment used for loading: the YAML file, overlaid with
/// `SABHADESK_`-prefixed environment variables (`__` separates nesting).
pub fn figment() -> Figment {
    let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    Figment::new()
        .merge(Yaml::file(path))
        .merge(Env::prefixed("SABHADESK_").ignore(&["CONFIG"]).split("__"))
}

/// Extract a versioned config from any figment.
pub fn extract_config(figment: &Figment) -> Result<ConfigV1, figment::Error> {
    match figment.extract::<Config>()? {
        Config::ConfigV1(c) => Ok(c),
    }
}

/// Load config from the YAML file and environment, exiting on failure.
pub fn load_config() -> ConfigV1 {
    match extract_config(&figment()) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Error loading configuration: {}", e);
            std::process::exit(1);
        }
    }
}

/// Print the JSON schema for the configuration to stdout.
pub fn print_schema() {
    let schema = schema_for!(Config);
    match serde_json::to_string_pretty(&schema) {
        Ok(s) => println!("{}", s),
        Err(e) => eprintln!("Failed to render schema: {}", e),
    }
}
