use std::sync::{Arc, Mutex};

use figment::{
    providers::{Format, Yaml},
    Figment,
};
use jsonwebtoken::{encode, EncodingKey, Header};
use sabhadesk::config::{extract_config, ConfigV1};
use sabhadesk::session::Navigator;
use sabhadesk::startup::build_state;
use sabhadesk::state::AppState;
use serde_json::{json, Value};
use url::Url;

pub const ROLE_CLAIM: &str = "https://sabhadesk.example.org/roles";

/// Config for a hosted tenant at `idp` and a backend at `api`.
pub fn config(idp: &str, api: &str, offline_token: Option<&str>) -> ConfigV1 {
    let offline = offline_token
        .map(|t| format!("  offline_token: \"{}\"\n", t))
        .unwrap_or_default();
    let yaml = format!(
        r#"
version: "1.0.0"
logging:
  level: "debug"
  format: "json"
auth:
  timeout_in_ms: 3000
api:
  base_url: "{api}"
  timeout_in_ms: 3000
identity:
  type: "hosted"
  name: "Test tenant"
  domain: "{idp}"
  client_id: "console"
  redirect_uri: "http://localhost:5173/"
  role_claims:
    - "{ROLE_CLAIM}"
{offline}"#
    );
    extract_config(&Figment::from(Yaml::string(&yaml))).expect("test config should parse")
}

/// Navigator that remembers every target instead of opening it.
#[derive(Default)]
pub struct RecordingNavigator {
    pub visits: Mutex<Vec<Url>>,
}

impl Navigator for RecordingNavigator {
    fn navigate(&self, url: &Url) {
        self.visits.lock().unwrap().push(url.clone());
    }
}

impl RecordingNavigator {
    pub fn count(&self) -> usize {
        self.visits.lock().unwrap().len()
    }
}

pub fn build(config: ConfigV1) -> (AppState, Arc<RecordingNavigator>) {
    let navigator = Arc::new(RecordingNavigator::default());
    let state = build_state(Arc::new(config), navigator.clone()).expect("state should build");
    (state, navigator)
}

/// Id token carrying the given roles, signed with a throwaway key.
pub fn id_token(sub: &str, roles: &[&str]) -> String {
    let mut claims = json!({
        "sub": sub,
        "preferred_username": format!("{}@example.org", sub),
    });
    claims[ROLE_CLAIM] = json!(roles);
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(b"not-checked"),
    )
    .expect("failed to encode id token")
}

/// Token endpoint response rotating to `next_refresh`.
pub fn token_response(access: &str, next_refresh: &str, id_token: Option<String>) -> String {
    let mut body = json!({
        "access_token": access,
        "expires_in": 3600,
        "refresh_token": next_refresh,
        "token_type": "Bearer",
    });
    if let Some(id) = id_token {
        body["id_token"] = Value::from(id);
    }
    body.to_string()
}
