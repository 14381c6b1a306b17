use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::credential::Credential;

/// The identity record an identity provider keeps for the signed-in user.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct AuthenticatedUser {
    pub subject: String,
    pub credential: Credential,
    #[serde(skip_serializing)]
    pub refresh_token: Option<String>,
    #[serde(skip_serializing)]
    pub id_token: Option<String>,
    /// Identity claims from the id token, overlaid with the userinfo response.
    pub claims: Map<String, Value>,
}

impl AuthenticatedUser {
    pub fn new(
        credential: Credential,
        refresh_token: Option<String>,
        id_token: Option<String>,
        claims: Map<String, Value>,
    ) -> Self {
        let subject = claims
            .get("sub")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        AuthenticatedUser {
            subject,
            credential,
            refresh_token,
            id_token,
            claims,
        }
    }

    /// Human-facing name: `preferred_username`, then `email`, then the subject.
    pub fn username(&self) -> &str {
        ["preferred_username", "email"]
            .iter()
            .find_map(|k| self.claims.get(*k).and_then(|v| v.as_str()))
            .unwrap_or(&self.subject)
    }

    /// Overlay additional claims (e.g. a userinfo response). Existing keys are replaced.
    pub fn merge_claims(&mut self, extra: Map<String, Value>) {
        self.claims.extend(extra);
        if self.subject.is_empty() {
            if let Some(sub) = self.claims.get("sub").and_then(|v| v.as_str()) {
                self.subject = sub.to_string();
            }
        }
    }
}
