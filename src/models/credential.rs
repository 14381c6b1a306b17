use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A bearer credential handed out by the identity provider.
///
/// The access token is opaque to the application: it is attached to outgoing
/// requests and never decoded.
#[derive(Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Credential {
    pub access_token: String,
    /// `None` when the provider did not report a lifetime.
    pub expires_at: Option<DateTime<Utc>>,
}

impl Credential {
    pub fn new(access_token: impl Into<String>, expires_at: Option<DateTime<Utc>>) -> Self {
        Credential {
            access_token: access_token.into(),
            expires_at,
        }
    }

    /// Build a credential from an `expires_in` (seconds) token-endpoint field.
    pub fn expiring_in(access_token: impl Into<String>, expires_in: Option<i64>) -> Self {
        let expires_at = expires_in.map(|secs| Utc::now() + Duration::seconds(secs));
        Self::new(access_token, expires_at)
    }

    /// True when the token is expired or will be within `skew`.
    pub fn is_expiring(&self, skew: Duration) -> bool {
        match self.expires_at {
            Some(at) => at - skew <= Utc::now(),
            None => false,
        }
    }

    /// Value for the `Authorization` header.
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.access_token)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}
