use reqwest::StatusCode;

/// Failure of a backend API call as seen by stores and views.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// No response was received (connection, TLS, timeout).
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The backend answered with a non-success status.
    #[error("server responded with {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("could not decode response: {0}")]
    Decode(String),
}

impl ApiError {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            ApiError::Transport(e) => e.status(),
            _ => None,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(StatusCode::UNAUTHORIZED)
    }
}
