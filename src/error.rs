use thiserror::Error;

/// Errors surfaced by the session manager.
///
/// `Clone` so that a single failed renewal can be handed to every caller that
/// was waiting on it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Authentication rejected ({status}): {message}")]
    AuthenticationRejected { status: u16, message: String },

    #[error("Malformed authentication response: {0}")]
    MalformedResponse(String),

    #[error("Not authenticated. Call configure() first.")]
    NotAuthenticated,
}

impl AuthError {
    pub(crate) fn config(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub(crate) fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedResponse(message.into())
    }
}

impl From<reqwest::Error> for AuthError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Network(format!("request timed out: {}", e))
        } else if e.is_decode() {
            Self::MalformedResponse(e.to_string())
        } else {
            Self::Network(e.to_string())
        }
    }
}
