mod http;

pub use http::HttpTransport;

use crate::config::AuthRequest;
use crate::error::AuthError;
use async_trait::async_trait;

/// Token and lease handed back by a successful handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grant {
    pub token: String,
    /// Server-declared validity window. May be zero or negative when the
    /// service misbehaves; the cache policy decides what to do with that.
    pub lease_seconds: i64,
}

/// Performs the authentication handshake against the remote service.
///
/// One call is one round trip. Implementations must not retry.
#[async_trait]
pub trait AuthTransport: Send + Sync {
    async fn authenticate(&self, request: &AuthRequest) -> Result<Grant, AuthError>;
}
