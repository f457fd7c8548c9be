//! Process-wide convenience instance.
//!
//! Applications that need more than one cache, a custom transport, or a
//! controlled lifetime should build a [`TokenCache`] themselves.

use crate::cache::{RenewMode, TokenCache};
use crate::config::{Credentials, TransportConfig};
use crate::error::AuthError;
use tokio::sync::OnceCell;

static DEFAULT_CACHE: OnceCell<TokenCache> = OnceCell::const_new();

/// The shared cache, if [`configure`] has created it.
pub fn default_cache() -> Option<&'static TokenCache> {
    DEFAULT_CACHE.get()
}

/// Configure the shared cache, creating it on first use with a transport
/// built from [`TransportConfig::from_env`].
pub async fn configure(credentials: Credentials) -> Result<(), AuthError> {
    let cache = DEFAULT_CACHE
        .get_or_try_init(|| async { TokenCache::http(TransportConfig::from_env()?) })
        .await?;
    cache.configure(credentials).await
}

pub async fn get_token(mode: RenewMode) -> Result<String, AuthError> {
    default_cache()
        .ok_or(AuthError::NotAuthenticated)?
        .token(mode)
        .await
}

/// Remaining lease of the shared cache in whole seconds.
pub async fn get_remaining_lease() -> Result<i64, AuthError> {
    default_cache()
        .ok_or(AuthError::NotAuthenticated)?
        .remaining_lease_secs()
        .await
}

pub async fn is_logged() -> bool {
    match default_cache() {
        Some(cache) => cache.is_authenticated().await,
        None => false,
    }
}
