//! ppauth - client-side session manager for a proxy authentication service
//!
//! Authenticates once, caches the bearer token with its lease and renews it
//! lazily:
//! 1. cached token while the lease is positive
//! 2. a single shared handshake when it has expired or renewal is forced
//! 3. the stale session kept if that handshake fails

mod auth;
mod cache;
mod config;
mod error;
pub mod lease;
mod session;
pub mod setup;

pub use auth::{AuthTransport, Grant, HttpTransport};
pub use cache::{CachePolicy, NonPositiveLease, RenewMode, TokenCache};
pub use config::{AuthRequest, Credentials, TransportConfig};
pub use error::AuthError;
pub use lease::{Clock, ManualClock, SystemClock};
pub use session::Session;
pub use setup::{configure, get_remaining_lease, get_token, is_logged};
