//! Token lifecycle: initial authentication, lazy expiry, single-flight renewal.

use crate::auth::{AuthTransport, Grant, HttpTransport};
use crate::config::{AuthRequest, Credentials, TransportConfig};
use crate::error::AuthError;
use crate::lease::{Clock, SystemClock};
use crate::session::Session;
use chrono::Duration;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{Mutex, RwLock};

/// How [`TokenCache::token`] treats a cached session.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum RenewMode {
    /// Serve the cached token unless it is missing or expired.
    #[default]
    CachedOrRenew,
    /// Always run a fresh handshake.
    ForceRenew,
}

/// What to do when the service hands out a lease of zero or less.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum NonPositiveLease {
    /// Fail the handshake with [`AuthError::MalformedResponse`].
    #[default]
    Reject,
    /// Store the token as an already expired session.
    AcceptExpired,
}

#[derive(Debug, Default, Clone)]
pub struct CachePolicy {
    pub non_positive_lease: NonPositiveLease,
    /// Discard the stale session after this many consecutive failed
    /// handshakes. `None` keeps it indefinitely.
    pub max_failed_renewals: Option<u32>,
}

#[derive(Default)]
struct SessionState {
    credentials: Option<Arc<AuthRequest>>,
    session: Option<Session>,
}

/// Serialises handshakes and remembers how the last one ended, so callers
/// that queued behind it can share the result.
#[derive(Default)]
struct RenewalGate {
    last_outcome: Option<Result<String, AuthError>>,
    consecutive_failures: u32,
}

/// Holds one bearer token and renews it on demand.
pub struct TokenCache {
    transport: Arc<dyn AuthTransport>,
    clock: Arc<dyn Clock>,
    policy: CachePolicy,
    state: RwLock<SessionState>,
    gate: Mutex<RenewalGate>,
    /// Bumped once per completed handshake, read without taking the gate.
    handshakes: AtomicU64,
}

impl TokenCache {
    pub fn new(transport: Arc<dyn AuthTransport>) -> Self {
        Self {
            transport,
            clock: Arc::new(SystemClock),
            policy: CachePolicy::default(),
            state: RwLock::new(SessionState::default()),
            gate: Mutex::new(RenewalGate::default()),
            handshakes: AtomicU64::new(0),
        }
    }

    /// Cache backed by [`HttpTransport`].
    pub fn http(config: TransportConfig) -> Result<Self, AuthError> {
        Ok(Self::new(Arc::new(HttpTransport::new(config)?)))
    }

    /// Cache backed by [`HttpTransport`], both reading time from `clock`.
    pub fn http_with_clock(
        config: TransportConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, AuthError> {
        let transport = HttpTransport::new(config)?.with_clock(Arc::clone(&clock));
        Ok(Self::new(Arc::new(transport)).with_clock(clock))
    }

    /// Clock for issuance and expiry checks. A transport that derives leases
    /// from absolute expiry times keeps its own clock; see
    /// [`http_with_clock`](Self::http_with_clock) to share one.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_policy(mut self, policy: CachePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Validate and store credentials, drop any existing session and
    /// authenticate once.
    ///
    /// If the handshake fails the credentials stay stored, so a later
    /// [`token`](Self::token) call can retry without reconfiguring.
    pub async fn configure(&self, credentials: Credentials) -> Result<(), AuthError> {
        let request = Arc::new(credentials.validate()?);

        let mut gate = self.gate.lock().await;
        {
            let mut state = self.state.write().await;
            state.credentials = Some(Arc::clone(&request));
            state.session = None;
        }
        gate.consecutive_failures = 0;

        tracing::info!(
            host = %request.host,
            port = request.port,
            username = %request.username,
            timezone = %request.timezone,
            "Configuring token cache"
        );

        self.handshake(&mut gate, &request).await.map(|_| ())
    }

    /// Return a usable token, renewing when required by `mode` or expiry.
    pub async fn token(&self, mode: RenewMode) -> Result<String, AuthError> {
        // Taken before looking at the session so that a renewal finishing
        // in between is recognised once we hold the gate.
        let seen = self.handshakes.load(Ordering::Acquire);

        if mode == RenewMode::CachedOrRenew {
            let state = self.state.read().await;
            if state.credentials.is_none() {
                return Err(AuthError::NotAuthenticated);
            }
            if let Some(session) = &state.session {
                if !session.is_expired(self.clock.now()) {
                    return Ok(session.token().to_string());
                }
            }
        }

        self.renew(seen).await
    }

    pub async fn current_token(&self) -> Result<String, AuthError> {
        self.token(RenewMode::CachedOrRenew).await
    }

    pub async fn remaining_lease(&self) -> Result<Duration, AuthError> {
        let state = self.state.read().await;
        state
            .session
            .as_ref()
            .map(|session| session.remaining(self.clock.now()))
            .ok_or(AuthError::NotAuthenticated)
    }

    /// Remaining lease in whole seconds, rounded up so that zero only ever
    /// means expired.
    pub async fn remaining_lease_secs(&self) -> Result<i64, AuthError> {
        self.remaining_lease().await.map(|left| {
            let secs = left.num_seconds();
            if left > Duration::seconds(secs) {
                secs + 1
            } else {
                secs
            }
        })
    }

    /// Whether a session exists and has not yet expired.
    pub async fn is_authenticated(&self) -> bool {
        let state = self.state.read().await;
        state
            .session
            .as_ref()
            .is_some_and(|session| !session.is_expired(self.clock.now()))
    }

    pub async fn session(&self) -> Option<Session> {
        self.state.read().await.session.clone()
    }

    /// Forget credentials and session.
    pub async fn reset(&self) {
        let mut gate = self.gate.lock().await;
        *self.state.write().await = SessionState::default();
        gate.consecutive_failures = 0;
        gate.last_outcome = Some(Err(AuthError::NotAuthenticated));
        self.handshakes.fetch_add(1, Ordering::AcqRel);
        tracing::debug!("Token cache reset");
    }

    async fn renew(&self, seen: u64) -> Result<String, AuthError> {
        let mut gate = self.gate.lock().await;

        if self.handshakes.load(Ordering::Acquire) != seen {
            if let Some(outcome) = &gate.last_outcome {
                tracing::debug!("Sharing result of concurrent renewal");
                return outcome.clone();
            }
        }

        let request = self
            .state
            .read()
            .await
            .credentials
            .clone()
            .ok_or(AuthError::NotAuthenticated)?;

        tracing::debug!("Renewing token");
        self.handshake(&mut gate, &request.for_renewal()).await
    }

    /// One round trip. Must be called with the gate held.
    async fn handshake(
        &self,
        gate: &mut RenewalGate,
        request: &AuthRequest,
    ) -> Result<String, AuthError> {
        let outcome = match self.transport.authenticate(request).await {
            Ok(grant) => self.admit(grant, request).await,
            Err(e) => Err(e),
        };

        match &outcome {
            Ok(_) => {
                gate.consecutive_failures = 0;
            }
            Err(e) => {
                gate.consecutive_failures += 1;
                tracing::warn!(
                    failures = gate.consecutive_failures,
                    "Authentication failed: {}",
                    e
                );
                if let Some(limit) = self.policy.max_failed_renewals {
                    if gate.consecutive_failures >= limit {
                        let mut state = self.state.write().await;
                        if state.session.take().is_some() {
                            tracing::warn!(limit, "Discarding stale session after repeated failures");
                        }
                    }
                }
            }
        }

        gate.last_outcome = Some(outcome.clone());
        self.handshakes.fetch_add(1, Ordering::AcqRel);
        outcome
    }

    async fn admit(&self, grant: Grant, request: &AuthRequest) -> Result<String, AuthError> {
        if grant.token.is_empty() {
            return Err(AuthError::malformed("empty token"));
        }
        if grant.lease_seconds <= 0 && self.policy.non_positive_lease == NonPositiveLease::Reject {
            return Err(AuthError::malformed(format!(
                "non-positive lease: {}",
                grant.lease_seconds
            )));
        }

        let issued_at = self.clock.now().with_timezone(&request.timezone);
        let session = Session::new(grant.token, issued_at, grant.lease_seconds)?;
        let token = session.token().to_string();

        tracing::debug!(
            lease_seconds = session.lease_seconds(),
            expires_at = %session.expires_at(),
            "Authenticated"
        );

        self.state.write().await.session = Some(session);
        Ok(token)
    }
}
