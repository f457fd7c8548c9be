use crate::error::AuthError;
use crate::lease;
use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use std::fmt;

/// A token obtained from one successful handshake.
///
/// Sessions are never edited in place: renewal builds a new one and swaps it
/// in whole.
#[derive(Clone, PartialEq, Eq)]
pub struct Session {
    token: String,
    issued_at: DateTime<Tz>,
    lease_seconds: i64,
    expires_at: DateTime<Tz>,
}

impl Session {
    /// Fails when the lease cannot be represented as an expiry instant.
    pub(crate) fn new(
        token: String,
        issued_at: DateTime<Tz>,
        lease_seconds: i64,
    ) -> Result<Self, AuthError> {
        let lease_seconds = lease_seconds.max(0);
        let expires_at = Duration::try_seconds(lease_seconds)
            .and_then(|lease| issued_at.clone().checked_add_signed(lease))
            .ok_or_else(|| {
                AuthError::malformed(format!("lease of {} seconds is out of range", lease_seconds))
            })?;

        Ok(Self {
            token,
            issued_at,
            lease_seconds,
            expires_at,
        })
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    /// Issuance instant in the configured timezone.
    pub fn issued_at(&self) -> &DateTime<Tz> {
        &self.issued_at
    }

    pub fn lease_seconds(&self) -> i64 {
        self.lease_seconds
    }

    pub fn expires_at(&self) -> &DateTime<Tz> {
        &self.expires_at
    }

    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        lease::remaining(&self.issued_at, self.lease_seconds, now)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        lease::is_expired(&self.issued_at, self.lease_seconds, now)
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("token", &"<redacted>")
            .field("issued_at", &self.issued_at)
            .field("lease_seconds", &self.lease_seconds)
            .finish()
    }
}
