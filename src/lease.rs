//! Wall-clock source and lease arithmetic.
//!
//! Issuance instants carry the configured timezone for display, but every
//! computation here subtracts instants, so the offset never changes a result.

use chrono::{DateTime, Duration, TimeZone, Utc};
use std::sync::Mutex;

/// Source of the current time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Reads the system clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }

    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = to;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Time since `issued_at`, zero if the clock went backwards.
pub fn elapsed<Tz: TimeZone>(issued_at: &DateTime<Tz>, now: DateTime<Utc>) -> Duration {
    let elapsed = now.signed_duration_since(issued_at);
    elapsed.max(Duration::zero())
}

/// Lease left at `now`, floored at zero.
pub fn remaining<Tz: TimeZone>(
    issued_at: &DateTime<Tz>,
    lease_seconds: i64,
    now: DateTime<Utc>,
) -> Duration {
    if lease_seconds <= 0 {
        return Duration::zero();
    }
    // Leases beyond the representable range saturate instead of panicking.
    let lease = Duration::try_seconds(lease_seconds).unwrap_or(Duration::MAX);
    lease
        .checked_sub(&elapsed(issued_at, now))
        .unwrap_or(Duration::zero())
        .max(Duration::zero())
}

pub fn is_expired<Tz: TimeZone>(
    issued_at: &DateTime<Tz>,
    lease_seconds: i64,
    now: DateTime<Utc>,
) -> bool {
    remaining(issued_at, lease_seconds, now) <= Duration::zero()
}
