//! Injectable time source.
//!
//! The workflow engine stamps every ledger event and checkpoint with the
//! current time. Tests inject a [`FixedClock`] so timestamps are
//! deterministic; production wiring uses [`SystemClock`].

use chrono::{DateTime, Utc};

/// Pluggable clock. The engine never calls `Utc::now()` directly.
pub trait Clock: Send + Sync {
    /// Current instant.
    fn now(&self) -> DateTime<Utc>;

    /// Current instant as an RFC 3339 string (the wire/storage format).
    fn now_rfc3339(&self) -> String {
        self.now().to_rfc3339()
    }
}

/// Wall-clock time. The production default.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock pinned to a fixed instant. Used for testing.
pub struct FixedClock(pub DateTime<Utc>);

impl FixedClock {
    /// Pin to the given RFC 3339 timestamp. Panics on a malformed input —
    /// test-only convenience.
    pub fn at(rfc3339: &str) -> Self {
        Self(
            DateTime::parse_from_rfc3339(rfc3339)
                .expect("valid rfc3339 timestamp")
                .with_timezone(&Utc),
        )
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}
