//! When does a tracked aircraft stop counting as live?
//!
//! Liveness is never stored. It is derived from `last_seen` every time it is
//! needed, both when reading (so stale rows disappear from results straight
//! away) and when sweeping (so they are eventually deleted). Both paths use
//! the same rule defined here.

use time::{Duration, OffsetDateTime, PrimitiveDateTime};

/// Default staleness threshold: one hour without a write.
pub const DEFAULT_THRESHOLD: Duration = Duration::HOUR;

/// Returns `true` once `now - last_seen` has reached `threshold`.
///
/// A `last_seen` in the future (clock skew) counts as live.
pub fn is_stale(last_seen: OffsetDateTime, now: OffsetDateTime, threshold: Duration) -> bool {
    now - last_seen >= threshold
}

/// The staleness threshold shared by reads and sweeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StalenessPolicy {
    threshold: Duration,
}
impl Default for StalenessPolicy {
    fn default() -> Self {
        Self { threshold: DEFAULT_THRESHOLD }
    }
}
impl StalenessPolicy {
    pub fn new(threshold: Duration) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> Duration {
        self.threshold
    }

    pub fn is_stale(&self, last_seen: OffsetDateTime, now: OffsetDateTime) -> bool {
        is_stale(last_seen, now, self.threshold)
    }

    /// The newest `last_seen` that is already stale at `now`.
    ///
    /// Rows are live iff `last_seen > cutoff`, evictable iff `last_seen <= cutoff`.
    /// A threshold reaching past the earliest representable date saturates
    /// there, and nothing is stale.
    pub fn cutoff(&self, now: OffsetDateTime) -> OffsetDateTime {
        now.checked_sub(self.threshold).unwrap_or(PrimitiveDateTime::MIN.assume_utc())
    }
}
