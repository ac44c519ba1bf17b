//! Sources of "now".
//!
//! Every timestamp the store assigns (and every staleness decision it makes)
//! goes through a [`Clock`], so tests and replays can move time explicitly
//! instead of sleeping.

use std::fmt::Debug;
use std::sync::{Arc, Mutex, PoisonError};
use time::{Duration, OffsetDateTime};

pub trait Clock: Debug + Send + Sync {
    fn now(&self) -> OffsetDateTime;
}

/// Wall-clock time in UTC.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;
impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

/// A clock that only moves when told to.
///
/// Clones share the same instant, so a test can keep one handle and give
/// another to the store.
///
/// Note: Do NOT apply `#[cfg(test)]` so that other crates can also use this in their tests.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<OffsetDateTime>>,
}
impl ManualClock {
    pub fn new(start: OffsetDateTime) -> Self {
        Self { now: Arc::new(Mutex::new(start)) }
    }

    /// Start at the current wall-clock time, truncated to whole milliseconds
    /// (the resolution the store persists).
    pub fn starting_now() -> Self {
        let now = OffsetDateTime::now_utc();
        let millis = now.millisecond();
        Self::new(now.replace_millisecond(millis).unwrap_or(now))
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += by;
    }

    pub fn set(&self, to: OffsetDateTime) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) = to;
    }
}
impl Clock for ManualClock {
    fn now(&self) -> OffsetDateTime {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_shared_between_clones() {
        let clock = ManualClock::starting_now();
        let handle = clock.clone();
        let start = clock.now();
        handle.advance(Duration::hours(2));
        assert_eq!(clock.now() - start, Duration::hours(2));
    }

    #[test]
    fn test_manual_clock_is_millisecond_aligned() {
        let clock = ManualClock::starting_now();
        assert_eq!(clock.now().nanosecond() % 1_000_000, 0);
    }
}
