//! Injectable time source.
//!
//! Breaker recovery timeouts, cache TTLs, store expiry and recovery backoff all
//! read time through [`Clock`] so tests can drive them with [`ManualClock`]
//! instead of sleeping.

use std::fmt::Debug;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::Mutex;

/// Source of wall-clock time plus the ability to wait.
pub trait Clock: Send + Sync + Debug {
    fn now(&self) -> DateTime<Utc>;

    fn sleep(&self, duration: Duration);

    /// Milliseconds since the Unix epoch.
    fn now_millis(&self) -> i64 {
        self.now().timestamp_millis()
    }
}

/// Real time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Manually advanced clock for tests. `sleep` advances time instantly and
/// records the requested duration.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
    sleeps: Mutex<Vec<Duration>>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualClock {
    /// Start at a fixed, arbitrary instant.
    pub fn new() -> Self {
        let start = DateTime::from_timestamp(1_700_000_000, 0).unwrap_or_else(Utc::now);
        Self::starting_at(start)
    }

    pub fn starting_at(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
            sleeps: Mutex::new(Vec::new()),
        }
    }

    /// Move time forward.
    pub fn advance(&self, duration: Duration) {
        let mut now = self.now.lock();
        *now = checked_after(*now, duration).unwrap_or(DateTime::<Utc>::MAX_UTC);
    }

    /// Every duration passed to `sleep`, in call order.
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().clone()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }

    fn sleep(&self, duration: Duration) {
        self.sleeps.lock().push(duration);
        self.advance(duration);
    }
}

/// Convert a std duration, saturating instead of failing on overflow.
pub fn to_delta(duration: Duration) -> TimeDelta {
    TimeDelta::from_std(duration).unwrap_or(TimeDelta::MAX)
}

/// `at + duration`, or `None` when the result is past the last representable
/// instant. Callers treat `None` as "never".
pub fn checked_after(at: DateTime<Utc>, duration: Duration) -> Option<DateTime<Utc>> {
    at.checked_add_signed(to_delta(duration))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_advances() {
        let clock = ManualClock::new();
        let start = clock.now();
        clock.advance(Duration::from_secs(90));
        assert_eq!((clock.now() - start).num_seconds(), 90);
    }

    #[test]
    fn manual_sleep_records_and_advances() {
        let clock = ManualClock::new();
        let start = clock.now_millis();
        clock.sleep(Duration::from_millis(250));
        clock.sleep(Duration::from_secs(1));
        assert_eq!(clock.sleeps(), vec![Duration::from_millis(250), Duration::from_secs(1)]);
        assert_eq!(clock.now_millis() - start, 1250);
    }

    #[test]
    fn checked_after_overflow_is_none() {
        let clock = ManualClock::new();
        let start = clock.now();
        assert_eq!(
            checked_after(start, Duration::from_secs(60)),
            Some(start + TimeDelta::seconds(60))
        );
        assert_eq!(checked_after(start, Duration::from_secs(u64::MAX)), None);
        assert_eq!(checked_after(start, Duration::MAX), None);
    }

    #[test]
    fn system_clock_is_monotone_enough() {
        let clock = SystemClock;
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
    }
}
