//! Time sources.
//!
//! Everything time-dependent in the crate reads the clock through the
//! [`Clock`] trait so tests can move time forward without sleeping.  A clock
//! exposes two views of the same moment:
//!
//! - a monotonic [`Instant`], used for entry deadlines inside the cache, and
//! - wall-clock milliseconds since the Unix epoch, used to derive time-bucket
//!   keys in the rate counter.

use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;

/// A source of the current time.
pub trait Clock: Send + Sync + 'static {
    /// Monotonic "now".
    fn now(&self) -> Instant;

    /// Milliseconds since the Unix epoch.
    fn epoch_millis(&self) -> u64;
}

/// The real clock.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    #[inline]
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn epoch_millis(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO)
            .as_millis() as u64
    }
}

/// A clock that only moves when told to.
///
/// Cloned handles share the same time, so a test can keep one handle and pass
/// another into the structure under test.
#[derive(Clone, Debug)]
pub struct ManualClock {
    base_instant: Instant,
    base_millis: u64,
    offset: Arc<Mutex<Duration>>,
}

impl ManualClock {
    /// Starts at the real current time.
    pub fn new() -> Self {
        Self::starting_at(SystemClock.epoch_millis())
    }

    /// Starts at the given wall-clock time, in milliseconds since the epoch.
    pub fn starting_at(epoch_millis: u64) -> Self {
        ManualClock {
            base_instant: Instant::now(),
            base_millis: epoch_millis,
            offset: Arc::new(Mutex::new(Duration::ZERO)),
        }
    }

    /// Moves time forward by `d`.
    pub fn advance(&self, d: Duration) {
        *self.offset.lock() += d;
    }

    /// Total time advanced since construction.
    pub fn elapsed(&self) -> Duration {
        *self.offset.lock()
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.base_instant + *self.offset.lock()
    }

    fn epoch_millis(&self) -> u64 {
        self.base_millis + self.offset.lock().as_millis() as u64
    }
}

/// Shared clock handle stored inside caches and gates.
pub type SharedClock = Arc<dyn Clock>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_moves_both_views_together() {
        let clock = ManualClock::starting_at(1_000);
        let start = clock.now();

        clock.advance(Duration::from_secs(90));

        assert_eq!(clock.now() - start, Duration::from_secs(90));
        assert_eq!(clock.epoch_millis(), 1_000 + 90_000);
    }

    #[test]
    fn cloned_manual_clocks_share_time() {
        let a = ManualClock::starting_at(0);
        let b = a.clone();
        a.advance(Duration::from_millis(5));
        assert_eq!(b.epoch_millis(), 5);
        assert_eq!(b.elapsed(), Duration::from_millis(5));
    }
}
