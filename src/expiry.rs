//! Per-entry expiration policies.
//!
//! The cache asks an [`Expiry`] how long an entry may live each time the entry
//! is created, replaced, or read.  The answer is a remaining lifetime measured
//! from `now`; the cache turns it into an absolute deadline and never hands out
//! an entry at or past that deadline.

use std::time::{Duration, Instant};

/// Determines how long a cache entry lives.
///
/// Returning `None` means the entry does not expire.  `current` is the time the
/// entry had left before this event (`None` if it was immortal), so returning
/// `current` unchanged preserves the existing deadline.
pub trait Expiry<K, V>: Send + Sync + 'static {
    /// Called when a key is inserted that was not present (or had expired).
    fn expire_after_create(&self, key: &K, value: &V, now: Instant) -> Option<Duration>;

    /// Called when a present entry's value is replaced.
    fn expire_after_update(
        &self,
        key: &K,
        value: &V,
        now: Instant,
        current: Option<Duration>,
    ) -> Option<Duration> {
        let _ = (key, value, now);
        current
    }

    /// Called when a present entry is read.
    fn expire_after_read(
        &self,
        key: &K,
        value: &V,
        now: Instant,
        current: Option<Duration>,
    ) -> Option<Duration> {
        let _ = (key, value, now);
        current
    }

    /// `false` if reads can never change a deadline, letting the cache skip
    /// the write lock on the read path.
    fn reads_reschedule(&self) -> bool {
        true
    }
}

/// Entries never expire; only capacity or explicit invalidation removes them.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoExpiry;

impl<K, V> Expiry<K, V> for NoExpiry {
    fn expire_after_create(&self, _key: &K, _value: &V, _now: Instant) -> Option<Duration> {
        None
    }

    fn reads_reschedule(&self) -> bool {
        false
    }
}

/// Fixed time-to-live: an entry expires a fixed time after it was created.
///
/// Reads and replacements leave the deadline where it was.  A key only gets a
/// fresh lifetime after the old entry expired or was invalidated.
#[derive(Clone, Copy, Debug)]
pub struct FixedTtl(pub Duration);

impl<K, V> Expiry<K, V> for FixedTtl {
    fn expire_after_create(&self, _key: &K, _value: &V, _now: Instant) -> Option<Duration> {
        Some(self.0)
    }

    fn reads_reschedule(&self) -> bool {
        false
    }
}

/// Fixed time-to-idle: every read or write restarts the countdown.
#[derive(Clone, Copy, Debug)]
pub struct FixedTti(pub Duration);

impl<K, V> Expiry<K, V> for FixedTti {
    fn expire_after_create(&self, _key: &K, _value: &V, _now: Instant) -> Option<Duration> {
        Some(self.0)
    }

    fn expire_after_update(
        &self,
        _key: &K,
        _value: &V,
        _now: Instant,
        _current: Option<Duration>,
    ) -> Option<Duration> {
        Some(self.0)
    }

    fn expire_after_read(
        &self,
        _key: &K,
        _value: &V,
        _now: Instant,
        _current: Option<Duration>,
    ) -> Option<Duration> {
        Some(self.0)
    }
}

/// An [`Expiry`] backed by a closure evaluated on creation only.
///
/// Created via [`CacheBuilder::expire_after_create`](crate::CacheBuilder::expire_after_create).
pub struct FnCreateExpiry<F>(pub F);

impl<K, V, F> Expiry<K, V> for FnCreateExpiry<F>
where
    F: Fn(&K, &V) -> Option<Duration> + Send + Sync + 'static,
{
    fn expire_after_create(&self, key: &K, value: &V, _now: Instant) -> Option<Duration> {
        (self.0)(key, value)
    }

    fn reads_reschedule(&self) -> bool {
        false
    }
}
