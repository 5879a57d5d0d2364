use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use crate::cache::{Cache, CacheParts};
use crate::clock::{SharedClock, SystemClock};
use crate::expiry::{Expiry, FixedTti, FixedTtl, FnCreateExpiry, NoExpiry};
use crate::listener::{FnListener, RemovalCause, RemovalListener};

/// Default interval between piggy-backed sweeps of expired entries.
const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// Builder for configuring and constructing a [`Cache`].
///
/// # Example
/// ```
/// use tollgate::CacheBuilder;
/// use std::time::Duration;
///
/// let cache: tollgate::Cache<String, String> = CacheBuilder::new(1_000)
///     .name("sessions")
///     .time_to_idle(Duration::from_secs(300))
///     .build();
/// ```
pub struct CacheBuilder<K, V> {
    name: &'static str,
    max_capacity: usize,
    num_shards: usize,
    expiry: Box<dyn Expiry<K, V>>,
    listener: Option<Box<dyn RemovalListener<K, V>>>,
    clock: SharedClock,
    sweep_interval: Duration,
}

impl<K: 'static, V: 'static> CacheBuilder<K, V> {
    /// `max_capacity` is the maximum number of entries.
    pub fn new(max_capacity: usize) -> Self {
        assert!(max_capacity > 0, "max_capacity must be greater than 0");
        CacheBuilder {
            name: "cache",
            max_capacity,
            num_shards: 16,
            expiry: Box::new(NoExpiry),
            listener: None,
            clock: Arc::new(SystemClock),
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
        }
    }

    /// Label used in log events.
    pub fn name(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }

    /// Set the number of internal shards (must be a power of two; default: 16).
    pub fn num_shards(mut self, n: usize) -> Self {
        assert!(n > 0 && n.is_power_of_two(), "num_shards must be a power of two");
        self.num_shards = n;
        self
    }

    /// Each entry expires `ttl` after it was **created**; reads and
    /// replacements do not extend it.
    pub fn time_to_live(self, ttl: Duration) -> Self {
        self.expire_after(FixedTtl(ttl))
    }

    /// Each entry expires `tti` after it was **last read or written**.
    pub fn time_to_idle(self, tti: Duration) -> Self {
        self.expire_after(FixedTti(tti))
    }

    /// Use a custom per-entry expiration policy.
    pub fn expire_after<E: Expiry<K, V>>(mut self, expiry: E) -> Self {
        self.expiry = Box::new(expiry);
        self
    }

    /// Compute each entry's lifetime from its key and value at creation;
    /// later events keep the deadline.
    ///
    /// # Example
    /// ```
    /// use tollgate::CacheBuilder;
    /// use std::time::Duration;
    ///
    /// let cache: tollgate::Cache<u64, &'static str> = CacheBuilder::new(10)
    ///     .expire_after_create(|_k: &u64, v: &&str| {
    ///         (!v.is_empty()).then(|| Duration::from_secs(30))
    ///     })
    ///     .build();
    /// ```
    pub fn expire_after_create<F>(self, f: F) -> Self
    where
        F: Fn(&K, &V) -> Option<Duration> + Send + Sync + 'static,
    {
        self.expire_after(FnCreateExpiry(f))
    }

    /// Register a removal listener closure.
    ///
    /// Runs on the thread that caused the removal, after internal locks are
    /// released.
    pub fn removal_listener<F>(mut self, f: F) -> Self
    where
        F: Fn(&K, Arc<V>, RemovalCause) + Send + Sync + 'static,
    {
        self.listener = Some(Box::new(FnListener(f)));
        self
    }

    /// Register a removal listener via the [`RemovalListener`] trait.
    pub fn removal_listener_impl<L: RemovalListener<K, V>>(mut self, l: L) -> Self {
        self.listener = Some(Box::new(l));
        self
    }

    /// Time source for deadlines (default: [`SystemClock`]).
    pub fn clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    /// Minimum time between sweeps triggered by writes.
    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }
}

impl<K, V> CacheBuilder<K, V>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    pub fn build(self) -> Cache<K, V> {
        Cache::from_parts(CacheParts {
            name: self.name,
            max_capacity: self.max_capacity,
            num_shards: self.num_shards,
            expiry: self.expiry,
            listener: self.listener,
            clock: self.clock,
            sweep_interval: self.sweep_interval,
        })
    }
}
