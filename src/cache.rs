use std::convert::Infallible;
use std::hash::Hash;
use std::sync::Arc;
use std::time::{Duration, Instant};

use ahash::AHashMap;
use parking_lot::Mutex;

use crate::buffer::access::AccessBuffer;
use crate::builder::CacheBuilder;
use crate::clock::SharedClock;
use crate::expiry::Expiry;
use crate::listener::{RemovalCause, RemovalListener};
use crate::metrics::stats::{CacheStats, StatsCounter};
use crate::policy::lru::LruPolicy;
use crate::policy::EvictionPolicy;
use crate::store::sharded::{is_past, ShardedStore};

// ---------------------------------------------------------------------------
// Cache interior
// ---------------------------------------------------------------------------

/// Per-key lock shared by concurrent `get_or_compute` callers.
type LoadGate = Arc<Mutex<()>>;

/// Removals collected under a lock, reported after it is released.
type Removed<K, V> = Vec<(K, Arc<V>, RemovalCause)>;

pub(crate) struct Inner<K, V> {
    name: &'static str,
    store: ShardedStore<K, V>,
    /// Every mutation of `store` membership happens with this lock held,
    /// which is what keeps the entry count within capacity.
    policy: Mutex<LruPolicy<K>>,
    expiry: Box<dyn Expiry<K, V>>,
    listener: Option<Box<dyn RemovalListener<K, V>>>,
    clock: SharedClock,
    access: AccessBuffer<K>,
    loaders: Mutex<AHashMap<K, LoadGate>>,
    sweep_interval: Duration,
    last_sweep: Mutex<Instant>,
    metrics: StatsCounter,
}

pub(crate) struct CacheParts<K, V> {
    pub name: &'static str,
    pub max_capacity: usize,
    pub num_shards: usize,
    pub expiry: Box<dyn Expiry<K, V>>,
    pub listener: Option<Box<dyn RemovalListener<K, V>>>,
    pub clock: SharedClock,
    pub sweep_interval: Duration,
}

// ---------------------------------------------------------------------------
// Cache handle
// ---------------------------------------------------------------------------

/// A concurrent, bounded, expiring cache.
///
/// Capacity is an entry count; when a new key arrives at a full cache the
/// least recently used entry is evicted first.  Each entry carries its own
/// deadline, computed by the configured [`Expiry`] on create, update and read.
/// Expired entries are never returned and are purged lazily on access and by
/// a sweep piggy-backed on writes (see [`Cache::run_pending_tasks`]).
///
/// Handles are cheap to clone and share one interior.
///
/// # Example
/// ```
/// use tollgate::CacheBuilder;
/// use std::time::Duration;
///
/// let cache: tollgate::Cache<String, u32> = CacheBuilder::new(100)
///     .time_to_live(Duration::from_secs(60))
///     .build();
/// cache.insert("hello".to_string(), 7);
/// assert_eq!(cache.get(&"hello".to_string()).as_deref(), Some(&7));
/// ```
pub struct Cache<K, V> {
    inner: Arc<Inner<K, V>>,
}

impl<K, V> Clone for Cache<K, V> {
    fn clone(&self) -> Self {
        Cache {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// A load gate taken by `try_get_or_compute`, handed back when dropped.
struct HeldLoadGate<'a, K, V>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    cache: &'a Cache<K, V>,
    key: &'a K,
    gate: LoadGate,
}

impl<K, V> Drop for HeldLoadGate<'_, K, V>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    fn drop(&mut self) {
        self.cache.release_load_gate(self.key, &self.gate);
    }
}

impl<K, V> Cache<K, V>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    pub(crate) fn from_parts(parts: CacheParts<K, V>) -> Self {
        let now = parts.clock.now();
        Cache {
            inner: Arc::new(Inner {
                name: parts.name,
                store: ShardedStore::new(parts.num_shards),
                policy: Mutex::new(LruPolicy::new(parts.max_capacity)),
                expiry: parts.expiry,
                listener: parts.listener,
                clock: parts.clock,
                access: AccessBuffer::new(),
                loaders: Mutex::new(AHashMap::new()),
                sweep_interval: parts.sweep_interval,
                last_sweep: Mutex::new(now),
                metrics: StatsCounter::new(),
            }),
        }
    }

    /// Returns a [`CacheBuilder`] for constructing a new cache.
    pub fn builder(max_capacity: usize) -> CacheBuilder<K, V> {
        CacheBuilder::new(max_capacity)
    }

    // -----------------------------------------------------------------------
    // Time helpers
    // -----------------------------------------------------------------------

    #[inline]
    fn deadline(now: Instant, lifetime: Option<Duration>) -> Option<Instant> {
        lifetime.and_then(|d| now.checked_add(d))
    }

    #[inline]
    fn remaining(expires_at: Option<Instant>, now: Instant) -> Option<Duration> {
        expires_at.map(|deadline| deadline.saturating_duration_since(now))
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// Returns the value for `key` if present and not expired.
    ///
    /// A hit re-evaluates the entry's deadline through the read policy.
    pub fn get(&self, key: &K) -> Option<Arc<V>> {
        let value = self.lookup(key, self.inner.clock.now());
        match value {
            Some(_) => self.inner.metrics.record_hit(),
            None => self.inner.metrics.record_miss(),
        }
        value
    }

    fn lookup(&self, key: &K, now: Instant) -> Option<Arc<V>> {
        let (value, expires_at) = self.inner.store.get_entry(key)?;

        if is_past(expires_at, now) {
            self.expire_one(key, now);
            return None;
        }

        if !self.inner.access.record(key.clone()) {
            if let Some(mut policy) = self.inner.policy.try_lock() {
                self.replay_access(&mut policy);
            }
        }

        if self.inner.expiry.reads_reschedule() {
            let current = Self::remaining(expires_at, now);
            let lifetime = self.inner.expiry.expire_after_read(key, &value, now, current);
            if lifetime != current {
                self.inner
                    .store
                    .reschedule(key, &value, Self::deadline(now, lifetime));
            }
        }

        Some(value)
    }

    /// The live value for `key` without touching recency, deadlines or
    /// statistics.
    pub fn peek(&self, key: &K) -> Option<Arc<V>> {
        let (value, expires_at) = self.inner.store.get_entry(key)?;
        if is_past(expires_at, self.inner.clock.now()) {
            None
        } else {
            Some(value)
        }
    }

    /// `true` if `key` holds a live entry.  Does not count as an access.
    pub fn contains(&self, key: &K) -> bool {
        self.inner.store.contains_live(key, self.inner.clock.now())
    }

    /// Copies out every live entry without touching recency or deadlines.
    pub fn snapshot(&self) -> Vec<(K, Arc<V>)> {
        self.inner.store.snapshot(self.inner.clock.now())
    }

    // -----------------------------------------------------------------------
    // Writes
    // -----------------------------------------------------------------------

    /// Inserts `value` for `key`, replacing any previous value.
    ///
    /// A new key gets its lifetime from the create policy; a live key being
    /// replaced gets it from the update policy.  If the cache is full the
    /// least recently used entries are evicted before the new one is stored.
    pub fn insert(&self, key: K, value: V) {
        self.put(key, Arc::new(value));
    }

    /// Stores `value` only if `key` has no live entry.  Returns `false`,
    /// leaving the cache unchanged, if one exists.
    ///
    /// The check and the store happen under one lock, so two racing callers
    /// cannot both succeed and neither can replace an entry written by
    /// [`insert`](Self::insert) in between.
    pub fn insert_if_absent(&self, key: K, value: V) -> bool {
        self.write(key, Arc::new(value), true)
    }

    fn put(&self, key: K, value: Arc<V>) -> Arc<V> {
        self.write(key, Arc::clone(&value), false);
        value
    }

    fn write(&self, key: K, value: Arc<V>, only_if_absent: bool) -> bool {
        let now = self.inner.clock.now();
        let mut removed: Removed<K, V> = Vec::new();
        {
            let mut policy = self.inner.policy.lock();
            self.replay_access(&mut policy);

            let previous = self.inner.store.get_entry(&key);
            if only_if_absent {
                if let Some((_, expiry)) = previous {
                    if !is_past(expiry, now) {
                        return false;
                    }
                }
            }
            let (expires_at, displaced_cause) = match previous {
                Some((_, old_expiry)) if !is_past(old_expiry, now) => {
                    let current = Self::remaining(old_expiry, now);
                    let lifetime = self
                        .inner
                        .expiry
                        .expire_after_update(&key, &value, now, current);
                    (Self::deadline(now, lifetime), RemovalCause::Replaced)
                }
                _ => {
                    let lifetime = self.inner.expiry.expire_after_create(&key, &value, now);
                    (Self::deadline(now, lifetime), RemovalCause::Expired)
                }
            };

            for victim in policy.on_insert(key.clone()) {
                if let Some(old) = self.inner.store.remove(&victim) {
                    self.inner.metrics.record_eviction(1);
                    removed.push((victim, old, RemovalCause::Capacity));
                }
            }

            if let Some(old) = self
                .inner
                .store
                .insert(key.clone(), Arc::clone(&value), expires_at)
            {
                if displaced_cause == RemovalCause::Expired {
                    self.inner.metrics.record_expiration(1);
                }
                removed.push((key, old.value, displaced_cause));
            }
        }

        self.notify(removed);
        self.maybe_sweep(now);
        true
    }

    /// Returns the value for `key`, computing and storing it if absent.
    ///
    /// Concurrent callers for the same absent key run `init` at most once
    /// between them; the rest block until the value is stored.
    pub fn get_or_compute<F>(&self, key: K, init: F) -> Arc<V>
    where
        F: FnOnce(&K) -> V,
    {
        match self.try_get_or_compute(key, |k| Ok::<V, Infallible>(init(k))) {
            Ok(value) => value,
            Err(never) => match never {},
        }
    }

    /// Fallible [`get_or_compute`](Self::get_or_compute).
    ///
    /// An error is returned only to the caller whose `init` produced it, and
    /// nothing is stored.  Callers that were waiting on that computation find
    /// the key still absent and run their own `init`.
    pub fn try_get_or_compute<F, E>(&self, key: K, init: F) -> Result<Arc<V>, E>
    where
        F: FnOnce(&K) -> Result<V, E>,
    {
        if let Some(value) = self.get(&key) {
            return Ok(value);
        }

        // Released on drop, so a panicking `init` cannot leak the gate.
        let held = HeldLoadGate {
            cache: self,
            key: &key,
            gate: self.load_gate(&key),
        };
        let _loading = held.gate.lock();
        match self.lookup(&key, self.inner.clock.now()) {
            Some(value) => Ok(value),
            None => match init(&key) {
                Ok(value) => {
                    self.inner.metrics.record_load(true);
                    Ok(self.put(key.clone(), Arc::new(value)))
                }
                Err(err) => {
                    self.inner.metrics.record_load(false);
                    Err(err)
                }
            },
        }
    }

    fn load_gate(&self, key: &K) -> LoadGate {
        let mut loaders = self.inner.loaders.lock();
        Arc::clone(loaders.entry(key.clone()).or_default())
    }

    fn release_load_gate(&self, key: &K, gate: &LoadGate) {
        let mut loaders = self.inner.loaders.lock();
        // One reference in the map plus ours: nobody else is waiting.
        if Arc::strong_count(gate) == 2 {
            loaders.remove(key);
        }
    }

    // -----------------------------------------------------------------------
    // Removal
    // -----------------------------------------------------------------------

    /// Removes the entry for `key`, if present.
    pub fn invalidate(&self, key: &K) {
        let removed = {
            let mut policy = self.inner.policy.lock();
            let removed = self.inner.store.remove(key);
            policy.on_remove(key);
            removed
        };
        if let Some(value) = removed {
            self.notify(vec![(key.clone(), value, RemovalCause::Explicit)]);
        }
    }

    /// Removes every entry.
    pub fn invalidate_all(&self) {
        let removed: Removed<K, V> = {
            let mut policy = self.inner.policy.lock();
            policy.clear();
            self.inner.access.drain_into(&mut Vec::new());
            self.inner
                .store
                .drain_all()
                .into_iter()
                .map(|(k, v)| (k, v, RemovalCause::Explicit))
                .collect()
        };
        self.notify(removed);
    }

    fn expire_one(&self, key: &K, now: Instant) {
        let removed = {
            let mut policy = self.inner.policy.lock();
            let removed = self.inner.store.remove_if_expired(key, now);
            if removed.is_some() {
                policy.on_remove(key);
                self.inner.metrics.record_expiration(1);
            }
            removed
        };
        if let Some(value) = removed {
            self.notify(vec![(key.clone(), value, RemovalCause::Expired)]);
        }
    }

    // -----------------------------------------------------------------------
    // Maintenance
    // -----------------------------------------------------------------------

    /// Purges every expired entry now.
    ///
    /// Writes already trigger this at most once per sweep interval; call it
    /// directly to reclaim memory on a quiet cache.
    pub fn run_pending_tasks(&self) {
        let now = self.inner.clock.now();
        *self.inner.last_sweep.lock() = now;
        self.sweep(now);
    }

    fn maybe_sweep(&self, now: Instant) {
        let Some(mut last) = self.inner.last_sweep.try_lock() else {
            return;
        };
        if now.saturating_duration_since(*last) < self.inner.sweep_interval {
            return;
        }
        *last = now;
        drop(last);
        self.sweep(now);
    }

    fn sweep(&self, now: Instant) {
        let removed: Removed<K, V> = {
            let mut policy = self.inner.policy.lock();
            self.replay_access(&mut policy);
            let expired = self.inner.store.drain_expired(now);
            for (key, _) in &expired {
                policy.on_remove(key);
            }
            self.inner.metrics.record_expiration(expired.len() as u64);
            expired
                .into_iter()
                .map(|(k, v)| (k, v, RemovalCause::Expired))
                .collect()
        };
        if !removed.is_empty() {
            tracing::debug!(cache = self.inner.name, purged = removed.len(), "swept expired entries");
        }
        self.notify(removed);
    }

    fn replay_access(&self, policy: &mut LruPolicy<K>) {
        let mut hits = Vec::new();
        self.inner.access.drain_into(&mut hits);
        for key in &hits {
            policy.on_access(key);
        }
    }

    fn notify(&self, removed: Removed<K, V>) {
        let Some(listener) = &self.inner.listener else {
            return;
        };
        for (key, value, cause) in removed {
            listener.on_removal(&key, value, cause);
        }
    }

    // -----------------------------------------------------------------------
    // Introspection
    // -----------------------------------------------------------------------

    pub fn stats(&self) -> CacheStats {
        self.inner.metrics.snapshot()
    }

    /// Number of stored entries.  May include expired entries that have not
    /// been purged yet; never exceeds the capacity.
    pub fn entry_count(&self) -> usize {
        self.inner.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.store.is_empty()
    }

    pub fn max_capacity(&self) -> usize {
        self.inner.policy.lock().capacity()
    }
}
