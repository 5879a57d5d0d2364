use std::hash::Hash;
use std::sync::Arc;
use std::time::Instant;

use ahash::{AHashMap, RandomState};
use parking_lot::RwLock;

/// A single entry in the store.
///
/// `expires_at = None` means the entry never expires.  The cache layer checks
/// this field inline on every read, so enforcing deadlines needs no lock
/// beyond the shard's own read lock.
pub struct StoreEntry<V> {
    pub value: Arc<V>,
    pub expires_at: Option<Instant>,
}

impl<V> StoreEntry<V> {
    #[inline]
    pub fn is_expired(&self, now: Instant) -> bool {
        is_past(self.expires_at, now)
    }
}

/// `true` once `now` has reached the deadline.
#[inline]
pub fn is_past(expires_at: Option<Instant>, now: Instant) -> bool {
    matches!(expires_at, Some(deadline) if now >= deadline)
}

/// Cache-line padding to prevent false sharing between shards.
#[repr(align(64))]
struct Shard<K, V> {
    map: RwLock<AHashMap<K, StoreEntry<V>>>,
}

/// A thread-safe key-value store backed by `N` independently-locked shards.
///
/// The store knows nothing about capacity; the cache serialises every insert
/// behind its policy lock and evicts before it stores.
pub struct ShardedStore<K, V> {
    shards: Box<[Shard<K, V>]>,
    /// Always `shards.len() - 1`; shards.len() is a power of two.
    shard_mask: usize,
    build_hasher: RandomState,
}

impl<K: Hash + Eq + Clone, V> ShardedStore<K, V> {
    pub fn new(num_shards: usize) -> Self {
        assert!(num_shards.is_power_of_two());
        let shards = (0..num_shards)
            .map(|_| Shard {
                map: RwLock::new(AHashMap::new()),
            })
            .collect::<Vec<_>>()
            .into_boxed_slice();

        ShardedStore {
            shards,
            shard_mask: num_shards - 1,
            build_hasher: RandomState::new(),
        }
    }

    #[inline]
    fn shard(&self, key: &K) -> &Shard<K, V> {
        let h = self.build_hasher.hash_one(key);
        &self.shards[((h >> 32) as usize) & self.shard_mask]
    }

    /// Value and deadline for `key`, expired or not.
    pub fn get_entry(&self, key: &K) -> Option<(Arc<V>, Option<Instant>)> {
        self.shard(key)
            .map
            .read()
            .get(key)
            .map(|e| (Arc::clone(&e.value), e.expires_at))
    }

    /// Stores `value` under `key`, returning the entry it replaced.
    pub fn insert(&self, key: K, value: Arc<V>, expires_at: Option<Instant>) -> Option<StoreEntry<V>> {
        self.shard(&key)
            .map
            .write()
            .insert(key, StoreEntry { value, expires_at })
    }

    /// Moves the deadline of `key`, but only if it still holds `expected`.
    ///
    /// A concurrent replace between the read and the reschedule wins.
    pub fn reschedule(&self, key: &K, expected: &Arc<V>, expires_at: Option<Instant>) {
        if let Some(entry) = self.shard(key).map.write().get_mut(key) {
            if Arc::ptr_eq(&entry.value, expected) {
                entry.expires_at = expires_at;
            }
        }
    }

    pub fn remove(&self, key: &K) -> Option<Arc<V>> {
        self.shard(key).map.write().remove(key).map(|e| e.value)
    }

    /// Removes `key` only if its deadline has passed at `now`.
    pub fn remove_if_expired(&self, key: &K, now: Instant) -> Option<Arc<V>> {
        let mut map = self.shard(key).map.write();
        if map.get(key)?.is_expired(now) {
            map.remove(key).map(|e| e.value)
        } else {
            None
        }
    }

    /// `true` if `key` is present and alive at `now`.
    pub fn contains_live(&self, key: &K, now: Instant) -> bool {
        self.shard(key)
            .map
            .read()
            .get(key)
            .is_some_and(|e| !e.is_expired(now))
    }

    /// Removes and returns every entry whose deadline has passed.
    pub fn drain_expired(&self, now: Instant) -> Vec<(K, Arc<V>)> {
        let mut out = Vec::new();
        for shard in self.shards.iter() {
            let mut map = shard.map.write();
            let dead: Vec<K> = map
                .iter()
                .filter(|(_, e)| e.is_expired(now))
                .map(|(k, _)| k.clone())
                .collect();
            for key in dead {
                if let Some(e) = map.remove(&key) {
                    out.push((key, e.value));
                }
            }
        }
        out
    }

    /// Removes and returns everything.
    pub fn drain_all(&self) -> Vec<(K, Arc<V>)> {
        let mut out = Vec::new();
        for shard in self.shards.iter() {
            out.extend(shard.map.write().drain().map(|(k, e)| (k, e.value)));
        }
        out
    }

    /// Copies out every entry alive at `now`.
    pub fn snapshot(&self, now: Instant) -> Vec<(K, Arc<V>)> {
        let mut out = Vec::new();
        for shard in self.shards.iter() {
            out.extend(
                shard
                    .map
                    .read()
                    .iter()
                    .filter(|(_, e)| !e.is_expired(now))
                    .map(|(k, e)| (k.clone(), Arc::clone(&e.value))),
            );
        }
        out
    }

    /// Number of stored entries, including expired ones not yet purged.
    pub fn len(&self) -> usize {
        self.shards.iter().map(|s| s.map.read().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.shards.iter().all(|s| s.map.read().is_empty())
    }
}
