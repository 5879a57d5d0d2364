//! Removal listeners: callbacks invoked whenever an entry leaves the cache.
//!
//! # Example
//! ```
//! use tollgate::CacheBuilder;
//! use tollgate::listener::RemovalCause;
//! use std::sync::{Arc, Mutex};
//!
//! let log: Arc<Mutex<Vec<(u64, RemovalCause)>>> = Arc::new(Mutex::new(Vec::new()));
//! let log2 = Arc::clone(&log);
//!
//! let cache: tollgate::Cache<u64, u64> = CacheBuilder::new(2)
//!     .removal_listener(move |key: &u64, _val, cause| {
//!         log2.lock().unwrap().push((*key, cause));
//!     })
//!     .build();
//!
//! cache.insert(1, 10);
//! cache.insert(2, 20);
//! cache.insert(3, 30); // evicts 1
//! assert_eq!(log.lock().unwrap()[0], (1, RemovalCause::Capacity));
//! ```

use std::sync::Arc;

/// The reason an entry was removed from the cache.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RemovalCause {
    /// The cache was full and this entry was the least recently used.
    Capacity,
    /// Its deadline passed.
    Expired,
    /// Removed via [`Cache::invalidate`] or [`Cache::invalidate_all`].
    ///
    /// [`Cache::invalidate`]: crate::Cache::invalidate
    /// [`Cache::invalidate_all`]: crate::Cache::invalidate_all
    Explicit,
    /// The value was overwritten by an insert for the same key.
    Replaced,
}

impl RemovalCause {
    /// `true` for removals the cache decided on by itself.
    pub fn was_evicted(&self) -> bool {
        matches!(self, RemovalCause::Capacity | RemovalCause::Expired)
    }
}

/// A callback invoked each time an entry is removed.
///
/// The listener always runs after the cache has released its internal locks,
/// so calling back into the same cache is allowed.
pub trait RemovalListener<K, V>: Send + Sync + 'static {
    fn on_removal(&self, key: &K, value: Arc<V>, cause: RemovalCause);
}

/// A [`RemovalListener`] backed by a closure.
///
/// Created via [`CacheBuilder::removal_listener`](crate::CacheBuilder::removal_listener).
pub struct FnListener<F>(pub F);

impl<K, V, F> RemovalListener<K, V> for FnListener<F>
where
    F: Fn(&K, Arc<V>, RemovalCause) + Send + Sync + 'static,
{
    fn on_removal(&self, key: &K, value: Arc<V>, cause: RemovalCause) {
        (self.0)(key, value, cause)
    }
}
