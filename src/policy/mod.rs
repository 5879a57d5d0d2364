pub mod lru;

use std::hash::Hash;

/// Chooses which entries leave a full cache.
///
/// All methods are called with the cache's policy mutex held, so
/// implementors only need to be `Send`.
pub trait EvictionPolicy<K: Hash + Eq>: Send {
    /// Records a read hit on `key`.
    fn on_access(&mut self, key: &K);

    /// Starts tracking `key`, or refreshes it if already tracked.
    ///
    /// Returns the keys that must be evicted to stay within capacity.  The key
    /// just inserted is never among them.
    fn on_insert(&mut self, key: K) -> Vec<K>;

    /// Stops tracking `key`.
    fn on_remove(&mut self, key: &K);

    /// Drops every tracked key.
    fn clear(&mut self);

    /// Number of tracked keys.
    fn len(&self) -> usize;

    /// Maximum number of keys.
    fn capacity(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
