use std::hash::Hash;

use ahash::AHashMap;

use super::EvictionPolicy;

/// Sentinel slots in the arena.
const HEAD: usize = 0; // most recently used end
const TAIL: usize = 1; // least recently used end
const NIL: usize = usize::MAX;

struct Slot<K> {
    /// `None` for the sentinels and for free slots.
    key: Option<K>,
    prev: usize,
    next: usize,
}

impl<K> Slot<K> {
    fn new(key: Option<K>, prev: usize, next: usize) -> Self {
        Slot { key, prev, next }
    }
}

/// O(1) least-recently-used ordering over an index-linked arena.
pub struct LruPolicy<K> {
    slots: Vec<Slot<K>>,
    index: AHashMap<K, usize>,
    free: Vec<usize>,
    capacity: usize,
}

impl<K: Hash + Eq + Clone + Send> LruPolicy<K> {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "capacity must be greater than 0");
        let slots = vec![Slot::new(None, NIL, TAIL), Slot::new(None, HEAD, NIL)];
        LruPolicy {
            slots,
            index: AHashMap::new(),
            free: Vec::new(),
            capacity,
        }
    }

    fn push_front(&mut self, idx: usize) {
        let first = self.slots[HEAD].next;
        self.slots[idx].prev = HEAD;
        self.slots[idx].next = first;
        self.slots[HEAD].next = idx;
        self.slots[first].prev = idx;
    }

    fn detach(&mut self, idx: usize) {
        let (prev, next) = (self.slots[idx].prev, self.slots[idx].next);
        self.slots[prev].next = next;
        self.slots[next].prev = prev;
        self.slots[idx].prev = NIL;
        self.slots[idx].next = NIL;
    }

    fn alloc(&mut self, key: K) -> usize {
        match self.free.pop() {
            Some(idx) => {
                self.slots[idx].key = Some(key);
                idx
            }
            None => {
                self.slots.push(Slot::new(Some(key), NIL, NIL));
                self.slots.len() - 1
            }
        }
    }

    fn release(&mut self, idx: usize) -> Option<K> {
        self.detach(idx);
        self.free.push(idx);
        self.slots[idx].key.take()
    }

    fn pop_back(&mut self) -> Option<K> {
        let idx = self.slots[TAIL].prev;
        if idx == HEAD {
            return None;
        }
        let key = self.release(idx)?;
        self.index.remove(&key);
        Some(key)
    }

    /// The key that would be evicted next, if any.
    #[cfg(test)]
    pub fn peek_lru(&self) -> Option<&K> {
        let idx = self.slots[TAIL].prev;
        if idx == HEAD {
            None
        } else {
            self.slots[idx].key.as_ref()
        }
    }
}

impl<K: Hash + Eq + Clone + Send> EvictionPolicy<K> for LruPolicy<K> {
    fn on_access(&mut self, key: &K) {
        if let Some(&idx) = self.index.get(key) {
            self.detach(idx);
            self.push_front(idx);
        }
    }

    fn on_insert(&mut self, key: K) -> Vec<K> {
        if let Some(&idx) = self.index.get(&key) {
            self.detach(idx);
            self.push_front(idx);
            return Vec::new();
        }

        let mut victims = Vec::new();
        while self.index.len() >= self.capacity {
            match self.pop_back() {
                Some(victim) => victims.push(victim),
                None => break,
            }
        }

        let idx = self.alloc(key.clone());
        self.index.insert(key, idx);
        self.push_front(idx);
        victims
    }

    fn on_remove(&mut self, key: &K) {
        if let Some(idx) = self.index.remove(key) {
            self.release(idx);
        }
    }

    fn clear(&mut self) {
        self.slots.truncate(2);
        self.slots[HEAD].next = TAIL;
        self.slots[TAIL].prev = HEAD;
        self.index.clear();
        self.free.clear();
    }

    fn len(&self) -> usize {
        self.index.len()
    }

    fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evicts_before_admitting_over_capacity() {
        let mut lru: LruPolicy<&str> = LruPolicy::new(2);
        assert!(lru.on_insert("a").is_empty());
        assert!(lru.on_insert("b").is_empty());
        assert_eq!(lru.on_insert("c"), vec!["a"]);
        assert_eq!(lru.len(), 2);
    }

    #[test]
    fn access_moves_key_to_front() {
        let mut lru: LruPolicy<&str> = LruPolicy::new(2);
        lru.on_insert("a");
        lru.on_insert("b");
        lru.on_access(&"a");
        assert_eq!(lru.peek_lru(), Some(&"b"));
        assert_eq!(lru.on_insert("c"), vec!["b"]);
    }

    #[test]
    fn reinsert_refreshes_without_eviction() {
        let mut lru: LruPolicy<&str> = LruPolicy::new(2);
        lru.on_insert("a");
        lru.on_insert("b");
        assert!(lru.on_insert("a").is_empty());
        assert_eq!(lru.peek_lru(), Some(&"b"));
    }

    #[test]
    fn removed_slots_are_reused() {
        let mut lru: LruPolicy<u32> = LruPolicy::new(3);
        for k in 0..3 {
            lru.on_insert(k);
        }
        lru.on_remove(&1);
        assert_eq!(lru.len(), 2);
        assert!(lru.on_insert(7).is_empty());
        assert_eq!(lru.slots.len(), 5, "freed slot should be recycled");
    }

    #[test]
    fn clear_resets_ordering() {
        let mut lru: LruPolicy<u32> = LruPolicy::new(2);
        lru.on_insert(1);
        lru.on_insert(2);
        lru.clear();
        assert!(lru.is_empty());
        assert_eq!(lru.peek_lru(), None);
        assert!(lru.on_insert(3).is_empty());
    }
}
