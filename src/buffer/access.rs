//! Lossy buffer of read hits awaiting replay into the eviction policy.
//!
//! A hit on the read path only needs to nudge the LRU ordering, and taking
//! the policy mutex for that on every `get` would serialise readers.  Hits are
//! pushed onto a bounded lock-free queue instead and replayed the next time
//! a writer holds the policy lock.
//!
//! When the queue is full the hit is dropped.  The worst outcome of a lost
//! hit is a slightly stale recency order, never a wrong answer.

use crossbeam_queue::ArrayQueue;

/// Queue capacity.  Once full, the read path asks for a drain.
const ACCESS_BUFFER_CAPACITY: usize = 256;

pub struct AccessBuffer<K> {
    queue: ArrayQueue<K>,
}

impl<K: Send> AccessBuffer<K> {
    pub fn new() -> Self {
        AccessBuffer {
            queue: ArrayQueue::new(ACCESS_BUFFER_CAPACITY),
        }
    }

    /// Records a hit.  Returns `false` if the buffer was full and the hit was
    /// dropped; the caller should drain soon.
    #[inline]
    pub fn record(&self, key: K) -> bool {
        self.queue.push(key).is_ok()
    }

    /// Moves every pending hit into `out`, oldest first.
    pub fn drain_into(&self, out: &mut Vec<K>) {
        while let Some(key) = self.queue.pop() {
            out.push(key);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

impl<K: Send> Default for AccessBuffer<K> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drains_in_arrival_order() {
        let buf = AccessBuffer::new();
        buf.record(1u32);
        buf.record(2);
        let mut out = Vec::new();
        buf.drain_into(&mut out);
        assert_eq!(out, vec![1, 2]);
        assert!(buf.is_empty());
    }

    #[test]
    fn drops_hits_when_full() {
        let buf = AccessBuffer::new();
        for i in 0..ACCESS_BUFFER_CAPACITY {
            assert!(buf.record(i));
        }
        assert!(!buf.record(usize::MAX));
    }
}
