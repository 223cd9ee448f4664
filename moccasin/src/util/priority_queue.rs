//! Stable priority queue.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// A min-priority queue which pulls same-key values in insertion order.
///
/// Each value is stored next to the user-provided key and a unique epoch
/// drawn from a monotonic counter. Items are sorted by key first and by epoch
/// second, so that among values sharing the lowest key, the one inserted first
/// is always pulled first. This is what makes event processing deterministic
/// when several firing requests target the same tag.
///
/// Unlike the conventional `BinaryHeap`, the queue is a min-heap and the
/// values themselves need not be ordered.
pub(crate) struct PriorityQueue<K: Ord + Copy, V> {
    heap: BinaryHeap<Item<K, V>>,
    next_epoch: u64,
}

impl<K: Ord + Copy, V> PriorityQueue<K, V> {
    /// Creates an empty `PriorityQueue`.
    pub(crate) fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            next_epoch: 0,
        }
    }

    /// Returns the number of key-value pairs in the priority queue.
    pub(crate) fn len(&self) -> usize {
        self.heap.len()
    }

    /// Checks whether the queue is empty.
    pub(crate) fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Inserts a new key-value pair.
    ///
    /// This operation has *O*(log(*N*)) amortized complexity.
    pub(crate) fn insert(&mut self, key: K, value: V) {
        let epoch = self.next_epoch;
        assert_ne!(epoch, u64::MAX);
        self.next_epoch += 1;

        self.heap.push(Item { key, epoch, value });
    }

    /// Pulls the value with the lowest key.
    ///
    /// If there are several equal lowest keys, the value which was inserted
    /// first is returned.
    pub(crate) fn pull(&mut self) -> Option<(K, V)> {
        self.heap.pop().map(|item| (item.key, item.value))
    }

    /// Pulls the value with the lowest key provided that the predicate holds
    /// for that key.
    pub(crate) fn pull_if(&mut self, predicate: impl FnOnce(&K) -> bool) -> Option<(K, V)> {
        if predicate(self.peek_key()?) {
            return self.pull();
        }

        None
    }

    /// Peeks a reference to the lowest key, leaving it in the queue.
    pub(crate) fn peek_key(&self) -> Option<&K> {
        self.heap.peek().map(|item| &item.key)
    }

    /// Removes all key-value pairs.
    ///
    /// The epoch counter is not reset, which preserves insertion order for
    /// values inserted afterwards.
    pub(crate) fn clear(&mut self) {
        self.heap.clear();
    }
}

impl<K: Ord + Copy, V> Default for PriorityQueue<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

/// A heap item.
///
/// The ordering is reversed so that the std max-heap yields the item with
/// the lowest `(key, epoch)` pair first.
struct Item<K, V> {
    key: K,
    epoch: u64,
    value: V,
}

impl<K: Ord, V> PartialEq for Item<K, V> {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && self.epoch == other.epoch
    }
}

impl<K: Ord, V> Eq for Item<K, V> {}

impl<K: Ord, V> PartialOrd for Item<K, V> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<K: Ord, V> Ord for Item<K, V> {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .key
            .cmp(&self.key)
            .then_with(|| other.epoch.cmp(&self.epoch))
    }
}
