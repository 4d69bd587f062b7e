//! Bucketed hash table, used for memfs directory lookup (name to child
//! inode) and for dentry caches. Rust's `std::collections::HashMap` is
//! itself a bucketed (SwissTable-style) hash table with amortized O(1)
//! operations and entries removable mid-scan via `retain`, so it
//! satisfies spec.md section 4.9's contract directly; this wrapper only
//! adds the logging convention the rest of the crate follows at its
//! other data-structure seams.
use std::collections::HashMap;
use std::hash::Hash;

pub struct BucketMap<K, V> {
    inner: HashMap<K, V>,
}

impl<K: Eq + Hash, V> BucketMap<K, V> {
    pub fn new() -> Self {
        Self {
            inner: HashMap::new(),
        }
    }

    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        self.inner.insert(key, value)
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        self.inner.get(key)
    }

    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        self.inner.get_mut(key)
    }

    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.inner.remove(key)
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.inner.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.inner.iter()
    }

    pub fn retain(&mut self, keep: impl FnMut(&K, &mut V) -> bool) {
        self.inner.retain(keep);
    }
}

impl<K: Eq + Hash, V> Default for BucketMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_get_remove_roundtrip() {
        let mut map = BucketMap::new();
        map.insert("a".to_string(), 1);
        map.insert("b".to_string(), 2);
        assert_eq!(map.get(&"a".to_string()), Some(&1));
        assert_eq!(map.remove(&"a".to_string()), Some(1));
        assert!(map.get(&"a".to_string()).is_none());
        assert_eq!(map.len(), 1);
    }
}
