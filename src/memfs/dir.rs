//! Memfs directory content: a bucket-hash of child dentries (spec.md
//! section 3, "Directories are a bucket-hash of child dentries") paired
//! with an order-preserving slot map so `getdents` can resume from a
//! stable cookie across calls, grounded in the `BucketMap`/`OrderedMap`
//! pair spec.md section 4.9 names as this crate's two intrusive-container
//! shapes.

use crate::ds::{BucketMap, OrderedMap};
use crate::stat::FileKind;

struct Entry {
    name: String,
    ino: u64,
    kind: FileKind,
}

pub struct MemDir {
    entries: OrderedMap<Entry>,
    index: BucketMap<String, u64>,
    next_slot: u64,
}

impl MemDir {
    /// A freshly created directory already has `.` and `..`, per the
    /// memfs data model (spec.md section 3) and the directory-entry
    /// conventions blkfs also follows (spec.md section 4.8).
    pub fn new(self_ino: u64, parent_ino: u64) -> Self {
        let mut dir = Self {
            entries: OrderedMap::new(),
            index: BucketMap::new(),
            next_slot: 0,
        };
        dir.insert(".", self_ino, FileKind::Directory);
        dir.insert("..", parent_ino, FileKind::Directory);
        dir
    }

    pub fn insert(&mut self, name: &str, ino: u64, kind: FileKind) {
        let slot = self.next_slot;
        self.next_slot += 1;
        self.entries.insert(
            slot,
            Entry {
                name: name.to_string(),
                ino,
                kind,
            },
        );
        self.index.insert(name.to_string(), slot);
    }

    pub fn remove(&mut self, name: &str) -> Option<(u64, FileKind)> {
        let slot = self.index.remove(&name.to_string())?;
        let entry = self.entries.remove(slot)?;
        Some((entry.ino, entry.kind))
    }

    pub fn lookup(&self, name: &str) -> Option<(u64, FileKind)> {
        let slot = self.index.get(&name.to_string())?;
        self.entries.get(*slot).map(|e| (e.ino, e.kind))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(&name.to_string())
    }

    /// True once only `.` and `..` remain (spec.md section 4.8: "`rmdir`
    /// fails if the directory has entries other than `.` and `..`").
    pub fn is_empty(&self) -> bool {
        self.entries.len() <= 2
    }

    pub fn len(&self) -> u64 {
        self.entries.len() as u64
    }

    pub fn iter_from(&self, cookie: u64, limit: usize) -> Vec<(u64, u64, FileKind, String)> {
        self.entries
            .range_from(cookie)
            .take(limit)
            .map(|(slot, e)| (*slot + 1, e.ino, e.kind, e.name.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_directory_has_dot_and_dotdot() {
        let dir = MemDir::new(5, 1);
        assert_eq!(dir.lookup(".").unwrap().0, 5);
        assert_eq!(dir.lookup("..").unwrap().0, 1);
        assert!(dir.is_empty());
    }

    #[test]
    fn insert_remove_roundtrip_via_index() {
        let mut dir = MemDir::new(5, 1);
        dir.insert("a.txt", 9, FileKind::Regular);
        assert_eq!(dir.lookup("a.txt"), Some((9, FileKind::Regular)));
        assert!(!dir.is_empty());
        assert_eq!(dir.remove("a.txt"), Some((9, FileKind::Regular)));
        assert!(dir.lookup("a.txt").is_none());
        assert!(dir.is_empty());
    }

    #[test]
    fn iter_from_resumes_at_the_returned_cookie() {
        let mut dir = MemDir::new(5, 1);
        dir.insert("a", 10, FileKind::Regular);
        dir.insert("b", 11, FileKind::Regular);
        dir.insert("c", 12, FileKind::Regular);
        let first = dir.iter_from(0, 3);
        assert_eq!(first.len(), 3);
        let cookie = first.last().unwrap().0;
        let rest = dir.iter_from(cookie, 10);
        assert_eq!(rest.len(), 2);
        assert_eq!(rest[0].3, "a");
    }
}
