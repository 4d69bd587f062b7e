//! In-memory filesystem: inline-embedded-or-page-cached regular files,
//! bucket-hashed directories, and inline symlinks (spec.md section 3,
//! "Memfs inode"). Every inode's filesystem-private content (the
//! embedded bytes / page cache / directory / symlink target) lives in
//! `MemFs::records`, keyed by `ino`, independent of whether that inode
//! currently has a resident `Rc<Inode, _>` handle in its superblock's
//! `Itable` — exactly the "per-filesystem extension looked up by (dev,
//! ino), not stored on the generic inode" split `vfs::inode` documents.
//!
//! No teacher module backs this directly (the teacher's one filesystem is
//! always block-backed); it is grounded in the teacher's `Inode`/`Itable`
//! shape for inode lifecycle and in the `BucketMap`/`OrderedMap` pair
//! (spec.md section 4.9) for directory and page-cache storage.

mod dir;
mod pagecache;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use crate::ds::BucketMap;
use crate::error::{err, err_ctx, ErrorKind, Result};
use crate::param::{EMBEDDED_DATA_LEN, MAX_FILE_SIZE, PAGESIZE, ROOTINO};
use crate::stat::{DirEntry, FileKind};
use crate::vfs::inode::{dirty_inode, FileSystemOps, Inode, InodeGuard, InodeState, Itable, RcInode};
use crate::vfs::superblock::{alloc_dev, Superblock};

use dir::MemDir;
use pagecache::PageCache;

enum Content {
    Embedded([u8; EMBEDDED_DATA_LEN]),
    Paged(PageCache),
    Directory(MemDir),
    Symlink(String),
    Device,
}

struct MemRecord {
    kind: FileKind,
    nlink: i16,
    size: u64,
    nblocks: u64,
    content: Content,
}

/// One mounted memfs instance. Holds a [`Weak`] back-reference to its own
/// `Itable` (so new child inodes can be allocated into it) and to its own
/// `Arc<Self>` (so a freshly allocated `Inode` can be given an `ops`
/// handle) rather than a strong one, avoiding the `Itable -> Inode -> ops
/// -> Itable` reference cycle that a strong back-pointer would create;
/// both are filled in by `Arc::new_cyclic` at construction.
pub struct MemFs {
    dev: u64,
    itable: Weak<Itable>,
    self_weak: Weak<MemFs>,
    next_ino: AtomicU64,
    records: Mutex<BucketMap<u64, MemRecord>>,
}

impl MemFs {
    /// Mounts a fresh memfs instance and returns its superblock, with an
    /// empty root directory already populated at `ROOTINO`.
    pub fn mount() -> Arc<Superblock> {
        let dev = alloc_dev();
        let itable: Arc<Itable> = Arc::new(Itable::new("memfs itable"));
        let mut records = BucketMap::new();
        records.insert(
            ROOTINO,
            MemRecord {
                kind: FileKind::Directory,
                nlink: 2,
                size: 2,
                nblocks: 0,
                content: Content::Directory(MemDir::new(ROOTINO, ROOTINO)),
            },
        );
        let fs = Arc::new_cyclic(|weak: &Weak<MemFs>| MemFs {
            dev,
            itable: Arc::downgrade(&itable),
            self_weak: weak.clone(),
            next_ino: AtomicU64::new(ROOTINO + 1),
            records: Mutex::new(records),
        });
        Superblock::new(dev, fs, itable)
    }

    fn ops_handle(&self) -> Arc<dyn FileSystemOps> {
        self.self_weak
            .upgrade()
            .expect("memfs dropped while still referenced by a live inode")
    }

    /// Finds or allocates the `Rc<Inode, _>` handle for `ino`, marking a
    /// freshly allocated slot invalid so its first `lock()` calls `load`.
    fn inode_handle(&self, ino: u64, kind: FileKind) -> Result<RcInode> {
        let itable = self
            .itable
            .upgrade()
            .ok_or(())
            .or_else(|_| err_ctx(ErrorKind::Stale, "memfs unmounted while still in use"))?;
        let dev = self.dev;
        let ops = self.ops_handle();
        itable
            .find_or_alloc(
                move |inode| inode.dev == dev && inode.ino == ino,
                move || Inode::new(dev, ino, ops, kind),
            )
            .ok_or(())
            .or_else(|_| err_ctx(ErrorKind::OutOfMemory, "memfs inode table full"))
    }

    fn lookup_in(records: &BucketMap<u64, MemRecord>, dir_ino: u64, name: &str) -> Option<(u64, FileKind)> {
        match records.get(&dir_ino) {
            Some(MemRecord {
                content: Content::Directory(d),
                ..
            }) => d.lookup(name),
            _ => None,
        }
    }
}

impl FileSystemOps for MemFs {
    fn open(&self, inode: &InodeGuard<'_>) -> Result<()> {
        match inode.kind {
            FileKind::Regular | FileKind::Directory | FileKind::Symlink => Ok(()),
            _ => err(ErrorKind::NotSupported),
        }
    }

    fn ilookup(&self, dir: &InodeGuard<'_>, name: &str) -> Result<RcInode> {
        if dir.kind != FileKind::Directory {
            return err_ctx(ErrorKind::NotADirectory, "ilookup on non-directory");
        }
        let found = {
            let records = self.records.lock().unwrap();
            Self::lookup_in(&records, dir.inode.ino, name)
        };
        match found {
            Some((ino, kind)) => self.inode_handle(ino, kind),
            None => err(ErrorKind::NoSuchEntry),
        }
    }

    fn create(&self, dir: &mut InodeGuard<'_>, name: &str, kind: FileKind) -> Result<RcInode> {
        if dir.kind != FileKind::Directory {
            return err_ctx(ErrorKind::NotADirectory, "create in non-directory");
        }
        let dir_ino = dir.inode.ino;
        let ino = self.next_ino.fetch_add(1, Ordering::Relaxed);
        {
            let mut records = self.records.lock().unwrap();
            if Self::lookup_in(&records, dir_ino, name).is_some() {
                return err_ctx(ErrorKind::AlreadyExists, "create: name already exists");
            }
            let content = match kind {
                FileKind::Symlink => Content::Symlink(String::new()),
                _ => Content::Embedded([0u8; EMBEDDED_DATA_LEN]),
            };
            records.insert(
                ino,
                MemRecord {
                    kind,
                    nlink: 1,
                    size: 0,
                    nblocks: 0,
                    content,
                },
            );
            if let Some(MemRecord {
                content: Content::Directory(d),
                ..
            }) = records.get_mut(&dir_ino)
            {
                d.insert(name, ino, kind);
            }
        }
        dirty_inode(dir);
        self.inode_handle(ino, kind)
    }

    fn mknod(&self, dir: &mut InodeGuard<'_>, name: &str, major: u32, minor: u32, block: bool) -> Result<RcInode> {
        if dir.kind != FileKind::Directory {
            return err_ctx(ErrorKind::NotADirectory, "mknod in non-directory");
        }
        let kind = if block {
            FileKind::BlockDevice { major, minor }
        } else {
            FileKind::CharDevice { major, minor }
        };
        let dir_ino = dir.inode.ino;
        let ino = self.next_ino.fetch_add(1, Ordering::Relaxed);
        {
            let mut records = self.records.lock().unwrap();
            if Self::lookup_in(&records, dir_ino, name).is_some() {
                return err_ctx(ErrorKind::AlreadyExists, "mknod: name already exists");
            }
            records.insert(
                ino,
                MemRecord {
                    kind,
                    nlink: 1,
                    size: 0,
                    nblocks: 0,
                    content: Content::Device,
                },
            );
            if let Some(MemRecord {
                content: Content::Directory(d),
                ..
            }) = records.get_mut(&dir_ino)
            {
                d.insert(name, ino, kind);
            }
        }
        dirty_inode(dir);
        self.inode_handle(ino, kind)
    }

    fn link(&self, dir: &mut InodeGuard<'_>, name: &str, target: &RcInode) -> Result<()> {
        if dir.kind != FileKind::Directory {
            return err_ctx(ErrorKind::NotADirectory, "link in non-directory");
        }
        let dir_ino = dir.inode.ino;
        {
            let records = self.records.lock().unwrap();
            if Self::lookup_in(&records, dir_ino, name).is_some() {
                return err_ctx(ErrorKind::AlreadyExists, "link: name already exists");
            }
        }
        let mut target_guard = target.lock()?;
        if target_guard.kind == FileKind::Directory {
            return err_ctx(ErrorKind::PermissionDenied, "hard links to directories are not allowed");
        }
        let target_ino = target.ino;
        let target_kind = target_guard.kind;
        target_guard.nlink += 1;
        dirty_inode(&mut target_guard);
        drop(target_guard);
        {
            let mut records = self.records.lock().unwrap();
            if let Some(MemRecord {
                content: Content::Directory(d),
                ..
            }) = records.get_mut(&dir_ino)
            {
                d.insert(name, target_ino, target_kind);
            }
        }
        dirty_inode(dir);
        Ok(())
    }

    fn unlink(&self, dir: &mut InodeGuard<'_>, name: &str) -> Result<()> {
        if dir.kind != FileKind::Directory {
            return err_ctx(ErrorKind::NotADirectory, "unlink in non-directory");
        }
        if name == "." || name == ".." {
            return err_ctx(ErrorKind::PermissionDenied, "unlink refuses . and ..");
        }
        let dir_ino = dir.inode.ino;
        let (target_ino, target_kind) = {
            let records = self.records.lock().unwrap();
            match Self::lookup_in(&records, dir_ino, name) {
                Some(found) => found,
                None => return err(ErrorKind::NoSuchEntry),
            }
        };
        if target_kind == FileKind::Directory {
            return err_ctx(ErrorKind::IsADirectory, "use rmdir to remove a directory");
        }
        // Route the link-count decrement through the normal inode
        // lifecycle: if this drops the last reference, `ArenaObject::
        // finalize` sees nlink == 0 and calls `free` itself, so there is
        // no separate "free it if nobody has it open" check here.
        let target = self.inode_handle(target_ino, target_kind)?;
        {
            let mut guard = target.lock()?;
            guard.nlink -= 1;
            dirty_inode(&mut guard);
        }
        drop(target);
        {
            let mut records = self.records.lock().unwrap();
            if let Some(MemRecord {
                content: Content::Directory(d),
                ..
            }) = records.get_mut(&dir_ino)
            {
                d.remove(name);
            }
        }
        dirty_inode(dir);
        Ok(())
    }

    fn mkdir(&self, dir: &mut InodeGuard<'_>, name: &str) -> Result<RcInode> {
        if dir.kind != FileKind::Directory {
            return err_ctx(ErrorKind::NotADirectory, "mkdir in non-directory");
        }
        let dir_ino = dir.inode.ino;
        let ino = self.next_ino.fetch_add(1, Ordering::Relaxed);
        {
            let mut records = self.records.lock().unwrap();
            if Self::lookup_in(&records, dir_ino, name).is_some() {
                return err_ctx(ErrorKind::AlreadyExists, "mkdir: name already exists");
            }
            records.insert(
                ino,
                MemRecord {
                    kind: FileKind::Directory,
                    nlink: 2,
                    size: 2,
                    nblocks: 0,
                    content: Content::Directory(MemDir::new(ino, dir_ino)),
                },
            );
            if let Some(MemRecord {
                content: Content::Directory(d),
                ..
            }) = records.get_mut(&dir_ino)
            {
                d.insert(name, ino, FileKind::Directory);
            }
        }
        dir.nlink += 1; // the new subdirectory's ".." now points here
        dirty_inode(dir);
        self.inode_handle(ino, FileKind::Directory)
    }

    fn rmdir(&self, dir: &mut InodeGuard<'_>, name: &str) -> Result<()> {
        if dir.kind != FileKind::Directory {
            return err_ctx(ErrorKind::NotADirectory, "rmdir in non-directory");
        }
        if name == "." || name == ".." {
            return err_ctx(ErrorKind::PermissionDenied, "rmdir refuses . and ..");
        }
        let dir_ino = dir.inode.ino;
        let (target_ino, target_kind) = {
            let records = self.records.lock().unwrap();
            match Self::lookup_in(&records, dir_ino, name) {
                Some(found) => found,
                None => return err(ErrorKind::NoSuchEntry),
            }
        };
        if target_kind != FileKind::Directory {
            return err_ctx(ErrorKind::NotADirectory, "rmdir on a non-directory");
        }
        let target = self.inode_handle(target_ino, target_kind)?;
        {
            let records = self.records.lock().unwrap();
            let empty = matches!(
                records.get(&target_ino),
                Some(MemRecord { content: Content::Directory(d), .. }) if d.is_empty()
            );
            if !empty {
                return err_ctx(ErrorKind::InvalidArgument, "rmdir: directory not empty");
            }
        }
        {
            let mut guard = target.lock()?;
            guard.nlink = 0;
            dirty_inode(&mut guard);
        }
        drop(target);
        {
            let mut records = self.records.lock().unwrap();
            if let Some(MemRecord {
                content: Content::Directory(d),
                ..
            }) = records.get_mut(&dir_ino)
            {
                d.remove(name);
            }
        }
        dir.nlink -= 1;
        dirty_inode(dir);
        Ok(())
    }

    fn rename(
        &self,
        old_dir: &mut InodeGuard<'_>,
        old_name: &str,
        new_dir: &mut InodeGuard<'_>,
        new_name: &str,
    ) -> Result<()> {
        if old_dir.kind != FileKind::Directory || new_dir.kind != FileKind::Directory {
            return err_ctx(ErrorKind::NotADirectory, "rename requires directory endpoints");
        }
        let old_dir_ino = old_dir.inode.ino;
        let new_dir_ino = new_dir.inode.ino;
        let (ino, kind) = {
            let records = self.records.lock().unwrap();
            match Self::lookup_in(&records, old_dir_ino, old_name) {
                Some(found) => found,
                None => return err(ErrorKind::NoSuchEntry),
            }
        };
        let replaced = {
            let mut records = self.records.lock().unwrap();
            let replaced = match records.get_mut(&new_dir_ino) {
                Some(MemRecord { content: Content::Directory(d), .. }) => d.remove(new_name),
                _ => None,
            };
            if let Some(MemRecord { content: Content::Directory(d), .. }) = records.get_mut(&old_dir_ino) {
                d.remove(old_name);
            }
            if let Some(MemRecord { content: Content::Directory(d), .. }) = records.get_mut(&new_dir_ino) {
                d.insert(new_name, ino, kind);
            }
            replaced
        };
        if kind == FileKind::Directory {
            let moved = self.inode_handle(ino, kind)?;
            {
                let mut records = self.records.lock().unwrap();
                if let Some(MemRecord { content: Content::Directory(d), .. }) = records.get_mut(&ino) {
                    d.remove("..");
                    d.insert("..", new_dir_ino, FileKind::Directory);
                }
            }
            drop(moved);
            old_dir.nlink -= 1;
            new_dir.nlink += 1;
            dirty_inode(old_dir);
            dirty_inode(new_dir);
        }
        finish_replace(self, replaced)?;
        dirty_inode(old_dir);
        dirty_inode(new_dir);
        Ok(())
    }

    fn rename_within(&self, dir: &mut InodeGuard<'_>, old_name: &str, new_name: &str) -> Result<()> {
        if dir.kind != FileKind::Directory {
            return err_ctx(ErrorKind::NotADirectory, "rename requires a directory");
        }
        if old_name == new_name {
            return Ok(());
        }
        let dir_ino = dir.inode.ino;
        let (ino, kind) = {
            let records = self.records.lock().unwrap();
            match Self::lookup_in(&records, dir_ino, old_name) {
                Some(found) => found,
                None => return err(ErrorKind::NoSuchEntry),
            }
        };
        let replaced = {
            let mut records = self.records.lock().unwrap();
            let replaced = match records.get_mut(&dir_ino) {
                Some(MemRecord { content: Content::Directory(d), .. }) => d.remove(new_name),
                _ => None,
            };
            if let Some(MemRecord { content: Content::Directory(d), .. }) = records.get_mut(&dir_ino) {
                d.remove(old_name);
                d.insert(new_name, ino, kind);
            }
            replaced
        };
        finish_replace(self, replaced)?;
        dirty_inode(dir);
        Ok(())
    }

    fn symlink(&self, dir: &mut InodeGuard<'_>, name: &str, target: &str) -> Result<RcInode> {
        if dir.kind != FileKind::Directory {
            return err_ctx(ErrorKind::NotADirectory, "symlink in non-directory");
        }
        let dir_ino = dir.inode.ino;
        let ino = self.next_ino.fetch_add(1, Ordering::Relaxed);
        {
            let mut records = self.records.lock().unwrap();
            if Self::lookup_in(&records, dir_ino, name).is_some() {
                return err_ctx(ErrorKind::AlreadyExists, "symlink: name already exists");
            }
            records.insert(
                ino,
                MemRecord {
                    kind: FileKind::Symlink,
                    nlink: 1,
                    size: target.len() as u64,
                    nblocks: 0,
                    content: Content::Symlink(target.to_string()),
                },
            );
            if let Some(MemRecord {
                content: Content::Directory(d),
                ..
            }) = records.get_mut(&dir_ino)
            {
                d.insert(name, ino, FileKind::Symlink);
            }
        }
        dirty_inode(dir);
        self.inode_handle(ino, FileKind::Symlink)
    }

    fn readlink(&self, inode: &InodeGuard<'_>) -> Result<String> {
        if inode.kind != FileKind::Symlink {
            return err_ctx(ErrorKind::InvalidArgument, "readlink on a non-symlink");
        }
        let records = self.records.lock().unwrap();
        match records.get(&inode.inode.ino) {
            Some(MemRecord { content: Content::Symlink(target), .. }) => Ok(target.clone()),
            _ => err_ctx(ErrorKind::Stale, "readlink: content missing from memfs store"),
        }
    }

    fn truncate(&self, inode: &mut InodeGuard<'_>, new_size: u64) -> Result<()> {
        if inode.kind != FileKind::Regular {
            return err_ctx(ErrorKind::InvalidArgument, "truncate on a non-regular file");
        }
        if new_size as usize > MAX_FILE_SIZE {
            return err_ctx(ErrorKind::FileTooLarge, "truncate: new size exceeds the maximum file size");
        }
        let old_size = inode.size;
        if new_size == old_size {
            return Ok(());
        }
        let ino = inode.inode.ino;
        let mut records = self.records.lock().unwrap();
        let rec = match records.get_mut(&ino) {
            Some(r) => r,
            None => return err_ctx(ErrorKind::Stale, "truncate: content missing from memfs store"),
        };
        let nblocks = if new_size > old_size {
            grow(rec, old_size, new_size)
        } else {
            shrink(rec, new_size)
        };
        drop(records);
        inode.size = new_size;
        inode.nblocks = nblocks;
        dirty_inode(inode);
        Ok(())
    }

    fn dir_iter(&self, inode: &InodeGuard<'_>, cookie: u64, limit: usize) -> Result<Vec<DirEntry>> {
        if inode.kind != FileKind::Directory {
            return err_ctx(ErrorKind::NotADirectory, "dir_iter on non-directory");
        }
        let records = self.records.lock().unwrap();
        match records.get(&inode.inode.ino) {
            Some(MemRecord { content: Content::Directory(d), .. }) => Ok(d
                .iter_from(cookie, limit)
                .into_iter()
                .map(|(next_cookie, ino, kind, name)| DirEntry {
                    ino,
                    cookie: next_cookie,
                    kind,
                    name,
                })
                .collect()),
            _ => err_ctx(ErrorKind::Stale, "dir_iter: content missing from memfs store"),
        }
    }

    fn read(&self, inode: &mut InodeGuard<'_>, buf: &mut [u8], off: u64) -> Result<usize> {
        if inode.kind != FileKind::Regular {
            return err_ctx(ErrorKind::InvalidArgument, "read on a non-regular file");
        }
        let size = inode.size;
        let records = self.records.lock().unwrap();
        match records.get(&inode.inode.ino) {
            Some(MemRecord { content: Content::Embedded(data), .. }) => {
                if off >= size {
                    return Ok(0);
                }
                let end = size.min(off + buf.len() as u64) as usize;
                let start = off as usize;
                let n = end - start;
                buf[..n].copy_from_slice(&data[start..end]);
                Ok(n)
            }
            Some(MemRecord { content: Content::Paged(cache), .. }) => Ok(cache.read(off, buf, size)),
            _ => err_ctx(ErrorKind::Stale, "read: content missing from memfs store"),
        }
    }

    fn write(&self, inode: &mut InodeGuard<'_>, buf: &[u8], off: u64) -> Result<usize> {
        if inode.kind != FileKind::Regular {
            return err_ctx(ErrorKind::InvalidArgument, "write on a non-regular file");
        }
        let ino = inode.inode.ino;
        let mut records = self.records.lock().unwrap();
        let rec = match records.get_mut(&ino) {
            Some(r) => r,
            None => return err_ctx(ErrorKind::Stale, "write: content missing from memfs store"),
        };
        let n = match &mut rec.content {
            Content::Embedded(data) => {
                let start = off as usize;
                let end = start + buf.len();
                if end > EMBEDDED_DATA_LEN {
                    return err_ctx(ErrorKind::FileTooLarge, "write: embedded file write exceeds the inline window");
                }
                data[start..end].copy_from_slice(buf);
                buf.len()
            }
            Content::Paged(cache) => cache.write(off, buf),
            _ => return err_ctx(ErrorKind::Stale, "write: content missing from memfs store"),
        };
        drop(records);
        dirty_inode(inode);
        Ok(n)
    }

    fn sync(&self, inode: &InodeGuard<'_>) -> Result<()> {
        let mut records = self.records.lock().unwrap();
        if let Some(rec) = records.get_mut(&inode.inode.ino) {
            rec.kind = inode.kind;
            rec.nlink = inode.nlink;
            rec.size = inode.size;
            rec.nblocks = inode.nblocks;
        }
        Ok(())
    }

    fn free(&self, ino: u64) -> Result<()> {
        self.records.lock().unwrap().remove(&ino);
        Ok(())
    }

    fn load(&self, ino: u64, state: &mut InodeState) -> Result<()> {
        let records = self.records.lock().unwrap();
        match records.get(&ino) {
            Some(rec) => {
                state.kind = rec.kind;
                state.nlink = rec.nlink;
                state.size = rec.size;
                state.nblocks = rec.nblocks;
                Ok(())
            }
            None => err_ctx(ErrorKind::Stale, "memfs load on an inode with no backing record"),
        }
    }

    fn root_ino(&self) -> u64 {
        ROOTINO
    }
}

/// Decrements the link count of whatever rename just displaced (if
/// anything), freeing it through the normal inode lifecycle exactly as
/// `unlink` does.
fn finish_replace(fs: &MemFs, replaced: Option<(u64, FileKind)>) -> Result<()> {
    let Some((replaced_ino, replaced_kind)) = replaced else {
        return Ok(());
    };
    if replaced_kind == FileKind::Directory {
        return err_ctx(ErrorKind::NotSupported, "rename: overwriting a directory target is not supported");
    }
    let victim = fs.inode_handle(replaced_ino, replaced_kind)?;
    let mut guard = victim.lock()?;
    guard.nlink -= 1;
    dirty_inode(&mut guard);
    Ok(())
}

/// Grows `rec`'s content from `old_size` to `new_size`, returning the new
/// `n_blocks` (spec.md section 4.4). Every step here is infallible in
/// this hosted simulation — there is no allocator to exhaust short of
/// process-wide OOM — so the contract's "roll back to `old_size` on
/// failure" clause has no reachable caller today; `shrink` below is what
/// it would invoke if a fallible backing store were substituted.
fn grow(rec: &mut MemRecord, old_size: u64, new_size: u64) -> u64 {
    if let Content::Embedded(buf) = &mut rec.content {
        if new_size as usize <= EMBEDDED_DATA_LEN {
            buf[old_size as usize..new_size as usize].fill(0);
            return 0;
        }
        let mut cache = PageCache::new();
        cache.seed_page_zero(&buf[..old_size as usize]);
        rec.content = Content::Paged(cache);
    }
    let cache = match &mut rec.content {
        Content::Paged(cache) => cache,
        _ => unreachable!("grow called on content that is not a regular file"),
    };
    // The page holding `old_size`'s tail byte may already be resident
    // (kept around by an earlier shrink) with stale bytes past the old
    // size; zero exactly the span growth now makes visible within it.
    if old_size > 0 && old_size % PAGESIZE as u64 != 0 {
        let old_page = old_size / PAGESIZE as u64;
        let from = (old_size % PAGESIZE as u64) as usize;
        let same_page_end = (old_page + 1) * PAGESIZE as u64;
        let to = if new_size < same_page_end {
            (new_size % PAGESIZE as u64) as usize
        } else {
            PAGESIZE
        };
        cache.zero_range(old_page, from, to);
    }
    (new_size + PAGESIZE as u64 - 1) / PAGESIZE as u64
}

/// Discards every page at or beyond the new size's page count.
fn shrink(rec: &mut MemRecord, new_size: u64) -> u64 {
    match &mut rec.content {
        Content::Paged(cache) => {
            let keep_pages = (new_size + PAGESIZE as u64 - 1) / PAGESIZE as u64;
            cache.discard_from(keep_pages);
            keep_pages
        }
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fcntl::OpenFlags;
    use crate::vfs::process::{ProcessContext, VfsShared};

    fn new_process() -> ProcessContext {
        let sb = MemFs::mount();
        let shared = VfsShared::new(crate::vfs::file::new_ftable());
        ProcessContext::new(shared, &sb).unwrap()
    }

    #[test]
    fn create_write_read_roundtrip_stays_embedded() {
        let proc = new_process();
        let fd = proc.open("/hello.txt", OpenFlags::CREAT | OpenFlags::RDWR).unwrap();
        assert_eq!(proc.write(fd, b"hi").unwrap(), 2);
        proc.lseek(fd, 0, crate::fcntl::SeekWhence::Set).unwrap();
        let mut buf = [0u8; 2];
        assert_eq!(proc.read(fd, &mut buf).unwrap(), 2);
        assert_eq!(&buf, b"hi");
        let st = proc.fstat(fd).unwrap();
        assert_eq!(st.size, 2);
        assert_eq!(st.nblocks, 0);
    }

    #[test]
    fn growing_past_embedded_threshold_migrates_to_page_cache() {
        let proc = new_process();
        let fd = proc.open("/big.bin", OpenFlags::CREAT | OpenFlags::RDWR).unwrap();
        let data = vec![7u8; EMBEDDED_DATA_LEN + 100];
        assert_eq!(proc.write(fd, &data).unwrap(), data.len());
        let st = proc.fstat(fd).unwrap();
        assert_eq!(st.size, data.len() as u64);
        assert!(st.nblocks >= 1);
        proc.lseek(fd, 0, crate::fcntl::SeekWhence::Set).unwrap();
        let mut buf = vec![0u8; data.len()];
        assert_eq!(proc.read(fd, &mut buf).unwrap(), data.len());
        assert_eq!(buf, data);
    }

    #[test]
    fn truncate_then_read_past_old_size_reads_zero_not_old_bytes() {
        let proc = new_process();
        let fd = proc.open("/f", OpenFlags::CREAT | OpenFlags::RDWR).unwrap();
        proc.write(fd, &[0xAAu8; 200]).unwrap();
        proc.truncate(fd, 50).unwrap();
        proc.truncate(fd, 200).unwrap();
        let mut buf = [0u8; 150];
        let n = {
            proc.lseek(fd, 50, crate::fcntl::SeekWhence::Set).unwrap();
            proc.read(fd, &mut buf).unwrap()
        };
        assert_eq!(n, 150);
        assert!(buf.iter().all(|b| *b == 0));
    }

    #[test]
    fn mkdir_then_rmdir_restores_empty_state() {
        let proc = new_process();
        proc.mkdir("/sub").unwrap();
        assert!(proc.rmdir("/sub").is_ok());
        assert!(matches!(
            proc.open("/sub", OpenFlags::RDONLY),
            Err(e) if e.kind == ErrorKind::NoSuchEntry
        ));
    }

    #[test]
    fn unlink_drops_last_link_and_frees_the_record() {
        let proc = new_process();
        let fd = proc.open("/a", OpenFlags::CREAT | OpenFlags::RDWR).unwrap();
        proc.close(fd).unwrap();
        proc.unlink("/a").unwrap();
        assert!(matches!(
            proc.open("/a", OpenFlags::RDONLY),
            Err(e) if e.kind == ErrorKind::NoSuchEntry
        ));
    }

    #[test]
    fn rename_within_same_directory_preserves_content() {
        let proc = new_process();
        let fd = proc.open("/a", OpenFlags::CREAT | OpenFlags::RDWR).unwrap();
        proc.write(fd, b"payload").unwrap();
        proc.close(fd).unwrap();
        proc.rename("/a", "/b").unwrap();
        let fd2 = proc.open("/b", OpenFlags::RDONLY).unwrap();
        let mut buf = [0u8; 7];
        assert_eq!(proc.read(fd2, &mut buf).unwrap(), 7);
        assert_eq!(&buf, b"payload");
    }

    #[test]
    fn symlink_readlink_roundtrip() {
        let proc = new_process();
        proc.symlink("/a", "/link").unwrap();
        assert_eq!(proc.readlink("/link").unwrap(), "/a");
    }
}
