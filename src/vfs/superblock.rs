//! Per-mount state. Grounded in the teacher's `fs/superblock.rs`/`fs/
//! mod.rs` `Superblock` (disk layout fields) generalized to the
//! multi-filesystem case: this crate mounts any number of memfs/blkfs
//! instances side by side, so `Superblock` holds a vtable handle instead
//! of being specific to one on-disk format.
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::lock::RwLock;
use crate::vfs::inode::{FileSystemOps, Itable, RcInode};

static NEXT_DEV: AtomicU64 = AtomicU64::new(1);

/// Allocates a fresh device identifier for a newly mounted superblock.
/// Grounded in the teacher's `ROOTDEV`/per-disk `dev` numbering, made
/// dynamic since this crate mounts filesystems at runtime instead of
/// fixing one boot disk.
pub fn alloc_dev() -> u64 {
    NEXT_DEV.fetch_add(1, Ordering::Relaxed)
}

pub struct SuperblockMeta {
    pub dirty: bool,
}

/// Mount-wide state for one mounted filesystem instance. The per-sb
/// `sb_rw` (tier 1 of the global lock order, spec.md section 5) guards
/// `meta`; per-inode state is guarded independently by each inode's own
/// sleeplock.
pub struct Superblock {
    pub dev: u64,
    pub ops: Arc<dyn FileSystemOps>,
    pub itable: Arc<Itable>,
    pub root_ino: u64,
    pub rw: RwLock<SuperblockMeta>,
}

impl Superblock {
    pub fn new(dev: u64, ops: Arc<dyn FileSystemOps>, itable: Arc<Itable>) -> Arc<Self> {
        let root_ino = ops.root_ino();
        Arc::new(Self {
            dev,
            ops,
            itable,
            root_ino,
            rw: RwLock::new("sb_rw", SuperblockMeta { dirty: false }),
        })
    }

    pub fn mark_dirty(&self) {
        self.rw.write().dirty = true;
    }

    /// Finds the cached inode for `ino` if present, else allocates a
    /// fresh slot and marks it invalid so the first `lock()` on it reads
    /// the inode back from its backing store. Grounded in the teacher's
    /// `Itable::get` (`fs/inode.rs`).
    pub fn iget(self: &Arc<Self>, ino: u64) -> Option<RcInode> {
        let dev = self.dev;
        let ops = self.ops.clone();
        self.itable.find_or_alloc(
            |inode| inode.dev == dev && inode.ino == ino,
            move || crate::vfs::inode::Inode::new(dev, ino, ops, crate::stat::FileKind::Regular),
        )
    }
}
