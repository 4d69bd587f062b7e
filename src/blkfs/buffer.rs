//! The block buffer cache: pinned, `(dev, blockno)`-keyed blocks read from
//! and written back to a [`BlockDevice`]. Grounded in the teacher's
//! `bio.rs` (`BufEntry`/`Bcache = MruArena<BufEntry, NBUF>`) in shape —
//! arena-indexed, demand-allocated via `find_or_alloc`, one sleeplock per
//! buffer — but adapted to this crate's [`crate::ds::Arena`] rather than
//! the teacher's `Pin`-projected `MruArena`/`ArenaRc`. The teacher also
//! splits a buffer handle into a locked/unlocked pair
//! (`Buf`/`BufUnlocked`) via a `ManuallyDrop` dance so the lock can outlive
//! a single method call without becoming self-referential; this crate
//! instead exposes buffer access only through a closure
//! ([`BufferCache::with`]), which needs no unsafe lifetime surgery because
//! the lock is never held past the call that acquired it.

use std::sync::Arc;

use crate::ds::{Arena, ArenaObject};
use crate::lock::Sleeplock;
use crate::param::BSIZE;

use super::device::BlockDevice;

/// Capacity of the buffer cache's fixed-size slot table. Not part of
/// `param.rs` because, unlike `BSIZE`/`NDIRECT`, it bounds an in-memory
/// cache rather than an on-disk layout or a per-mkfs-image parameter.
const NBUF: usize = 64;

pub struct BufContents {
    pub valid: bool,
    pub bytes: [u8; BSIZE],
}

/// One cached block. `dev`/`blockno` identify the slot's occupant and are
/// read without locking (mirroring the teacher's arena-protected
/// `dev`/`blockno` fields); `bytes` is guarded by `inner` since readers and
/// writers must serialize on its contents.
pub struct BufEntry {
    dev: u64,
    blockno: u32,
    inner: Sleeplock<BufContents>,
}

impl BufEntry {
    pub fn blockno(&self) -> u32 {
        self.blockno
    }
}

impl ArenaObject for BufEntry {
    /// The buffer cache never needs to flush on eviction: every write that
    /// matters already went through [`BufferCache::write_back`] (directly,
    /// for the log region) or through the log's commit (for data blocks),
    /// matching the teacher's `BufEntry::finalize`, which also does
    /// nothing beyond the comment "buffer contents should have been
    /// written."
    fn finalize(&mut self) {}
}

pub type RcBuf = crate::ds::Rc<BufEntry, NBUF>;

/// Per-superblock buffer cache. Not itself `Send`/`Sync`-sensitive beyond
/// what `Arena`/`Sleeplock` already provide, so it is safely shared behind
/// an `Arc` by the owning `BlkfsSuperblock`.
pub struct BufferCache {
    arena: Arc<Arena<BufEntry, NBUF>>,
    device: Arc<dyn BlockDevice>,
}

impl BufferCache {
    pub fn new(device: Arc<dyn BlockDevice>) -> Self {
        Self {
            arena: Arc::new(Arena::new("blkfs bcache")),
            device,
        }
    }

    /// Returns a handle to the cached copy of `blockno`, allocating a
    /// fresh (not-yet-valid) slot if it is not already resident. Mirrors
    /// the teacher's `Bcache::get_buf`.
    pub fn get(&self, dev: u64, blockno: u32) -> RcBuf {
        self.arena
            .find_or_alloc(
                |b| b.dev == dev && b.blockno == blockno,
                || BufEntry {
                    dev,
                    blockno,
                    inner: Sleeplock::new(
                        "buf",
                        BufContents {
                            valid: false,
                            bytes: [0u8; BSIZE],
                        },
                    ),
                },
            )
            .expect("blkfs buffer cache full")
    }

    /// Locks `buf`'s contents, reading them from the device on first touch,
    /// and runs `f` against the bytes. The lock is held only for the
    /// duration of `f`.
    pub fn with<R>(&self, buf: &RcBuf, f: impl FnOnce(&mut [u8; BSIZE]) -> R) -> R {
        let mut guard = buf.inner.lock();
        if !guard.valid {
            self.device.read_block(buf.blockno, &mut guard.bytes);
            guard.valid = true;
        }
        f(&mut guard.bytes)
    }

    /// Persists `buf`'s current contents to the device immediately,
    /// bypassing the log. Used for the log region itself (which has no log
    /// of its own to go through) and by log replay, which writes directly
    /// to each entry's home block.
    pub fn write_back(&self, buf: &RcBuf) {
        let guard = buf.inner.lock();
        self.device.write_block(buf.blockno, &guard.bytes);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blkfs::device::InMemoryBlockDevice;

    #[test]
    fn get_reuses_the_same_slot_for_the_same_block() {
        let cache = BufferCache::new(Arc::new(InMemoryBlockDevice::new(4)));
        let a = cache.get(1, 2);
        let b = cache.get(1, 2);
        assert_eq!(a.index(), b.index());
    }

    #[test]
    fn with_reads_device_contents_on_first_touch() {
        let device = Arc::new(InMemoryBlockDevice::new(4));
        let seed = [5u8; BSIZE];
        device.write_block(1, &seed);
        let cache = BufferCache::new(device);
        let buf = cache.get(1, 1);
        cache.with(&buf, |bytes| assert!(bytes.iter().all(|b| *b == 5)));
    }

    #[test]
    fn write_back_persists_to_device() {
        let device = Arc::new(InMemoryBlockDevice::new(4));
        let cache = BufferCache::new(device.clone());
        let buf = cache.get(1, 0);
        cache.with(&buf, |bytes| bytes[0] = 42);
        cache.write_back(&buf);
        let mut out = [0u8; BSIZE];
        device.read_block(0, &mut out);
        assert_eq!(out[0], 42);
    }
}
