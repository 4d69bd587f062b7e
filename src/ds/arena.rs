//! A fixed-capacity, reference-counted slot table: the shape underlying
//! both the in-memory inode table and the open-file table. Grounded in
//! the teacher's `arena.rs` (`Arena`/`ArenaObject`/`ArrayArena`/`RcCell`/
//! `ArrayPtr`): a bookkeeping table (occupied? refcount?) protected by a
//! lock, paired with per-slot storage that a live handle may read without
//! re-acquiring that lock, trusting the refcount the same way the
//! teacher's `RcCell` trusts its atomic counter. The one deliberate
//! divergence recorded in SPEC_FULL.md section 9 is what a handle
//! *addresses*: the teacher points `ArrayPtr` at a `Pin`-projected array
//! element (needing `Pin`/`PhantomPinned` to justify the address never
//! moving); this version addresses slots by plain `usize` index into a
//! boxed slice that is allocated once at construction and never resized,
//! so the address-stability argument is a `Box`, not a pinning contract.
use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::ops::Deref;
use std::sync::Arc;

use crate::lock::Sleeplock;

/// Runs when the last handle to a slot's data is dropped. Implementors
/// flush or free whatever the slot represents (e.g. an inode whose link
/// count has dropped to zero gives its blocks back to the allocator).
pub trait ArenaObject {
    fn finalize(&mut self);
}

#[derive(Clone, Copy)]
struct SlotMeta {
    refcnt: usize,
    present: bool,
}

/// The generation counter is not exposed to callers; it exists only so a
/// stale index (there are none reachable safely today, but the field
/// earns its keep if the arena ever needs debug assertions) cannot be
/// confused for a fresh allocation at the same index.
struct Inner<T, const CAPACITY: usize> {
    meta: Vec<SlotMeta>,
    data: Box<[UnsafeCell<MaybeUninit<T>>]>,
}

// SAFETY: access to `data[i]` is only ever handed out as `&T` while a
// live `Rc` guarantees `meta[i].refcnt > 0`, and mutation of a slot's
// presence (write on alloc, drop on last release) happens only while
// `table` (the `Sleeplock<Inner<..>>`) is held, serializing against
// concurrent allocation/finalization of that same slot. `T` itself is
// `Send`, matching the bound below, so handing out `&T` across threads
// is sound exactly when `T: Sync` would be for any other shared state.
unsafe impl<T: Send, const CAPACITY: usize> Send for Inner<T, CAPACITY> {}
unsafe impl<T: Send, const CAPACITY: usize> Sync for Inner<T, CAPACITY> {}

/// A table of at most `CAPACITY` live `T`s, each reachable through any
/// number of reference-counted [`Rc`] handles.
pub struct Arena<T, const CAPACITY: usize> {
    name: &'static str,
    table: Sleeplock<Inner<T, CAPACITY>>,
}

impl<T, const CAPACITY: usize> Arena<T, CAPACITY> {
    pub fn new(name: &'static str) -> Self {
        let meta = vec![
            SlotMeta {
                refcnt: 0,
                present: false,
            };
            CAPACITY
        ];
        let data = (0..CAPACITY)
            .map(|_| UnsafeCell::new(MaybeUninit::uninit()))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self {
            name,
            table: Sleeplock::new(name, Inner { meta, data }),
        }
    }

    /// # Safety
    /// Caller must hold a live `Rc` (or the table lock with `present`
    /// confirmed) for `index`.
    unsafe fn slot_ref(&self, table: &Inner<T, CAPACITY>, index: usize) -> &T {
        (*table.data[index].get()).assume_init_ref()
    }
}

impl<T: ArenaObject, const CAPACITY: usize> Arena<T, CAPACITY> {
    /// Finds a slot whose occupant satisfies `matches` and bumps its
    /// refcount, or, if none does, allocates a free slot via `init` and
    /// returns a handle with refcount 1. Returns `None` if the table is
    /// full and no match was found.
    pub fn find_or_alloc<C, N>(self: &Arc<Self>, matches: C, init: N) -> Option<Rc<T, CAPACITY>>
    where
        C: Fn(&T) -> bool,
        N: FnOnce() -> T,
    {
        let mut guard = self.table.lock();
        let mut empty = None;
        let mut found = None;
        for idx in 0..CAPACITY {
            if guard.meta[idx].present {
                // SAFETY: `present` is only set while the slot holds an
                // initialized `T`, and we hold the table lock so no
                // concurrent finalize can be tearing it down right now.
                let occupant = unsafe { self.slot_ref(&guard, idx) };
                if matches(occupant) {
                    found = Some(idx);
                    break;
                }
            } else if empty.is_none() {
                empty = Some(idx);
            }
        }
        if let Some(idx) = found {
            guard.meta[idx].refcnt += 1;
            log::trace!("arena {} find_or_alloc: reused slot {idx}", self.name);
            return Some(Rc {
                arena: self.clone(),
                index: idx,
            });
        }
        let idx = empty?;
        let value = init();
        // SAFETY: slot `idx` is not `present`, so no other handle can be
        // reading it; we are about to mark it `present` under the same
        // table lock that serializes this write against `slot_ref`.
        unsafe {
            (*guard.data[idx].get()).write(value);
        }
        guard.meta[idx] = SlotMeta {
            refcnt: 1,
            present: true,
        };
        log::trace!("arena {} find_or_alloc: allocated slot {idx}", self.name);
        Some(Rc {
            arena: self.clone(),
            index: idx,
        })
    }

    /// Unconditionally allocates a fresh, otherwise-unshared slot.
    pub fn alloc<F: FnOnce() -> T>(self: &Arc<Self>, init: F) -> Option<Rc<T, CAPACITY>> {
        self.find_or_alloc(|_| false, init)
    }

    /// True if no slot currently has a live handle. Used by `umount` to
    /// refuse detaching a superblock some inode is still pinning.
    pub fn is_idle(&self) -> bool {
        let guard = self.table.lock();
        guard.meta.iter().all(|m| !m.present)
    }

    fn dup(self: &Arc<Self>, index: usize) -> Rc<T, CAPACITY> {
        let mut guard = self.table.lock();
        guard.meta[index].refcnt += 1;
        Rc {
            arena: self.clone(),
            index,
        }
    }

    fn release(&self, index: usize) {
        let mut guard = self.table.lock();
        guard.meta[index].refcnt -= 1;
        if guard.meta[index].refcnt > 0 {
            return;
        }
        guard.meta[index].present = false;
        // SAFETY: refcnt just dropped to zero under the table lock, and
        // `present` is now false, so this is the only code that will ever
        // read or drop this slot's bytes.
        let mut value = unsafe { std::ptr::read(guard.data[index].get()).assume_init() };
        drop(guard);
        value.finalize();
    }

    /// # Safety
    /// Only called through a live [`Rc`], which guarantees `refcnt > 0`
    /// for `index` for as long as the `Rc` exists.
    unsafe fn get(&self, index: usize) -> &T {
        let guard = self.table.lock();
        let ptr = guard.data[index].get();
        drop(guard);
        (*ptr).assume_init_ref()
    }
}

/// A reference-counted handle into an [`Arena`]. Cloning bumps the slot's
/// refcount; dropping the last clone finalizes and frees the slot.
/// Derefs directly to `&T`: every field this crate stores behind a
/// `Rc<T, N>` (`Inode`, `File`) already carries its own interior
/// synchronization (a `Sleeplock`, atomics, or a `Mutex`), exactly as the
/// teacher's `ArrayPtr<T>` also only implements `Deref`, never
/// `DerefMut`.
pub struct Rc<T: ArenaObject, const CAPACITY: usize> {
    arena: Arc<Arena<T, CAPACITY>>,
    index: usize,
}

impl<T: ArenaObject, const CAPACITY: usize> Rc<T, CAPACITY> {
    pub fn index(&self) -> usize {
        self.index
    }
}

impl<T: ArenaObject, const CAPACITY: usize> Deref for Rc<T, CAPACITY> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: `self` is a live handle, so `self.index`'s refcount is
        // at least 1 for as long as `self` exists.
        unsafe { self.arena.get(self.index) }
    }
}

impl<T: ArenaObject, const CAPACITY: usize> Clone for Rc<T, CAPACITY> {
    fn clone(&self) -> Self {
        self.arena.dup(self.index)
    }
}

impl<T: ArenaObject, const CAPACITY: usize> Drop for Rc<T, CAPACITY> {
    fn drop(&mut self) {
        self.arena.release(self.index);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Counter {
        value: i32,
        freed: Arc<std::sync::atomic::AtomicUsize>,
    }

    impl ArenaObject for Counter {
        fn finalize(&mut self) {
            self.freed.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        }
    }

    #[test]
    fn alloc_and_find_or_alloc_reuse_matching_slot() {
        let arena: Arc<Arena<Counter, 4>> = Arc::new(Arena::new("test"));
        let freed = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let a = arena
            .find_or_alloc(
                |c| c.value == 1,
                || Counter {
                    value: 1,
                    freed: freed.clone(),
                },
            )
            .unwrap();
        let b = arena
            .find_or_alloc(
                |c| c.value == 1,
                || Counter {
                    value: 1,
                    freed: freed.clone(),
                },
            )
            .unwrap();
        assert_eq!(a.index(), b.index());
    }

    #[test]
    fn last_drop_runs_finalize_exactly_once() {
        let arena: Arc<Arena<Counter, 4>> = Arc::new(Arena::new("test"));
        let freed = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let a = arena
            .alloc(|| Counter {
                value: 7,
                freed: freed.clone(),
            })
            .unwrap();
        let b = a.clone();
        drop(a);
        assert_eq!(freed.load(std::sync::atomic::Ordering::SeqCst), 0);
        drop(b);
        assert_eq!(freed.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[test]
    fn full_table_returns_none() {
        let arena: Arc<Arena<Counter, 1>> = Arc::new(Arena::new("test"));
        let freed = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let _a = arena
            .alloc(|| Counter {
                value: 1,
                freed: freed.clone(),
            })
            .unwrap();
        assert!(arena
            .alloc(|| Counter {
                value: 2,
                freed: freed.clone(),
            })
            .is_none());
    }
}
