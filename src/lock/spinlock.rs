//! Busy-waiting mutual exclusion for the two leaf locks in the global lock
//! order (the blkfs log header and the free-block cache). Grounded in the
//! teacher's `lock/spinlock.rs`, which wraps the same `spin` crate this
//! crate depends on; the hosted version drops the RISC-V
//! `push_off`/`pop_off` interrupt bookkeeping since there is no interrupt
//! controller to mask here.

use core::ops::{Deref, DerefMut};

/// A mutual-exclusion lock that never suspends the calling thread. Critical
/// sections guarded by a `Spinlock` must be O(1) and must never call
/// anything that blocks (per spec.md section 5: "spinlocks never suspend").
pub struct Spinlock<T> {
    name: &'static str,
    inner: spin::Mutex<T>,
}

pub struct SpinlockGuard<'s, T> {
    name: &'static str,
    inner: spin::MutexGuard<'s, T>,
}

impl<T> Spinlock<T> {
    pub const fn new(name: &'static str, data: T) -> Self {
        Self {
            name,
            inner: spin::Mutex::new(data),
        }
    }

    pub fn lock(&self) -> SpinlockGuard<'_, T> {
        log::trace!("spinlock {} acquire", self.name);
        SpinlockGuard {
            name: self.name,
            inner: self.inner.lock(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl<T> Deref for SpinlockGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        &self.inner
    }
}

impl<T> DerefMut for SpinlockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.inner
    }
}

impl<T> Drop for SpinlockGuard<'_, T> {
    fn drop(&mut self) {
        log::trace!("spinlock {} release", self.name);
    }
}
