//! Long-term locks that may legitimately suspend the calling thread for a
//! while (the per-inode lock, the per-file lock). Grounded in the
//! teacher's `lock/sleeplock.rs`, whose `RawSleeplock` hand-rolls a
//! sleep/wakeup queue because the teacher's kernel is `no_std` and has no
//! OS thread scheduler of its own to delegate to. This crate runs on top
//! of real OS threads, so a `std::sync::Mutex` already *is* a sleeping
//! lock: contending on it parks the calling thread instead of spinning,
//! which is exactly the suspension point spec.md section 5 asks for.
use std::ops::{Deref, DerefMut};
use std::sync::{Mutex, MutexGuard};

pub struct Sleeplock<T> {
    name: &'static str,
    inner: Mutex<T>,
}

pub struct SleeplockGuard<'s, T> {
    name: &'static str,
    inner: MutexGuard<'s, T>,
}

impl<T> Sleeplock<T> {
    pub const fn new(name: &'static str, data: T) -> Self {
        Self {
            name,
            inner: Mutex::new(data),
        }
    }

    /// Acquires the lock, suspending the calling thread if it is held
    /// elsewhere.
    pub fn lock(&self) -> SleeplockGuard<'_, T> {
        log::trace!("sleeplock {} acquire", self.name);
        let inner = self
            .inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        SleeplockGuard {
            name: self.name,
            inner,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl<T> Deref for SleeplockGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        &self.inner
    }
}

impl<T> DerefMut for SleeplockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.inner
    }
}

impl<T> Drop for SleeplockGuard<'_, T> {
    fn drop(&mut self) {
        log::trace!("sleeplock {} release", self.name);
    }
}
