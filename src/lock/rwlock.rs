//! Reader/writer lock for the per-superblock `sb_rw`, which must allow
//! many concurrent readers to resolve paths and read inodes while an
//! exclusive writer performs operations such as mount/unmount bookkeeping
//! or a layout-changing recovery pass. Grounded in the teacher's
//! `lock/rwlock.rs`; the hosted version wraps `std::sync::RwLock` instead
//! of reimplementing a reader count and wait queue by hand.
use std::ops::{Deref, DerefMut};
use std::sync::{self, RwLock as StdRwLock};

pub struct RwLock<T> {
    name: &'static str,
    inner: StdRwLock<T>,
}

pub struct RwLockReadGuard<'s, T> {
    name: &'static str,
    inner: sync::RwLockReadGuard<'s, T>,
}

pub struct RwLockWriteGuard<'s, T> {
    name: &'static str,
    inner: sync::RwLockWriteGuard<'s, T>,
}

impl<T> RwLock<T> {
    pub const fn new(name: &'static str, data: T) -> Self {
        Self {
            name,
            inner: StdRwLock::new(data),
        }
    }

    pub fn read(&self) -> RwLockReadGuard<'_, T> {
        log::trace!("rwlock {} read-acquire", self.name);
        let inner = self
            .inner
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        RwLockReadGuard {
            name: self.name,
            inner,
        }
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, T> {
        log::trace!("rwlock {} write-acquire", self.name);
        let inner = self
            .inner
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        RwLockWriteGuard {
            name: self.name,
            inner,
        }
    }
}

impl<T> Deref for RwLockReadGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        &self.inner
    }
}

impl<T> Drop for RwLockReadGuard<'_, T> {
    fn drop(&mut self) {
        log::trace!("rwlock {} read-release", self.name);
    }
}

impl<T> Deref for RwLockWriteGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        &self.inner
    }
}

impl<T> DerefMut for RwLockWriteGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.inner
    }
}

impl<T> Drop for RwLockWriteGuard<'_, T> {
    fn drop(&mut self) {
        log::trace!("rwlock {} write-release", self.name);
    }
}
