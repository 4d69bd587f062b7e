//! A mutex paired with its own `Channel`, for state machines that must
//! wait on a predicate rather than simply on mutual exclusion: the blkfs
//! log (a writer waits until the log has room, or until a commit in
//! progress finishes) and the pipe (a reader waits until the buffer is
//! non-empty or the write side closes). Grounded in the teacher's
//! `lock/sleepablelock.rs`, which pairs a `RawSpinlock` with a
//! `sleep_on_chan`-style wait queue; here the pairing is a
//! `std::sync::Mutex` with a `Channel`, since the guard itself may need to
//! suspend the thread holding it.
use std::ops::{Deref, DerefMut};
use std::sync::{Mutex, MutexGuard};

use super::channel::Channel;

pub struct Sleepablelock<T> {
    name: &'static str,
    channel: Channel,
    inner: Mutex<T>,
}

pub struct SleepablelockGuard<'s, T> {
    name: &'static str,
    channel: &'s Channel,
    // `None` only transiently, inside `sleep`, while the guard is handed to
    // `Channel::wait`.
    inner: Option<MutexGuard<'s, T>>,
}

impl<T> Sleepablelock<T> {
    pub const fn new(name: &'static str, data: T) -> Self {
        Self {
            name,
            channel: Channel::new(),
            inner: Mutex::new(data),
        }
    }

    pub fn lock(&self) -> SleepablelockGuard<'_, T> {
        log::trace!("sleepablelock {} acquire", self.name);
        let inner = self
            .inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        SleepablelockGuard {
            name: self.name,
            channel: &self.channel,
            inner: Some(inner),
        }
    }

    /// Wakes every thread currently sleeping on this lock's channel.
    pub fn wakeup(&self) {
        self.channel.wakeup();
    }
}

impl<'s, T> SleepablelockGuard<'s, T> {
    /// Atomically releases the lock and suspends the calling thread until
    /// another thread calls `wakeup` (or `Sleepablelock::wakeup`), then
    /// reacquires the lock. Spurious wakeups are possible: callers must
    /// re-check their condition after `sleep` returns, typically in a
    /// `while !condition { guard = guard.sleep(); }` loop.
    pub fn sleep(mut self) -> Self {
        let guard = self.inner.take().expect("guard taken twice");
        let guard = self.channel.wait(guard);
        self.inner = Some(guard);
        self
    }

    /// Wakes every thread sleeping on this lock's channel without
    /// releasing the lock itself.
    pub fn wakeup(&self) {
        self.channel.wakeup();
    }
}

impl<T> Deref for SleepablelockGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        self.inner.as_ref().expect("guard taken twice")
    }
}

impl<T> DerefMut for SleepablelockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        self.inner.as_mut().expect("guard taken twice")
    }
}

impl<T> Drop for SleepablelockGuard<'_, T> {
    fn drop(&mut self) {
        if self.inner.is_some() {
            log::trace!("sleepablelock {} release", self.name);
        }
    }
}
