//! The `sleep_on_chan`/`wakeup_on_chan` primitive from spec.md section 9,
//! realized as a thin wrapper around `std::sync::Condvar`. A `Channel` has
//! no identity of its own beyond being a rendezvous point: any number of
//! distinct `Channel`s may guard state protected by the same mutex (the
//! pipe uses two, one per direction).

use std::sync::{Condvar, MutexGuard};

pub struct Channel {
    condvar: Condvar,
}

impl Channel {
    pub const fn new() -> Self {
        Self {
            condvar: Condvar::new(),
        }
    }

    /// Atomically releases `guard`'s mutex and suspends the calling thread
    /// until `wakeup` is called on this channel, then reacquires the mutex
    /// and returns a fresh guard. Spurious wakeups are possible; callers
    /// must re-check their wait condition in a loop, exactly as with a
    /// condition variable.
    pub fn wait<'a, T>(&self, guard: MutexGuard<'a, T>) -> MutexGuard<'a, T> {
        self.condvar
            .wait(guard)
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Wakes every thread currently suspended on this channel.
    pub fn wakeup(&self) {
        self.condvar.notify_all();
    }
}

impl Default for Channel {
    fn default() -> Self {
        Self::new()
    }
}
