//! Lock primitives and the channel abstraction used throughout the VFS.
//!
//! Grounded in the teacher's `lock/` module (`Spinlock`, `Sleeplock`,
//! `Sleepablelock`): a `Spinlock<T>` for the two leaf locks in the global
//! ordering (log, free-block cache), a `Sleeplock<T>` for per-inode and
//! per-file locks that may legitimately block for a long time, an
//! `RwLock<T>` for the per-superblock `sb_rw`, and a `Channel` standing in
//! for the teacher's `sleep_on_chan`/`wakeup_on_chan` pair.

mod channel;
mod rwlock;
mod sleepablelock;
mod sleeplock;
mod spinlock;

pub use channel::Channel;
pub use rwlock::{RwLock, RwLockReadGuard, RwLockWriteGuard};
pub use sleepablelock::{Sleepablelock, SleepablelockGuard};
pub use sleeplock::{Sleeplock, SleeplockGuard};
pub use spinlock::{Spinlock, SpinlockGuard};
