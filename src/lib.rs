//! A hosted virtual file system core with two pluggable backends: an
//! in-memory filesystem (`memfs`) and a block-device-backed filesystem
//! with a write-ahead log (`blkfs`). Grounded in the teacher's top-level
//! crate layout (`kernel-rs`'s `lib.rs`/`kernel.rs`, minus the actual
//! kernel: no process scheduler, no address-space management, no
//! hardware drivers), keeping the same `ds`/`lock`/`fs` split translated
//! to `ds`/`lock`/`vfs` plus the two backend modules (SPEC_FULL.md
//! section 1).

mod ds;
mod lock;

pub mod blkfs;
pub mod error;
pub mod fcntl;
pub mod memfs;
pub mod param;
pub mod stat;
pub mod vfs;

pub use blkfs::{BlockDevice, Blkfs, InMemoryBlockDevice};
pub use error::{Error, ErrorKind, Result};
pub use memfs::MemFs;
pub use vfs::process::{ProcessContext, VfsShared};
pub use vfs::superblock::Superblock;
