//! Lightweight lookup result returned by directory operations. Grounded
//! in spec.md section 3: "not a cache entry in this design — it is a
//! handle returned by the FS," so unlike the teacher (which has no
//! separate dentry type and returns an `RcInode` directly from
//! `dirlookup`) this crate introduces `Dentry` purely as a named tuple,
//! carrying the `RcInode` it resolved to so callers never need a second
//! lookup to use the result.
use crate::vfs::inode::RcInode;

pub struct Dentry {
    pub dev: u64,
    pub ino: u64,
    pub name: String,
    pub inode: RcInode,
}
