//! The filesystem-independent virtual file system core: inode lifecycle,
//! path resolution, the mount graph, and the open-file table. Grounded in
//! the teacher's `fs/` module tree (`fs/inode.rs`, `fs/mod.rs`,
//! `file.rs`), generalized from one fixed on-disk format to any number of
//! mounted `FileSystemOps` implementations.

pub mod dentry;
pub mod devnode;
pub mod file;
pub mod inode;
pub mod mount;
pub mod path;
pub mod pipe;
pub mod process;
pub mod socket;
pub mod superblock;

pub use dentry::Dentry;
pub use file::{fdup, fgetdents, fopen, fopen_blockdev, fopen_chardev, fopen_pipe, fopen_socket,
    fput, fread, fstat, ftruncate, fwrite, flseek, File, FileBacking, FTable, RcFile};
pub use inode::{dirty_inode, idup, invalidate, lock_two, stat, sync_inode, FileSystemOps, Inode,
    InodeGuard, InodeState, Itable, RcInode};
pub use mount::MountTable;
pub use process::{ProcessContext, VfsShared};
pub use superblock::{alloc_dev, Superblock, SuperblockMeta};
