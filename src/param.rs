//! Compile-time constants shared by every layer. These stay `pub const`
//! because they fix on-disk layout and fixed-capacity table sizes, exactly
//! as in the teacher kernel's `param.rs`; the ambient per-filesystem-image
//! sizing runs through `blkfs::BlkfsLayout` / `format` instead of a
//! preprocessed `mkfs` image (see SPEC_FULL.md section 3a).

/// Maximum number of active in-memory inodes per filesystem instance.
pub const NINODE: usize = 50;

/// Maximum number of live file objects in the global open-file table.
pub const NFILE: usize = 256;

/// Maximum open files per process context.
pub const NOFILE: usize = 64;

/// Disk block size in bytes.
pub const BSIZE: usize = 1024;

/// Max number of blocks any single blkfs operation writes inside one
/// transaction.
pub const MAXOPBLOCKS: usize = 10;

/// Max data blocks the on-disk write-ahead log can hold.
pub const LOGSIZE: usize = MAXOPBLOCKS * 3;

/// Maximum path length, in bytes.
pub const MAXPATH: usize = 256;

/// Maximum length of one path component.
pub const DIRSIZ: usize = 14;

/// Direct block pointers per blkfs inode.
pub const NDIRECT: usize = 12;

/// u32 block pointers that fit in one indirect block.
pub const NINDIRECT: usize = BSIZE / core::mem::size_of::<u32>();

/// Largest file blkfs can represent, in blocks.
pub const MAXFILE: usize = NDIRECT + NINDIRECT;

/// Bitmap bits per block (1 bit per data block).
pub const BPB: u32 = (BSIZE * 8) as u32;

/// The device-wide root inode number.
pub const ROOTINO: u64 = 1;

/// memfs: size of the inline embedded-data window inside an inode, in
/// bytes. Files at or below this size never touch the page cache.
pub const EMBEDDED_DATA_LEN: usize = 64;

/// memfs: page size used by the per-inode page cache.
pub const PAGESIZE: usize = 4096;

/// memfs: largest file size representable (bounds page-index arithmetic).
pub const MAX_FILE_SIZE: usize = 16 * 1024 * 1024;

/// Free-block cache: branching factor between adjacent bitmap levels.
pub const BITS_PER_LEVEL: usize = 64;

/// Free-block cache: width of the forward/backward locality search window
/// used by `find_free_near`.
pub const WINDOW: usize = 64;

/// Reserved `ref_count` sentinel: an inode at or above this value is being
/// invalidated and all further `idup` calls on it fail with `Stale`.
pub const REFCOUNT_INVALIDATING: u32 = 0x7FFF_0000;

/// Path resolution: maximum number of symlinks followed before `namei`
/// gives up, preventing a symlink cycle from looping forever.
pub const MAX_SYMLINK_HOPS: usize = 8;
