//! `stat`/`getdents` shared types. Grounded in the teacher's `stat.rs`,
//! extended with the file-type/mode vocabulary spec.md section 3 and the
//! `getdents` record layout from spec.md section 6 require.

/// File type, independent of any one filesystem's on-disk encoding.
/// Mirrors `InodeType` in the teacher's `fs/inode.rs`, generalized with
/// the additional kinds spec.md's data model names (fifo, socket,
/// char/block device).
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum FileKind {
    Regular,
    Directory,
    Symlink,
    Fifo,
    Socket,
    CharDevice { major: u32, minor: u32 },
    BlockDevice { major: u32, minor: u32 },
}

impl FileKind {
    /// The `getdents` record type tag (spec.md section 6).
    pub fn dirent_type(self) -> u8 {
        match self {
            FileKind::Fifo => 1,
            FileKind::CharDevice { .. } => 2,
            FileKind::Directory => 4,
            FileKind::BlockDevice { .. } => 6,
            FileKind::Regular => 8,
            FileKind::Symlink => 10,
            FileKind::Socket => 12,
        }
    }
}

/// Metadata returned by `fstat`.
#[derive(Copy, Clone, Debug)]
pub struct Stat {
    pub dev: u64,
    pub ino: u64,
    pub kind: FileKind,
    pub nlink: i16,
    pub size: u64,
    pub nblocks: u64,
}

/// One `getdents` record, in-memory form (the wire encoding is produced by
/// `DirEntry::encode`, see vfs::file).
#[derive(Clone, Debug)]
pub struct DirEntry {
    pub ino: u64,
    /// Offset of the *next* record; used by callers to resume iteration.
    pub cookie: u64,
    pub kind: FileKind,
    pub name: String,
}

impl DirEntry {
    /// Encode in the 8-byte-aligned, NUL-terminated-name wire format from
    /// spec.md section 6: `u64 ino, u64 cookie, u16 reclen, u8 type, name\0`.
    pub fn encode(&self) -> Vec<u8> {
        let name = self.name.as_bytes();
        let unaligned = 8 + 8 + 2 + 1 + name.len() + 1;
        let reclen = (unaligned + 7) & !7;
        let mut buf = Vec::with_capacity(reclen);
        buf.extend_from_slice(&self.ino.to_le_bytes());
        buf.extend_from_slice(&self.cookie.to_le_bytes());
        buf.extend_from_slice(&(reclen as u16).to_le_bytes());
        buf.push(self.kind.dirent_type());
        buf.extend_from_slice(name);
        buf.resize(reclen, 0);
        buf
    }
}
