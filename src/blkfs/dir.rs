//! Flat-array directory contents: a blkfs directory's data is just a
//! sequence of [`DirentRaw`] records read and written through the same
//! byte-level inode primitives any regular file uses. Grounded in the
//! teacher's `dirlookup`/`dirlink`/`is_dir_empty` (`fs/ufs/inode.rs`),
//! adapted to operate on a [`DinodeRaw`] the caller re-reads/re-writes
//! around each call rather than on a long-lived `InodeGuard`.

use zerocopy::AsBytes;

use crate::error::{err_ctx, ErrorKind, Result};
use crate::param::DIRSIZ;

use super::dinode::{read_bytes, write_bytes};
use super::layout::{DirentRaw, DinodeRaw, DIRENT_SIZE};
use super::log::Transaction;
use super::Blkfs;

fn name_matches(raw: &[u8; DIRSIZ], name: &str) -> bool {
    let bytes = name.as_bytes();
    if bytes.len() > DIRSIZ {
        return false;
    }
    &raw[..bytes.len()] == bytes && raw[bytes.len()..].iter().all(|b| *b == 0)
}

fn encode_name(name: &str) -> [u8; DIRSIZ] {
    let mut out = [0u8; DIRSIZ];
    let bytes = name.as_bytes();
    let len = bytes.len().min(DIRSIZ);
    out[..len].copy_from_slice(&bytes[..len]);
    out
}

pub(super) fn decode_name(raw: &[u8; DIRSIZ]) -> String {
    let len = raw.iter().position(|b| *b == 0).unwrap_or(DIRSIZ);
    String::from_utf8_lossy(&raw[..len]).into_owned()
}

fn read_entry(fs: &Blkfs, dir: &DinodeRaw, index: usize) -> Option<DirentRaw> {
    let mut bytes = [0u8; DIRENT_SIZE];
    let n = read_bytes(fs, dir, (index * DIRENT_SIZE) as u64, &mut bytes);
    if n < DIRENT_SIZE {
        return None;
    }
    let mut dirent = DirentRaw { ino: 0, name: [0; DIRSIZ] };
    dirent.as_bytes_mut().copy_from_slice(&bytes);
    Some(dirent)
}

fn entry_count(dir: &DinodeRaw) -> usize {
    dir.size as usize / DIRENT_SIZE
}

/// Linear scan for `name` in `dir`, per the teacher's `dirlookup`.
pub(super) fn dirlookup(fs: &Blkfs, dir: &DinodeRaw, name: &str) -> Option<u64> {
    for i in 0..entry_count(dir) {
        let entry = read_entry(fs, dir, i)?;
        if entry.ino != 0 && name_matches(&entry.name, name) {
            return Some(entry.ino as u64);
        }
    }
    None
}

/// Adds a `(name, target_ino)` entry to `dir`, reusing a freed slot if one
/// exists rather than always appending, matching the teacher's `dirlink`.
pub(super) fn dirlink(
    fs: &Blkfs,
    tx: &Transaction,
    dir_ino: u64,
    dir: &mut DinodeRaw,
    name: &str,
    target_ino: u64,
) -> Result<()> {
    if dirlookup(fs, dir, name).is_some() {
        return err_ctx(ErrorKind::AlreadyExists, "dirlink: name already exists");
    }
    let count = entry_count(dir);
    let mut slot = count;
    for i in 0..count {
        if let Some(entry) = read_entry(fs, dir, i) {
            if entry.ino == 0 {
                slot = i;
                break;
            }
        }
    }
    let dirent = DirentRaw {
        ino: target_ino as u32,
        name: encode_name(name),
    };
    write_bytes(fs, tx, dir_ino, dir, (slot * DIRENT_SIZE) as u64, dirent.as_bytes())?;
    Ok(())
}

/// Zeroes out the entry named `name`, returning the inode number it held.
pub(super) fn dirunlink(fs: &Blkfs, tx: &Transaction, dir_ino: u64, dir: &mut DinodeRaw, name: &str) -> Result<u64> {
    for i in 0..entry_count(dir) {
        if let Some(entry) = read_entry(fs, dir, i) {
            if entry.ino != 0 && name_matches(&entry.name, name) {
                let empty = DirentRaw { ino: 0, name: [0; DIRSIZ] };
                write_bytes(fs, tx, dir_ino, dir, (i * DIRENT_SIZE) as u64, empty.as_bytes())?;
                return Ok(entry.ino as u64);
            }
        }
    }
    err_ctx(ErrorKind::NoSuchEntry, "dirunlink: name not found")
}

/// Returns occupied entries at or after `cookie` (an entry index), up to
/// `limit` of them, each paired with the cookie a following call should
/// resume at. Backs [`super::Blkfs::dir_iter`]'s pagination.
pub(super) fn iter_from(fs: &Blkfs, dir: &DinodeRaw, cookie: u64, limit: usize) -> Vec<(u64, DirentRaw)> {
    let count = entry_count(dir);
    let mut out = Vec::new();
    let mut i = cookie as usize;
    while i < count && out.len() < limit {
        if let Some(entry) = read_entry(fs, dir, i) {
            if entry.ino != 0 {
                out.push(((i + 1) as u64, entry));
            }
        }
        i += 1;
    }
    out
}

/// True unless some entry other than `.`/`..` is occupied, mirroring the
/// teacher's `is_dir_empty`.
pub(super) fn is_dir_empty(fs: &Blkfs, dir: &DinodeRaw) -> bool {
    for i in 0..entry_count(dir) {
        let Some(entry) = read_entry(fs, dir, i) else {
            continue;
        };
        if entry.ino == 0 {
            continue;
        }
        let name = decode_name(&entry.name);
        if name != "." && name != ".." {
            return false;
        }
    }
    true
}
