//! `namei`/`nameiparent`: path resolution across the mount graph.
//! Grounded in the teacher's `fs/path.rs` (`namex`, `namei`,
//! `nameiparent`, the `skipelem` component splitter), generalized with
//! the mount-crossing and symlink-following steps spec.md section 4.2
//! names that the teacher (single fixed root disk, no symlinks) does not
//! need.
use std::collections::VecDeque;

use crate::error::{err_ctx, ErrorKind, Result};
use crate::param::{MAXPATH, MAX_SYMLINK_HOPS};
use crate::stat::FileKind;
use crate::vfs::inode::RcInode;
use crate::vfs::mount::MountTable;

/// Splits `path` on `/`, dropping empty segments (double slashes, leading
/// slash) and `.` segments (which are no-ops). `..` segments are kept:
/// they are ordinary directory-entry lookups except at a mount root.
fn split_components(path: &str) -> Vec<String> {
    path.split('/')
        .filter(|s| !s.is_empty() && *s != ".")
        .map(String::from)
        .collect()
}

/// If `dir` has a filesystem mounted on it, follows the mount chain down
/// to the innermost mounted root (supporting stacked mounts), returning
/// the effective directory to resolve the next component against.
fn descend_through_mounts(mut dir: RcInode, mounts: &MountTable) -> Result<RcInode> {
    loop {
        match mounts.mounted_on(&dir) {
            Some(sb) => {
                dir = sb
                    .iget(sb.root_ino)
                    .ok_or(())
                    .or_else(|_| err_ctx(ErrorKind::OutOfMemory, "inode table full resolving mount root"))?;
            }
            None => return Ok(dir),
        }
    }
}

/// Resolves `path` to an inode with a reference held. `root`/`cwd` are the
/// calling process's current root and working directory (spec.md section
/// 4.2 step 1).
pub fn namei(root: &RcInode, cwd: &RcInode, mounts: &MountTable, path: &str) -> Result<RcInode> {
    if path.len() > MAXPATH {
        return err_ctx(ErrorKind::InvalidArgument, "path exceeds the maximum path length");
    }
    let mut current = if path.starts_with('/') {
        root.clone()
    } else {
        cwd.clone()
    };
    let mut queue: VecDeque<String> = split_components(path).into_iter().collect();
    let mut hops = 0usize;

    while let Some(component) = queue.pop_front() {
        if component == ".." && current.ino == current.ops.root_ino() {
            if let Some(covering) = mounts.covering(current.dev) {
                current = covering;
                continue;
            }
        }

        let dir = descend_through_mounts(current, mounts)?;
        let child = {
            let guard = dir.lock()?;
            dir.ops.ilookup(&guard, &component)?
        };
        current = child;

        if current.lock()?.kind == FileKind::Symlink {
            hops += 1;
            if hops > MAX_SYMLINK_HOPS {
                return err_ctx(ErrorKind::InvalidArgument, "too many levels of symlinks");
            }
            let target = {
                let guard = current.lock()?;
                current.ops.readlink(&guard)?
            };
            let mut spliced: VecDeque<String> = split_components(&target).into_iter().collect();
            current = if target.starts_with('/') { root.clone() } else { dir };
            spliced.extend(queue);
            queue = spliced;
        }
    }
    Ok(current)
}

/// Resolves the directory containing `path`'s final component, returning
/// that directory and the component name, for `create`/`link`/`unlink`.
pub fn nameiparent(
    root: &RcInode,
    cwd: &RcInode,
    mounts: &MountTable,
    path: &str,
) -> Result<(RcInode, String)> {
    if path.len() > MAXPATH {
        return err_ctx(ErrorKind::InvalidArgument, "path exceeds the maximum path length");
    }
    let mut components = split_components(path);
    let last = match components.pop() {
        Some(c) => c,
        None => return err_ctx(ErrorKind::InvalidArgument, "path has no final component"),
    };
    let prefix = if path.starts_with('/') {
        format!("/{}", components.join("/"))
    } else if components.is_empty() {
        ".".to_string()
    } else {
        components.join("/")
    };
    let dir = namei(root, cwd, mounts, &prefix)?;
    Ok((dir, last))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_components_drops_empty_and_dot_segments() {
        assert_eq!(split_components("/a//b/./c"), vec!["a", "b", "c"]);
        assert_eq!(split_components("."), Vec::<String>::new());
        assert_eq!(split_components("a/../b"), vec!["a", "..", "b"]);
    }

    #[test]
    fn overlong_path_is_rejected_before_any_lookup() {
        let path = "/".to_string() + &"a".repeat(MAXPATH);
        let sb = crate::memfs::MemFs::mount();
        let root = sb.iget(sb.root_ino).unwrap();
        let mounts = MountTable::new();
        assert!(matches!(
            namei(&root, &root, &mounts, &path),
            Err(e) if e.kind == ErrorKind::InvalidArgument
        ));
    }
}
