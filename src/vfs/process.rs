//! The minimal process model stand-in and the `Vfs` facade methods it
//! exposes. Grounded in the teacher's `Proc`/`KernelCtx` split
//! (`proc.rs`): `ProcessContext` owns exactly the per-process state
//! spec.md section 1 says is in scope (root/cwd inode references, the fd
//! table), and nothing else (no scheduling, no signals, no address
//! space) — the rest lives in [`VfsShared`], the process-global state
//! spec.md section 9 asks every subsystem to keep behind its own lock.
use std::sync::{Arc, Mutex};

use crate::error::{err, err_ctx, ErrorKind, Result};
use crate::fcntl::{OpenFlags, SeekWhence};
use crate::param::NOFILE;
use crate::stat::{DirEntry, FileKind, Stat};
use crate::vfs::devnode::DeviceRegistry;
use crate::vfs::file::{self, RcFile};
use crate::vfs::inode::{self, RcInode};
use crate::vfs::mount::MountTable;
use crate::vfs::path;
use crate::vfs::socket::{LoopbackSocketHub, Socket};
use crate::vfs::superblock::Superblock;

/// Process-global state shared by every `ProcessContext`: the mount
/// graph, the device registry, the socket hub, and the open-file table.
/// Grounded in the teacher's `Kernel` struct, which bundles exactly this
/// kind of global singleton state behind one owning value constructed
/// once at boot.
pub struct VfsShared {
    pub mounts: MountTable,
    pub devices: DeviceRegistry,
    pub sockets: Arc<LoopbackSocketHub>,
    pub ftable: Arc<file::FTable>,
}

impl VfsShared {
    pub fn new(ftable: Arc<file::FTable>) -> Arc<Self> {
        Arc::new(Self {
            mounts: MountTable::new(),
            devices: DeviceRegistry::new(),
            sockets: Arc::new(LoopbackSocketHub::new()),
            ftable,
        })
    }
}

pub struct ProcessContext {
    shared: Arc<VfsShared>,
    root: Mutex<RcInode>,
    cwd: Mutex<RcInode>,
    fds: Mutex<Vec<Option<RcFile>>>,
}

impl ProcessContext {
    /// Creates a process rooted (and with cwd) at `root_sb`'s root inode.
    pub fn new(shared: Arc<VfsShared>, root_sb: &Arc<Superblock>) -> Result<Self> {
        let root = root_sb
            .iget(root_sb.root_ino)
            .ok_or(())
            .or_else(|_| err_ctx(ErrorKind::OutOfMemory, "inode table full allocating process root"))?;
        let cwd = inode::idup(&root)?;
        Ok(Self {
            shared,
            root: Mutex::new(root),
            cwd: Mutex::new(cwd),
            fds: Mutex::new((0..NOFILE).map(|_| None).collect()),
        })
    }

    fn root_and_cwd(&self) -> (RcInode, RcInode) {
        (
            self.root.lock().unwrap().clone(),
            self.cwd.lock().unwrap().clone(),
        )
    }

    fn install_fd(&self, file: RcFile) -> Result<i32> {
        let mut fds = self.fds.lock().unwrap();
        for (i, slot) in fds.iter_mut().enumerate() {
            if slot.is_none() {
                *slot = Some(file);
                return Ok(i as i32);
            }
        }
        err_ctx(ErrorKind::OutOfMemory, "process file descriptor table full")
    }

    fn fd(&self, fd: i32) -> Result<RcFile> {
        let fds = self.fds.lock().unwrap();
        let slot = fd
            .try_into()
            .ok()
            .and_then(|i: usize| fds.get(i))
            .and_then(|s| s.as_ref());
        match slot {
            Some(file) => Ok(file.clone()),
            None => err(ErrorKind::BadFileDescriptor),
        }
    }

    pub fn open(&self, path: &str, flags: OpenFlags) -> Result<i32> {
        let (root, cwd) = self.root_and_cwd();
        let inode = if flags.contains(OpenFlags::CREAT) {
            let (dir, name) = path::nameiparent(&root, &cwd, &self.shared.mounts, path)?;
            let existing = {
                let dir_guard = dir.lock()?;
                dir.ops.ilookup(&dir_guard, &name)
            };
            match existing {
                Ok(inode) => {
                    if flags.contains(OpenFlags::EXCL) {
                        return err_ctx(
                            ErrorKind::AlreadyExists,
                            "open with CREAT|EXCL on an existing path",
                        );
                    }
                    inode
                }
                Err(_) => {
                    let mut dir_guard = dir.lock()?;
                    dir.ops.create(&mut dir_guard, &name, FileKind::Regular)?
                }
            }
        } else {
            path::namei(&root, &cwd, &self.shared.mounts, path)?
        };

        if flags.contains(OpenFlags::TRUNC) {
            let mut guard = inode.lock()?;
            if guard.kind == FileKind::Regular {
                inode.ops.truncate(&mut guard, 0)?;
            }
        }

        let file = file::fopen(&self.shared.ftable, inode, flags)?;
        self.install_fd(file)
    }

    pub fn close(&self, fd: i32) -> Result<()> {
        let mut fds = self.fds.lock().unwrap();
        let idx: usize = fd.try_into().map_err(|_| ()).or_else(|_| err(ErrorKind::BadFileDescriptor))?;
        let slot = fds.get_mut(idx).ok_or(()).or_else(|_| err(ErrorKind::BadFileDescriptor))?;
        let file = slot.take().ok_or(()).or_else(|_| err(ErrorKind::BadFileDescriptor))?;
        drop(fds);
        file::fput(file);
        Ok(())
    }

    pub fn read(&self, fd: i32, buf: &mut [u8]) -> Result<usize> {
        file::fread(&self.fd(fd)?, buf)
    }

    pub fn write(&self, fd: i32, buf: &[u8]) -> Result<usize> {
        file::fwrite(&self.fd(fd)?, buf)
    }

    pub fn lseek(&self, fd: i32, off: i64, whence: SeekWhence) -> Result<u64> {
        file::flseek(&self.fd(fd)?, off, whence)
    }

    pub fn fstat(&self, fd: i32) -> Result<Stat> {
        file::fstat(&self.fd(fd)?)
    }

    pub fn truncate(&self, fd: i32, length: u64) -> Result<()> {
        file::ftruncate(&self.fd(fd)?, length)
    }

    pub fn getdents(&self, fd: i32, limit: usize) -> Result<Vec<DirEntry>> {
        file::fgetdents(&self.fd(fd)?, limit)
    }

    pub fn dup(&self, fd: i32) -> Result<i32> {
        let file = file::fdup(&self.fd(fd)?);
        self.install_fd(file)
    }

    pub fn pipe(&self) -> Result<(i32, i32)> {
        let (read_end, write_end) = file::fopen_pipe(&self.shared.ftable)?;
        let rfd = self.install_fd(read_end)?;
        match self.install_fd(write_end) {
            Ok(wfd) => Ok((rfd, wfd)),
            Err(e) => {
                let _ = self.close(rfd);
                Err(e)
            }
        }
    }

    /// Binds a socket to `local_port`, optionally connecting it to
    /// `remote_port`, and installs it as a new file descriptor.
    pub fn connect(&self, local_port: u16, remote_port: Option<u16>) -> Result<i32> {
        let mut socket = Socket::bind(self.shared.sockets.clone(), local_port);
        if let Some(remote) = remote_port {
            socket.connect(remote)?;
        }
        let file = file::fopen_socket(&self.shared.ftable, socket)?;
        self.install_fd(file)
    }

    pub fn mkdir(&self, path: &str) -> Result<()> {
        let (root, cwd) = self.root_and_cwd();
        let (dir, name) = path::nameiparent(&root, &cwd, &self.shared.mounts, path)?;
        let mut guard = dir.lock()?;
        dir.ops.mkdir(&mut guard, &name)?;
        Ok(())
    }

    pub fn mknod(&self, path: &str, major: u32, minor: u32, block: bool) -> Result<()> {
        let (root, cwd) = self.root_and_cwd();
        let (dir, name) = path::nameiparent(&root, &cwd, &self.shared.mounts, path)?;
        let mut guard = dir.lock()?;
        dir.ops.mknod(&mut guard, &name, major, minor, block)?;
        Ok(())
    }

    pub fn unlink(&self, path: &str) -> Result<()> {
        let (root, cwd) = self.root_and_cwd();
        let (dir, name) = path::nameiparent(&root, &cwd, &self.shared.mounts, path)?;
        let mut guard = dir.lock()?;
        dir.ops.unlink(&mut guard, &name)
    }

    pub fn rmdir(&self, path: &str) -> Result<()> {
        let (root, cwd) = self.root_and_cwd();
        let (dir, name) = path::nameiparent(&root, &cwd, &self.shared.mounts, path)?;
        let mut guard = dir.lock()?;
        dir.ops.rmdir(&mut guard, &name)
    }

    pub fn link(&self, old: &str, new: &str) -> Result<()> {
        let (root, cwd) = self.root_and_cwd();
        let target = path::namei(&root, &cwd, &self.shared.mounts, old)?;
        let (dir, name) = path::nameiparent(&root, &cwd, &self.shared.mounts, new)?;
        let mut guard = dir.lock()?;
        dir.ops.link(&mut guard, &name, &target)
    }

    pub fn symlink(&self, target: &str, link_path: &str) -> Result<()> {
        let (root, cwd) = self.root_and_cwd();
        let (dir, name) = path::nameiparent(&root, &cwd, &self.shared.mounts, link_path)?;
        let mut guard = dir.lock()?;
        dir.ops.symlink(&mut guard, &name, target)?;
        Ok(())
    }

    pub fn rename(&self, old: &str, new: &str) -> Result<()> {
        let (root, cwd) = self.root_and_cwd();
        let (old_dir, old_name) = path::nameiparent(&root, &cwd, &self.shared.mounts, old)?;
        let (new_dir, new_name) = path::nameiparent(&root, &cwd, &self.shared.mounts, new)?;
        if (old_dir.dev, old_dir.ino) == (new_dir.dev, new_dir.ino) {
            let mut guard = old_dir.lock()?;
            old_dir.ops.rename_within(&mut guard, &old_name, &new_name)
        } else {
            let (mut old_guard, mut new_guard) = inode::lock_two(&old_dir, &new_dir)?;
            old_dir
                .ops
                .rename(&mut old_guard, &old_name, &mut new_guard, &new_name)
        }
    }

    pub fn readlink(&self, path: &str) -> Result<String> {
        let (root, cwd) = self.root_and_cwd();
        let inode = path::namei(&root, &cwd, &self.shared.mounts, path)?;
        let guard = inode.lock()?;
        inode.ops.readlink(&guard)
    }

    pub fn chdir(&self, path: &str) -> Result<()> {
        let (root, cwd) = self.root_and_cwd();
        let inode = path::namei(&root, &cwd, &self.shared.mounts, path)?;
        if inode.lock()?.kind != FileKind::Directory {
            return err_ctx(ErrorKind::NotADirectory, "chdir on non-directory");
        }
        *self.cwd.lock().unwrap() = inode;
        Ok(())
    }

    pub fn chroot(&self, path: &str) -> Result<()> {
        let (root, cwd) = self.root_and_cwd();
        let inode = path::namei(&root, &cwd, &self.shared.mounts, path)?;
        if inode.lock()?.kind != FileKind::Directory {
            return err_ctx(ErrorKind::NotADirectory, "chroot on non-directory");
        }
        *self.root.lock().unwrap() = inode;
        Ok(())
    }

    /// Mounts `sb` on top of the directory at `path`.
    pub fn mount(&self, path: &str, sb: Arc<Superblock>) -> Result<()> {
        let (root, cwd) = self.root_and_cwd();
        let mountpoint = path::namei(&root, &cwd, &self.shared.mounts, path)?;
        if mountpoint.lock()?.kind != FileKind::Directory {
            return err_ctx(ErrorKind::NotADirectory, "mount target is not a directory");
        }
        self.shared.mounts.mount(&mountpoint, sb)
    }

    pub fn umount(&self, path: &str) -> Result<()> {
        let (root, cwd) = self.root_and_cwd();
        let mountpoint = path::namei(&root, &cwd, &self.shared.mounts, path)?;
        self.shared.mounts.umount(&mountpoint)?;
        Ok(())
    }
}
