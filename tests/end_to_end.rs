//! End-to-end scenarios exercising several modules together through the
//! public `ProcessContext` API, one file per backend setup. These are the
//! literal scenarios from spec.md's testable-properties section that are
//! observable from outside the crate; the scenarios that depend on
//! internal block-allocator/log state (find_free_near windowing, log
//! crash recovery) stay as `#[cfg(test)]` modules colocated with
//! `blkfs::freemap`/`blkfs::log`, since they need access private to those
//! modules.
use rvfs::fcntl::{OpenFlags, SeekWhence};
use rvfs::param::BSIZE;
use rvfs::vfs::file::new_ftable;
use rvfs::{Blkfs, InMemoryBlockDevice, MemFs, ProcessContext, VfsShared};

fn memfs_process() -> ProcessContext {
    let sb = MemFs::mount();
    let shared = VfsShared::new(new_ftable());
    ProcessContext::new(shared, &sb).unwrap()
}

fn blkfs_process(nblocks: u32, ninodes: u32) -> ProcessContext {
    let device = std::sync::Arc::new(InMemoryBlockDevice::new(nblocks));
    let sb = Blkfs::format(device, ninodes);
    let shared = VfsShared::new(new_ftable());
    ProcessContext::new(shared, &sb).unwrap()
}

#[test]
fn nested_mkdir_then_create_write_reopen_read() {
    let proc = memfs_process();
    proc.mkdir("/a").unwrap();
    proc.mkdir("/a/b").unwrap();
    let fd = proc.open("/a/b/c", OpenFlags::CREAT | OpenFlags::WRONLY).unwrap();
    assert_eq!(proc.write(fd, b"hello").unwrap(), 5);
    proc.close(fd).unwrap();

    let fd = proc.open("/a/b/c", OpenFlags::RDONLY).unwrap();
    let mut buf = [0u8; 5];
    assert_eq!(proc.read(fd, &mut buf).unwrap(), 5);
    assert_eq!(&buf, b"hello");
}

#[test]
fn pipe_write_then_read_delivers_the_byte() {
    let proc = memfs_process();
    let (r, w) = proc.pipe().unwrap();
    assert_eq!(proc.write(w, b"x").unwrap(), 1);
    let mut buf = [0u8; 1];
    assert_eq!(proc.read(r, &mut buf).unwrap(), 1);
    assert_eq!(buf[0], b'x');
}

#[test]
fn truncate_down_preserves_prefix_and_reads_eof_past_new_size() {
    let proc = memfs_process();
    let fd = proc.open("/big", OpenFlags::CREAT | OpenFlags::RDWR).unwrap();
    let one_mib = 1 << 20;
    let half_mib = one_mib / 2;
    let data = vec![0xABu8; one_mib];
    assert_eq!(proc.write(fd, &data).unwrap(), data.len());

    proc.truncate(fd, half_mib as u64).unwrap();

    proc.lseek(fd, (half_mib - 1) as u64, SeekWhence::Set).unwrap();
    let mut last = [0u8; 1];
    assert_eq!(proc.read(fd, &mut last).unwrap(), 1);
    assert_eq!(last[0], 0xAB);

    proc.lseek(fd, half_mib as u64, SeekWhence::Set).unwrap();
    let mut eof = [0u8; 1];
    assert_eq!(proc.read(fd, &mut eof).unwrap(), 0);
}

#[test]
fn unlinking_a_multi_block_blkfs_file_reclaims_its_inode_and_blocks() {
    // Only 4 inode slots and a data region barely bigger than one file:
    // reusing neither the inode nor the blocks `/f` held would make this
    // loop fail on its second or third pass, regardless of which runs out
    // first.
    let proc = blkfs_process(4096, 4);
    for i in 0..20 {
        let fd = proc.open("/f", OpenFlags::CREAT | OpenFlags::RDWR).unwrap();
        let data = vec![(i % 256) as u8; BSIZE * 5];
        assert_eq!(proc.write(fd, &data).unwrap(), data.len());
        proc.lseek(fd, 0, SeekWhence::Set).unwrap();
        let mut buf = vec![0u8; data.len()];
        assert_eq!(proc.read(fd, &mut buf).unwrap(), data.len());
        assert_eq!(buf, data);
        proc.close(fd).unwrap();
        proc.unlink("/f").unwrap();
    }
}
