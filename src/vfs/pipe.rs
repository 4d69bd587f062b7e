//! Anonymous pipe: a fixed-capacity ring buffer with two wait-channels,
//! one per direction. Grounded in the teacher's `pipe.rs` (`Pipe`,
//! `PipeInner`, `nread`/`nwrite` wrapping counters, `read_waitchannel`/
//! `write_waitchannel`), with `SpinLock` replaced by this crate's
//! `Sleepablelock` since a reader/writer legitimately blocks for a long
//! time (until the other end produces/consumes data), which is exactly
//! what `Sleepablelock::sleep` models.
use crate::error::{err_ctx, ErrorKind, Result};
use crate::lock::Sleepablelock;

const PIPESIZE: usize = 512;

struct PipeState {
    data: [u8; PIPESIZE],
    nread: u64,
    nwrite: u64,
    readopen: bool,
    writeopen: bool,
}

pub struct Pipe {
    state: Sleepablelock<PipeState>,
}

impl Pipe {
    pub fn new() -> Self {
        Self {
            state: Sleepablelock::new(
                "pipe",
                PipeState {
                    data: [0; PIPESIZE],
                    nread: 0,
                    nwrite: 0,
                    readopen: true,
                    writeopen: true,
                },
            ),
        }
    }

    /// Blocks until at least one byte is available or the write end has
    /// closed, then drains up to `buf.len()` bytes.
    pub fn read(&self, buf: &mut [u8]) -> Result<usize> {
        let mut guard = self.state.lock();
        loop {
            if guard.nread < guard.nwrite {
                let mut n = 0;
                while n < buf.len() && guard.nread < guard.nwrite {
                    buf[n] = guard.data[(guard.nread as usize) % PIPESIZE];
                    guard.nread += 1;
                    n += 1;
                }
                guard.wakeup();
                return Ok(n);
            }
            if !guard.writeopen {
                return Ok(0);
            }
            guard = guard.sleep();
        }
    }

    /// Blocks while the ring buffer is full, writing `buf` in full unless
    /// the read end closes first.
    pub fn write(&self, buf: &[u8]) -> Result<usize> {
        let mut guard = self.state.lock();
        let mut written = 0;
        while written < buf.len() {
            if !guard.readopen {
                return err_ctx(ErrorKind::Fault, "write end: read end of pipe closed");
            }
            if guard.nwrite - guard.nread >= PIPESIZE as u64 {
                guard.wakeup();
                guard = guard.sleep();
                continue;
            }
            while written < buf.len() && guard.nwrite - guard.nread < PIPESIZE as u64 {
                let idx = (guard.nwrite as usize) % PIPESIZE;
                guard.data[idx] = buf[written];
                guard.nwrite += 1;
                written += 1;
            }
            guard.wakeup();
        }
        Ok(written)
    }

    pub fn close_read(&self) -> bool {
        let mut guard = self.state.lock();
        guard.readopen = false;
        guard.wakeup();
        !guard.readopen && !guard.writeopen
    }

    pub fn close_write(&self) -> bool {
        let mut guard = self.state.lock();
        guard.writeopen = false;
        guard.wakeup();
        !guard.readopen && !guard.writeopen
    }
}

impl Default for Pipe {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn write_then_read_single_byte() {
        let pipe = Pipe::new();
        pipe.write(b"x").unwrap();
        let mut buf = [0u8; 1];
        let n = pipe.read(&mut buf).unwrap();
        assert_eq!(n, 1);
        assert_eq!(&buf, b"x");
    }

    #[test]
    fn read_blocks_until_write_then_drains() {
        let pipe = Arc::new(Pipe::new());
        let reader = {
            let pipe = pipe.clone();
            thread::spawn(move || {
                let mut buf = [0u8; 5];
                let n = pipe.read(&mut buf).unwrap();
                (n, buf)
            })
        };
        thread::sleep(std::time::Duration::from_millis(20));
        pipe.write(b"hello").unwrap();
        let (n, buf) = reader.join().unwrap();
        assert_eq!(n, 5);
        assert_eq!(&buf, b"hello");
    }

    #[test]
    fn read_returns_zero_at_eof_after_writer_closes() {
        let pipe = Pipe::new();
        pipe.close_write();
        let mut buf = [0u8; 4];
        assert_eq!(pipe.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn write_wraps_around_ring_buffer() {
        let pipe = Pipe::new();
        let chunk = vec![0xAB_u8; PIPESIZE];
        pipe.write(&chunk).unwrap();
        let mut buf = vec![0u8; PIPESIZE];
        pipe.read(&mut buf).unwrap();
        pipe.write(&[1, 2, 3]).unwrap();
        let mut buf2 = [0u8; 3];
        pipe.read(&mut buf2).unwrap();
        assert_eq!(buf2, [1, 2, 3]);
    }
}
