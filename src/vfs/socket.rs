//! A minimal UDP-like socket reachable via a `File`, realizing
//! SPEC_FULL.md section 4.12. There is no teacher counterpart (the
//! teacher's kernel has no socket layer at all) or real network stack
//! underneath this: a process-global `LoopbackSocketHub`, keyed by port,
//! delivers datagrams between sockets bound in the same process, which is
//! the hosted-crate equivalent of "only the interface is in scope."
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use crate::error::{err, err_ctx, ErrorKind, Result};
use crate::lock::Channel;

const MAX_QUEUED_DATAGRAMS: usize = 64;

struct Mailbox {
    queue: Mutex<VecDeque<(u16, Vec<u8>)>>,
    channel: Channel,
}

impl Mailbox {
    fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            channel: Channel::new(),
        }
    }
}

/// Process-global routing table from local port to the socket's mailbox.
/// Grounded in the general "process-global table behind its own
/// synchronization primitive" shape SPEC_FULL.md section 9 asks for
/// (open-file table, mount table, device registry).
#[derive(Default)]
pub struct LoopbackSocketHub {
    mailboxes: Mutex<HashMap<u16, Arc<Mailbox>>>,
}

impl LoopbackSocketHub {
    pub fn new() -> Self {
        Self {
            mailboxes: Mutex::new(HashMap::new()),
        }
    }

    fn mailbox_for(&self, port: u16) -> Arc<Mailbox> {
        self.mailboxes
            .lock()
            .unwrap()
            .entry(port)
            .or_insert_with(|| Arc::new(Mailbox::new()))
            .clone()
    }

    fn deliver(&self, to_port: u16, from_port: u16, data: Vec<u8>) -> Result<()> {
        let mailbox = self.mailbox_for(to_port);
        let mut queue = mailbox.queue.lock().unwrap();
        if queue.len() >= MAX_QUEUED_DATAGRAMS {
            return err_ctx(ErrorKind::NoSpace, "socket mailbox full");
        }
        queue.push_back((from_port, data));
        mailbox.channel.wakeup();
        Ok(())
    }
}

/// A bound, optionally connected socket endpoint.
pub struct Socket {
    hub: Arc<LoopbackSocketHub>,
    local_port: u16,
    remote_port: Option<u16>,
    mailbox: Arc<Mailbox>,
}

impl Socket {
    pub fn bind(hub: Arc<LoopbackSocketHub>, local_port: u16) -> Self {
        let mailbox = hub.mailbox_for(local_port);
        Self {
            hub,
            local_port,
            remote_port: None,
            mailbox,
        }
    }

    pub fn connect(&mut self, remote_port: u16) -> Result<()> {
        self.remote_port = Some(remote_port);
        Ok(())
    }

    pub fn send(&self, data: &[u8]) -> Result<usize> {
        let remote = match self.remote_port {
            Some(port) => port,
            None => return err_ctx(ErrorKind::InvalidArgument, "send on unconnected socket"),
        };
        self.hub.deliver(remote, self.local_port, data.to_vec())?;
        Ok(data.len())
    }

    /// Blocks until a datagram addressed to this socket's port arrives.
    pub fn recv(&self, buf: &mut [u8]) -> Result<usize> {
        let mut queue = self.mailbox.queue.lock().unwrap();
        loop {
            if let Some((_from, data)) = queue.pop_front() {
                let n = data.len().min(buf.len());
                buf[..n].copy_from_slice(&data[..n]);
                return Ok(n);
            }
            queue = self.mailbox.channel.wait(queue);
        }
    }
}

pub fn err_unsupported<T>() -> Result<T> {
    err(ErrorKind::NotSupported)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connected_sockets_exchange_a_datagram() {
        let hub = Arc::new(LoopbackSocketHub::new());
        let mut a = Socket::bind(hub.clone(), 100);
        let b = Socket::bind(hub.clone(), 200);
        a.connect(200).unwrap();
        assert_eq!(a.send(b"ping").unwrap(), 4);
        let mut buf = [0u8; 4];
        assert_eq!(b.recv(&mut buf).unwrap(), 4);
        assert_eq!(&buf, b"ping");
    }

    #[test]
    fn send_without_connect_is_rejected() {
        let hub = Arc::new(LoopbackSocketHub::new());
        let a = Socket::bind(hub, 300);
        assert!(matches!(a.send(b"x"), Err(e) if e.kind == ErrorKind::InvalidArgument));
    }

    #[test]
    fn mailbox_rejects_datagrams_past_its_queue_limit() {
        let hub = Arc::new(LoopbackSocketHub::new());
        let mut a = Socket::bind(hub.clone(), 400);
        let _b = Socket::bind(hub, 500);
        a.connect(500).unwrap();
        for _ in 0..MAX_QUEUED_DATAGRAMS {
            a.send(b"x").unwrap();
        }
        assert!(matches!(a.send(b"x"), Err(e) if e.kind == ErrorKind::NoSpace));
    }
}
