use std::collections::{HashMap, VecDeque};
use std::io::{ErrorKind, Result as IoResult};
use std::time::Duration;

use socket2::Socket;

use crate::connection::{Descriptor, raw_descriptor};

/// Readiness a pending no-wait call is waiting for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Interest {
    /// Data or an incoming connection can be taken.
    Readable,
    /// The socket can send, or a pending connect has finished.
    Writable,
}

/// A completed no-wait call, identified by the caller's correlation tag.
///
/// Calls that finish synchronously (bind, shutdown, getsockname) are reported
/// with neither readiness flag set.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Completion {
    /// The correlation tag the call was issued with.
    pub tag: i64,
    /// The socket became readable.
    pub readable: bool,
    /// The socket became writable.
    pub writable: bool,
}

/// Completion facility for no-wait calls.
///
/// Pending calls are registered with a one-shot `polling::Poller` interest; a
/// fired interest stays disarmed until the next no-wait call on the same
/// socket re-arms it. Each registered socket gets its own poller key, and the
/// correlation tag it was last armed with is looked up from that key, so any
/// `i64` tag is carried through unchanged.
pub struct CompletionQueue {
    poller: polling::Poller,
    registered: HashMap<Descriptor, usize>,
    tags: HashMap<usize, i64>,
    next_key: usize,
    posted: VecDeque<Completion>,
}

impl CompletionQueue {
    /// Creates an empty queue.
    pub fn new() -> IoResult<CompletionQueue> {
        Ok(CompletionQueue {
            poller: polling::Poller::new()?,
            registered: HashMap::new(),
            tags: HashMap::new(),
            next_key: 0,
            posted: VecDeque::new(),
        })
    }

    fn key_for(&mut self, fd: Descriptor) -> (usize, bool) {
        if let Some(key) = self.registered.get(&fd) {
            return (*key, true);
        }
        // usize::MAX is reserved by the poller.
        if self.next_key == usize::MAX {
            self.next_key = 0;
        }
        let key = self.next_key;
        self.next_key += 1;
        self.registered.insert(fd, key);
        (key, false)
    }

    /// Waits for `interest` on `socket` and reports it under `tag`.
    ///
    /// A descriptor closed behind the queue's back and reused by a new socket
    /// is registered afresh.
    pub fn arm(&mut self, socket: &Socket, tag: i64, interest: Interest) -> IoResult<()> {
        let fd = raw_descriptor(socket);
        let (key, known) = self.key_for(fd);
        let event = match interest {
            Interest::Readable => polling::Event::readable(key),
            Interest::Writable => polling::Event::writable(key),
        };
        let status = if known {
            match self.poller.modify(socket, event) {
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    log::debug!("{fd:?} was closed unregistered, adding it again");
                    // SAFETY: see below.
                    unsafe { self.poller.add(socket, event) }
                }
                other => other,
            }
        } else {
            // SAFETY: the socket is deregistered through `forget` before the
            // descriptor slot drops it; a socket dropped without `forget` is
            // removed by the host on close and re-added above.
            match unsafe { self.poller.add(socket, event) } {
                Err(e) if e.kind() == ErrorKind::AlreadyExists => self.poller.modify(socket, event),
                other => other,
            }
        };
        if let Err(e) = status {
            self.registered.remove(&fd);
            self.tags.remove(&key);
            return Err(e);
        }
        self.tags.insert(key, tag);
        log::debug!("Armed {interest:?} on {fd:?} with tag {tag}");
        Ok(())
    }

    /// Records a call that already completed.
    pub fn post(&mut self, tag: i64) {
        self.posted.push_back(Completion { tag, readable: false, writable: false });
    }

    /// Removes `socket` from the queue. Must be called before it is closed.
    pub fn forget(&mut self, socket: &Socket) {
        let fd = raw_descriptor(socket);
        if let Some(key) = self.registered.remove(&fd) {
            self.tags.remove(&key);
            if let Err(e) = self.poller.delete(socket) {
                log::warn!("Failed to deregister {fd:?}: {e}");
            }
        }
    }

    /// Returns completed calls, waiting up to `timeout` for the host to
    /// report one when none has been posted. `None` waits indefinitely.
    pub fn wait(&mut self, timeout: Option<Duration>) -> IoResult<Vec<Completion>> {
        let timeout = if self.posted.is_empty() { timeout } else { Some(Duration::ZERO) };
        let mut events = polling::Events::new();
        self.poller.wait(&mut events, timeout)?;
        let mut done: Vec<Completion> = self.posted.drain(..).collect();
        for e in events.iter() {
            match self.tags.get(&e.key) {
                Some(tag) => done.push(Completion { tag: *tag, readable: e.readable, writable: e.writable }),
                None => log::debug!("Dropping event for released key {}", e.key),
            }
        }
        log::debug!("{} completion(s) ready", done.len());
        Ok(done)
    }
}

impl std::fmt::Debug for CompletionQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionQueue")
            .field("registered", &self.registered)
            .field("tags", &self.tags)
            .field("posted", &self.posted)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use socket2::{Domain, SockAddr, Type};
    use std::net::SocketAddr;

    #[test]
    fn posted_completions_are_returned_without_blocking() {
        let mut queue = CompletionQueue::new().unwrap();
        queue.post(7);
        queue.post(-3);
        let done = queue.wait(None).unwrap();
        assert_eq!(done.iter().map(|c| c.tag).collect::<Vec<_>>(), vec![7, -3]);
        assert!(queue.wait(Some(Duration::ZERO)).unwrap().is_empty());
    }

    #[test]
    fn armed_listener_reports_incoming_connection() {
        let socket = Socket::new(Domain::IPV4, Type::STREAM, None).unwrap();
        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        socket.bind(&SockAddr::from(addr)).unwrap();
        socket.listen(1).unwrap();
        let local = socket.local_addr().unwrap().as_socket().unwrap();

        let mut queue = CompletionQueue::new().unwrap();
        queue.arm(&socket, 99, Interest::Readable).unwrap();
        let _client = std::net::TcpStream::connect(local).unwrap();

        let done = queue.wait(Some(Duration::from_secs(5))).unwrap();
        assert_eq!(done.len(), 1);
        assert_eq!(done[0].tag, 99);
        assert!(done[0].readable);

        queue.arm(&socket, 100, Interest::Readable).unwrap();
        queue.forget(&socket);
        queue.forget(&socket);
    }

    fn listening_socket() -> (Socket, SocketAddr) {
        let socket = Socket::new(Domain::IPV4, Type::STREAM, None).unwrap();
        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        socket.bind(&SockAddr::from(addr)).unwrap();
        socket.listen(1).unwrap();
        let local = socket.local_addr().unwrap().as_socket().unwrap();
        (socket, local)
    }

    #[test]
    fn any_tag_value_is_reported_unchanged() {
        for tag in [-1, i64::MIN, i64::MAX, 1 << 40] {
            let (socket, local) = listening_socket();
            let mut queue = CompletionQueue::new().unwrap();
            queue.arm(&socket, tag, Interest::Readable).unwrap();
            let _client = std::net::TcpStream::connect(local).unwrap();

            let done = queue.wait(Some(Duration::from_secs(5))).unwrap();
            assert_eq!(done.iter().map(|c| c.tag).collect::<Vec<_>>(), vec![tag]);
            queue.forget(&socket);
        }
    }

    #[test]
    fn reused_descriptor_is_registered_again() {
        let mut queue = CompletionQueue::new().unwrap();
        let (first, _) = listening_socket();
        let fd = raw_descriptor(&first);
        queue.arm(&first, 1, Interest::Readable).unwrap();
        drop(first);

        let (second, local) = listening_socket();
        if raw_descriptor(&second) != fd {
            // The host handed out a different descriptor; nothing stale to hit.
            return;
        }
        queue.arm(&second, 2, Interest::Readable).unwrap();
        let _client = std::net::TcpStream::connect(local).unwrap();
        let done = queue.wait(Some(Duration::from_secs(5))).unwrap();
        assert_eq!(done.len(), 1);
        assert_eq!(done[0].tag, 2);
        queue.forget(&second);
    }
}
