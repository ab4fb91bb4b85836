use std::mem::MaybeUninit;

use socket2::{Domain, Protocol, SockAddr, Socket, Type};

use crate::address::AddressStructure;
use crate::completion::{Completion, CompletionQueue, Interest};
use crate::connection::{ConnectionInfo, Descriptor, ShutdownMode};
use crate::error::{Error, Result};
use crate::process;

/// The operation table: one connection record and every socket operation
/// that acts on it.
///
/// Each method issues exactly one host socket call, with arguments taken from
/// [`ConnectionInfo`], and hands back what the host returned. Nothing is
/// retried, looped or timed out, and calls are not ordered: using an
/// operation out of sequence is reported by the host like any other failure.
///
/// The `_nw` ("no-wait") variants are meant for sockets allocated with
/// [`get_sock_nw`](Tcp::get_sock_nw). After issuing the host call they arm the
/// table's [`CompletionQueue`] under the record's correlation tag, so the
/// caller can later collect the completion with [`wait`](Tcp::wait).
///
/// # Example
///
/// ```rust,no_run
/// use nstcp::{ShutdownMode, Tcp};
/// use socket2::{Domain, Type};
///
/// let mut tcp = Tcp::new()?;
/// tcp.connection.ip_address = "127.0.0.1".into();
/// tcp.connection.port = 9000;
///
/// tcp.get_sock(Domain::IPV4, Type::STREAM, None)?;
/// tcp.set_sockaddr(Domain::IPV4);
/// tcp.make_connect()?;
/// tcp.new_send(b"PING")?;
///
/// let mut buf = [0u8; 4];
/// let n = tcp.new_recv(&mut buf)?;
/// println!("{}", String::from_utf8_lossy(&buf[..n]));
///
/// tcp.shutdown_sock(ShutdownMode::Both)?;
/// tcp.close_sock()?;
/// # Ok::<(), nstcp::Error>(())
/// ```
#[derive(Debug)]
pub struct Tcp {
    /// The connection record every operation reads and updates.
    pub connection: ConnectionInfo,
    completions: CompletionQueue,
}

impl Tcp {
    /// Creates a table with an empty connection record.
    pub fn new() -> Result<Tcp> {
        Ok(Tcp {
            connection: ConnectionInfo::default(),
            completions: CompletionQueue::new().map_err(Error::os("poller"))?,
        })
    }

    fn socket(&self) -> Result<&Socket> {
        self.connection.socket.as_ref().ok_or(Error::NoSocket)
    }

    fn sock_addr(&self) -> Result<SockAddr> {
        self.connection.address.as_ref().ok_or(Error::NoAddress)?.to_sock_addr()
    }

    fn arm(&mut self, interest: Interest) -> Result<()> {
        let tag = self.connection.tag;
        let socket = self.connection.socket.as_ref().ok_or(Error::NoSocket)?;
        self.completions.arm(socket, tag, interest).map_err(Error::os("poller"))
    }

    fn store_socket(&mut self, socket: Socket) -> Option<Socket> {
        let previous = self.connection.socket.replace(socket);
        if let Some(old) = previous.as_ref() {
            self.completions.forget(old);
        }
        previous
    }

    /// Selects the TCP/IP transport process by name, e.g. `$ZTC0`.
    pub fn set_proc(&mut self, name: &str) {
        process::set_inet_process(name);
        self.connection.process_name = name.to_owned();
    }

    /// Allocates a socket into the descriptor slot and returns its descriptor.
    ///
    /// A socket already in the slot is closed.
    pub fn get_sock(&mut self, domain: Domain, ty: Type, protocol: Option<Protocol>) -> Result<Descriptor> {
        log::debug!("socket({domain:?}, {ty:?}, {protocol:?}) on {:?}", process::inet_process());
        let socket = Socket::new(domain, ty, protocol).map_err(Error::os("socket"))?;
        self.install(socket)
    }

    /// Allocates a no-wait socket into the descriptor slot.
    ///
    /// `sync` is the host's synchronization depth indicator; it has no effect
    /// beyond being logged alongside the record's flags.
    pub fn get_sock_nw(
        &mut self,
        domain: Domain,
        ty: Type,
        protocol: Option<Protocol>,
        sync: i32,
    ) -> Result<Descriptor> {
        log::debug!(
            "socket_nw({domain:?}, {ty:?}, {protocol:?}, flags {}, sync {sync}) on {:?}",
            self.connection.flags,
            process::inet_process()
        );
        let socket = Socket::new(domain, ty, protocol).map_err(Error::os("socket_nw"))?;
        socket.set_nonblocking(true).map_err(Error::os("socket_nw"))?;
        self.install(socket)
    }

    fn install(&mut self, socket: Socket) -> Result<Descriptor> {
        let fd = crate::connection::raw_descriptor(&socket);
        if let Some(old) = self.store_socket(socket) {
            log::warn!("Replacing allocated socket {old:?}");
        }
        Ok(fd)
    }

    /// Puts an already open socket, typically one returned by an accept
    /// variant, into the descriptor slot. Returns the socket it replaced.
    pub fn adopt(&mut self, socket: Socket) -> Option<Socket> {
        self.store_socket(socket)
    }

    /// Builds the address structure from the record's `ip_address` and `port`.
    ///
    /// A previously built structure is released first.
    pub fn set_sockaddr(&mut self, family: Domain) {
        let sa = AddressStructure::build(family, &self.connection.ip_address, self.connection.port);
        if self.connection.address.replace(sa).is_some() {
            log::debug!("Replaced address structure");
        }
    }

    /// Sets flags, queue length, correlation tag and address length.
    pub fn set_additionals(&mut self, flags: i32, queue_length: i32, tag: i64, address_len: u32) {
        self.connection.set_additionals(flags, queue_length, tag, address_len);
    }

    /// Binds the socket to the address structure.
    pub fn set_bind(&mut self) -> Result<()> {
        let addr = self.sock_addr()?;
        log::debug!("bind({:?})", addr.as_socket());
        self.socket()?.bind(&addr).map_err(Error::os("bind"))
    }

    /// No-wait bind. Completes synchronously and posts its completion.
    pub fn set_bind_nw(&mut self) -> Result<()> {
        let addr = self.sock_addr()?;
        log::debug!("bind_nw({:?}, tag {})", addr.as_socket(), self.connection.tag);
        self.socket()?.bind(&addr).map_err(Error::os("bind_nw"))?;
        self.completions.post(self.connection.tag);
        Ok(())
    }

    fn prepare_connect(&mut self) -> Result<SockAddr> {
        let sa = self.connection.address.as_mut().ok_or(Error::NoAddress)?;
        sa.zero_padding();
        sa.to_sock_addr()
    }

    /// Connects the socket to the address structure.
    pub fn make_connect(&mut self) -> Result<()> {
        let addr = self.prepare_connect()?;
        log::debug!("connect({:?})", addr.as_socket());
        self.socket()?.connect(&addr).map_err(Error::os("connect"))
    }

    /// No-wait connect. Completion is reported when the socket becomes
    /// writable; an in-progress connect is returned as an error for which
    /// [`Error::is_would_block`] holds.
    pub fn make_connect_nw(&mut self) -> Result<()> {
        let addr = self.prepare_connect()?;
        log::debug!("connect_nw({:?}, tag {})", addr.as_socket(), self.connection.tag);
        let status = self.socket()?.connect(&addr).map_err(Error::os("connect_nw"));
        let armed = self.arm(Interest::Writable);
        keep_host_status(status, armed)
    }

    /// Listens with `queue_length` as the backlog.
    pub fn set_listen(&mut self) -> Result<()> {
        log::debug!("listen({})", self.connection.queue_length);
        self.socket()?.listen(self.connection.queue_length).map_err(Error::os("listen"))
    }

    fn record_peer(&mut self, peer: &SockAddr) -> Result<()> {
        self.connection.address = Some(AddressStructure::try_from(peer)?);
        self.connection.address_len = peer.len() as u32;
        Ok(())
    }

    /// Accepts a connection, blocking until one arrives.
    ///
    /// The peer address replaces the address structure and its length is
    /// written to `from_len`.
    ///
    /// If the peer cannot be recorded the connection stays open and comes back
    /// inside [`Error::Accepted`].
    pub fn new_accept(&mut self, from_len: &mut u32) -> Result<Socket> {
        let (socket, peer) = self.socket()?.accept().map_err(Error::os("accept"))?;
        log::debug!("Accepted connection from {:?}", peer.as_socket());
        let recorded = self.record_peer(&peer);
        if recorded.is_ok() {
            *from_len = self.connection.address_len;
        }
        settle(socket, recorded)
    }

    /// Waits, without blocking, for an incoming connection. Completion is
    /// reported under the correlation tag once one can be accepted with
    /// [`new_accept_nw2`](Tcp::new_accept_nw2).
    pub fn new_accept_nw(&mut self) -> Result<()> {
        log::debug!("accept_nw(tag {})", self.connection.tag);
        self.connection.address_len = AddressStructure::LEN;
        self.arm(Interest::Readable)
    }

    /// Like [`new_accept_nw`](Tcp::new_accept_nw), first handing the host
    /// `queue_length` as the pending connection queue hint.
    pub fn new_accept_nw1(&mut self) -> Result<()> {
        log::debug!("accept_nw1(tag {}, queue {})", self.connection.tag, self.connection.queue_length);
        self.socket()?.listen(self.connection.queue_length).map_err(Error::os("accept_nw1"))?;
        self.connection.address_len = AddressStructure::LEN;
        self.arm(Interest::Readable)
    }

    fn accept_nw(&mut self, op: &'static str) -> Result<Socket> {
        log::debug!("{op}(tag {})", self.connection.tag);
        let accepted = self.socket()?.accept();
        match accepted {
            Ok((socket, peer)) => {
                let step = self
                    .record_peer(&peer)
                    .and_then(|()| socket.set_nonblocking(true).map_err(Error::os(op)));
                settle(socket, step)
            }
            Err(e) => {
                let err = Error::os(op)(e);
                if err.is_would_block() {
                    let armed = self.arm(Interest::Readable);
                    return keep_host_status(Err(err), armed);
                }
                Err(err)
            }
        }
    }

    /// No-wait accept. Returns the accepted socket, in no-wait mode, and
    /// writes the peer into the address structure. When no connection is
    /// pending the readable interest is re-armed under the correlation tag.
    pub fn new_accept_nw2(&mut self) -> Result<Socket> {
        self.accept_nw("accept_nw2")
    }

    /// Like [`new_accept_nw2`](Tcp::new_accept_nw2), also writing the
    /// accepted connection's local address into `me`.
    pub fn new_accept_nw3(&mut self, me: &mut AddressStructure) -> Result<Socket> {
        let socket = self.accept_nw("accept_nw3")?;
        let step = socket
            .local_addr()
            .map_err(Error::os("accept_nw3"))
            .and_then(|local| AddressStructure::try_from(&local))
            .map(|local| *me = local);
        settle(socket, step)
    }

    /// Sends `buf` with the record's flags and returns the bytes sent.
    pub fn new_send(&mut self, buf: &[u8]) -> Result<usize> {
        let n = self
            .socket()?
            .send_with_flags(buf, self.connection.flags)
            .map_err(Error::os("send"))?;
        log::debug!("Sent {n}/{} bytes", buf.len());
        Ok(n)
    }

    /// No-wait send. Completion is reported when the socket is writable again.
    pub fn new_send_nw(&mut self, buf: &[u8]) -> Result<usize> {
        let status = self
            .socket()?
            .send_with_flags(buf, self.connection.flags)
            .map_err(Error::os("send_nw"));
        log::debug!("send_nw({} bytes, tag {}) -> {status:?}", buf.len(), self.connection.tag);
        let armed = self.arm(Interest::Writable);
        keep_host_status(status, armed)
    }

    fn recv_into(&self, buf: &mut [u8], op: &'static str) -> Result<usize> {
        // SAFETY: `recv` only writes initialized bytes into the buffer and the
        // buffer is already initialized, so viewing it as `MaybeUninit` is sound.
        let uninit = unsafe { &mut *(buf as *mut [u8] as *mut [MaybeUninit<u8>]) };
        self
            .socket()?
            .recv_with_flags(uninit, self.connection.flags)
            .map_err(Error::os(op))
    }

    /// Receives into `buf` with the record's flags and returns the bytes read.
    /// Zero means the peer has shut down its sending side.
    pub fn new_recv(&mut self, buf: &mut [u8]) -> Result<usize> {
        let n = self.recv_into(buf, "recv")?;
        log::debug!("Received {n} bytes");
        Ok(n)
    }

    /// No-wait receive. Completion is reported when data is readable.
    pub fn new_recv_nw(&mut self, buf: &mut [u8]) -> Result<usize> {
        let status = self.recv_into(buf, "recv_nw");
        log::debug!("recv_nw(tag {}) -> {status:?}", self.connection.tag);
        let armed = self.arm(Interest::Readable);
        keep_host_status(status, armed)
    }

    /// Shuts down one or both directions of the connection.
    pub fn shutdown_sock(&mut self, how: ShutdownMode) -> Result<()> {
        log::debug!("shutdown({how:?})");
        self.connection.shutdown_mode = how;
        self.socket()?.shutdown(how.into()).map_err(Error::os("shutdown"))
    }

    /// No-wait shutdown. Completes synchronously and posts its completion.
    pub fn shutdown_sock_nw(&mut self, how: ShutdownMode) -> Result<()> {
        log::debug!("shutdown_nw({how:?}, tag {})", self.connection.tag);
        self.connection.shutdown_mode = how;
        self.socket()?.shutdown(how.into()).map_err(Error::os("shutdown_nw"))?;
        self.completions.post(self.connection.tag);
        Ok(())
    }

    /// Closes the socket and clears the descriptor slot. An empty slot is not
    /// an error.
    pub fn close_sock(&mut self) -> Result<()> {
        match self.connection.socket.take() {
            Some(socket) => {
                log::debug!("Closing socket {socket:?}");
                self.completions.forget(&socket);
                drop(socket);
            }
            None => log::debug!("close on an empty descriptor slot"),
        }
        Ok(())
    }

    fn local_name(&mut self, op: &'static str) -> Result<u32> {
        let local = self.socket()?.local_addr().map_err(Error::os(op))?;
        self.connection.address = Some(AddressStructure::try_from(&local)?);
        self.connection.address_len = local.len() as u32;
        log::debug!("{op} -> {:?}", local.as_socket());
        Ok(self.connection.address_len)
    }

    /// Writes the socket's local address into the address structure and
    /// returns its length.
    pub fn get_sock_name(&mut self) -> Result<u32> {
        self.local_name("getsockname")
    }

    /// No-wait getsockname. Completes synchronously and posts its completion.
    pub fn get_sock_name_nw(&mut self) -> Result<u32> {
        let len = self.local_name("getsockname_nw")?;
        self.completions.post(self.connection.tag);
        Ok(len)
    }

    /// Releases the socket and the address structure and zeroes the
    /// per-socket fields. Address, port and process name are kept.
    pub fn clean_conn_info(&mut self) {
        if let Some(socket) = self.connection.socket.as_ref() {
            self.completions.forget(socket);
        }
        self.connection.clean();
    }

    /// Collects completed no-wait calls, waiting up to `timeout` for one.
    /// `None` waits indefinitely.
    pub fn wait(&mut self, timeout: Option<std::time::Duration>) -> Result<Vec<Completion>> {
        self.completions.wait(timeout).map_err(Error::os("wait"))
    }
}

/// The host call's status wins over a failure to arm its completion, which is
/// only logged.
fn keep_host_status<T>(status: Result<T>, armed: Result<()>) -> Result<T> {
    if let Err(e) = armed {
        log::warn!("Completion will not be reported: {e}");
    }
    status
}

/// Hands an accepted socket back with the error of a failed setup step, so
/// the connection is never closed behind the caller's back.
fn settle(socket: Socket, step: Result<()>) -> Result<Socket> {
    match step {
        Ok(()) => Ok(socket),
        Err(source) => Err(Error::Accepted { socket, source: Box::new(source) }),
    }
}

impl Drop for Tcp {
    fn drop(&mut self) {
        self.clean_conn_info();
    }
}
