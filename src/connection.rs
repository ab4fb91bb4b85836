use std::net::Shutdown;

use socket2::Socket;

use crate::address::AddressStructure;
use crate::error::Error;

#[cfg(unix)]
/// Raw descriptor of a socket as the host numbers it.
pub type Descriptor = std::os::unix::io::RawFd;
#[cfg(windows)]
/// Raw descriptor of a socket as the host numbers it.
pub type Descriptor = std::os::windows::io::RawSocket;

/// How a connection is shut down. The values are the host's `how` argument.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[repr(i32)]
pub enum ShutdownMode {
    /// Stop receiving.
    #[default]
    Receive = 0,
    /// Stop sending.
    Send = 1,
    /// Stop both directions.
    Both = 2,
}

impl TryFrom<i32> for ShutdownMode {
    type Error = Error;

    fn try_from(how: i32) -> Result<ShutdownMode, Error> {
        match how {
            0 => Ok(ShutdownMode::Receive),
            1 => Ok(ShutdownMode::Send),
            2 => Ok(ShutdownMode::Both),
            _ => Err(Error::InvalidShutdownMode(how)),
        }
    }
}

impl From<ShutdownMode> for Shutdown {
    fn from(mode: ShutdownMode) -> Shutdown {
        match mode {
            ShutdownMode::Receive => Shutdown::Read,
            ShutdownMode::Send => Shutdown::Write,
            ShutdownMode::Both => Shutdown::Both,
        }
    }
}

/// Per-connection state used by every operation of a [`Tcp`](crate::Tcp).
///
/// Identity fields (`ip_address`, `port`, `process_name`) survive
/// [`clean`](ConnectionInfo::clean); everything set for a particular socket
/// does not.
#[derive(Debug, Default)]
pub struct ConnectionInfo {
    /// Dotted numeric host address.
    pub ip_address: String,
    /// Port in host byte order.
    pub port: u16,
    /// Name of the TCP/IP transport process.
    pub process_name: String,
    /// The descriptor slot. Closed when cleared or dropped.
    pub socket: Option<Socket>,
    /// Address structure built by `set_sockaddr` or filled by accept and
    /// getsockname.
    pub address: Option<AddressStructure>,
    /// Byte length of the address structure, as reported by the host.
    pub address_len: u32,
    /// Flags forwarded verbatim to send and receive.
    pub flags: i32,
    /// Listen backlog, also the queue-length hint of `new_accept_nw1`.
    pub queue_length: i32,
    /// Correlation tag forwarded to every no-wait call.
    pub tag: i64,
    /// Mode of the last shutdown issued on this connection.
    pub shutdown_mode: ShutdownMode,
}

impl ConnectionInfo {
    /// Sets the per-socket fields in one go.
    pub fn set_additionals(&mut self, flags: i32, queue_length: i32, tag: i64, address_len: u32) {
        self.flags = flags;
        self.queue_length = queue_length;
        self.tag = tag;
        self.address_len = address_len;
    }

    /// Raw descriptor in the slot, if a socket is allocated.
    pub fn descriptor(&self) -> Option<Descriptor> {
        self.socket.as_ref().map(raw_descriptor)
    }

    /// Releases the socket and address structure and zeroes the per-socket
    /// fields, leaving the record ready for a fresh socket.
    pub fn clean(&mut self) {
        self.address = None;
        if let Some(socket) = self.socket.take() {
            log::debug!("Closing socket {socket:?}");
        }
        self.queue_length = 0;
        self.flags = 0;
        self.address_len = 0;
        self.tag = 0;
    }
}

#[cfg(unix)]
pub(crate) fn raw_descriptor(socket: &Socket) -> Descriptor {
    use std::os::unix::io::AsRawFd;
    socket.as_raw_fd()
}

#[cfg(windows)]
pub(crate) fn raw_descriptor(socket: &Socket) -> Descriptor {
    use std::os::windows::io::AsRawSocket;
    socket.as_raw_socket()
}

#[cfg(test)]
mod tests {
    use super::*;
    use socket2::{Domain, Type};

    #[test]
    fn shutdown_modes_follow_host_values() {
        assert_eq!(ShutdownMode::try_from(2).unwrap(), ShutdownMode::Both);
        assert_eq!(Shutdown::from(ShutdownMode::Send), Shutdown::Write);
        assert!(matches!(ShutdownMode::try_from(3), Err(Error::InvalidShutdownMode(3))));
        assert!(matches!(ShutdownMode::try_from(-1), Err(Error::InvalidShutdownMode(-1))));
    }

    #[test]
    fn clean_keeps_identity_fields() {
        let mut info = ConnectionInfo {
            ip_address: "127.0.0.1".into(),
            port: 9000,
            process_name: "$ZTC0".into(),
            ..Default::default()
        };
        info.set_additionals(4, 5, 77, AddressStructure::LEN);
        info.address = Some(AddressStructure::build(Domain::IPV4, "127.0.0.1", 9000));
        info.socket = Some(Socket::new(Domain::IPV4, Type::STREAM, None).unwrap());
        assert!(info.descriptor().is_some());

        info.clean();
        assert!(info.socket.is_none());
        assert!(info.address.is_none());
        assert_eq!((info.flags, info.queue_length, info.tag, info.address_len), (0, 0, 0, 0));
        assert_eq!(info.ip_address, "127.0.0.1");
        assert_eq!(info.port, 9000);
        assert_eq!(info.process_name, "$ZTC0");

        info.clean();
        assert!(info.descriptor().is_none());
    }
}
