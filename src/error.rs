use std::io;

use socket2::Socket;
use thiserror::Error;

/// Errors reported by the operation table.
///
/// Host failures keep the native error untouched in [`Error::Os`]; the other
/// variants cover calls the host would otherwise see with a missing argument.
#[derive(Error, Debug)]
pub enum Error {
    /// The host socket call failed.
    #[error("{op} failed: {source}")]
    Os {
        /// Name of the host call.
        op: &'static str,
        /// The native error, including its OS code.
        #[source]
        source: io::Error,
    },

    /// The descriptor slot is empty.
    #[error("no socket has been allocated")]
    NoSocket,

    /// The address structure has not been built.
    #[error("no address structure has been built")]
    NoAddress,

    /// The address family cannot be expressed as an IPv4 socket address.
    #[error("unsupported address family {0}")]
    UnsupportedFamily(i32),

    /// Shutdown modes are 0 (receive), 1 (send) and 2 (both).
    #[error("invalid shutdown mode {0}")]
    InvalidShutdownMode(i32),

    /// A connection was accepted but could not be set up. The connection is
    /// still open; dropping the socket closes it.
    #[error("accepted connection could not be set up: {source}")]
    Accepted {
        /// The accepted connection.
        socket: Socket,
        /// What failed after the accept.
        #[source]
        source: Box<Error>,
    },
}

/// Result type alias for operation table calls.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn os(op: &'static str) -> impl FnOnce(io::Error) -> Error {
        move |source| Error::Os { op, source }
    }

    /// The native OS error code, when the host reported one.
    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            Error::Os { source, .. } => source.raw_os_error(),
            Error::Accepted { source, .. } => source.raw_os_error(),
            _ => None,
        }
    }

    /// True when a non-blocking call was accepted but has not completed yet.
    ///
    /// Covers both "would block" and "operation in progress", the latter being
    /// what a non-blocking connect reports.
    pub fn is_would_block(&self) -> bool {
        match self {
            Error::Os { source, .. } => {
                source.kind() == io::ErrorKind::WouldBlock || is_in_progress(source)
            }
            _ => false,
        }
    }
}

#[cfg(unix)]
fn is_in_progress(err: &io::Error) -> bool {
    err.raw_os_error() == Some(libc::EINPROGRESS)
}

#[cfg(not(unix))]
fn is_in_progress(_err: &io::Error) -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn os_error_keeps_native_code() {
        let err = Error::os("bind")(io::Error::from_raw_os_error(98));
        assert_eq!(err.raw_os_error(), Some(98));
        assert!(err.to_string().starts_with("bind failed"));
        assert_eq!(Error::NoSocket.raw_os_error(), None);
    }

    #[test]
    fn would_block_detection() {
        let err = Error::os("recv")(io::Error::from(io::ErrorKind::WouldBlock));
        assert!(err.is_would_block());
        assert!(!Error::NoAddress.is_would_block());
        #[cfg(unix)]
        assert!(Error::os("connect")(io::Error::from_raw_os_error(libc::EINPROGRESS)).is_would_block());
    }

    #[test]
    fn accepted_error_reports_the_setup_failure() {
        let socket = Socket::new(socket2::Domain::IPV4, socket2::Type::STREAM, None).unwrap();
        let err = Error::Accepted {
            socket,
            source: Box::new(Error::os("fcntl")(io::Error::from_raw_os_error(9))),
        };
        assert_eq!(err.raw_os_error(), Some(9));
        assert!(!err.is_would_block());
        assert!(err.to_string().contains("fcntl failed"));
        assert!(std::error::Error::source(&err).is_some());
    }
}
