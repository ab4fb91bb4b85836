//! # nstcp - a socket operation table
//!
//! nstcp gives calling code one handle, [`Tcp`], through which it allocates,
//! binds, connects, listens on, accepts, sends on, receives from, shuts down
//! and closes a socket, instead of calling the host socket routines directly.
//!
//! There is no protocol logic here. Every operation is a single pass-through
//! to a host socket call, taking its arguments from the handle's
//! [`ConnectionInfo`] record and handing back what the host returned.
//!
//! ## Key Features
//!
//! - **One record per socket**: address, port, flags, backlog, correlation
//!   tag and shutdown mode live in [`ConnectionInfo`], so call sites stay short
//! - **Blocking and no-wait variants**: every `_nw` operation issues the
//!   non-blocking form of the call and reports its completion, under the
//!   caller's correlation tag, through [`Tcp::wait`]
//! - **Zero-filled address structures**: [`AddressStructure`] never carries
//!   stale padding, which some peers answer with a refused connection
//! - **Native errors preserved**: host failures come back as [`Error::Os`]
//!   with the OS error code intact
//!
//! ## What It Does Not Do
//!
//! Framing, reassembly, partial-transfer loops, retries, timeouts, pooling,
//! TLS and name resolution are all left to the caller.
//!
//! ## Basic Usage
//!
//! ### Server Side
//!
//! ```rust,no_run
//! use nstcp::Tcp;
//! use socket2::{Domain, Type};
//!
//! let mut tcp = Tcp::new()?;
//! tcp.connection.ip_address = "0.0.0.0".into();
//! tcp.connection.port = 9000;
//! tcp.set_additionals(0, 5, 0, 0);
//!
//! tcp.get_sock(Domain::IPV4, Type::STREAM, None)?;
//! tcp.set_sockaddr(Domain::IPV4);
//! tcp.set_bind()?;
//! tcp.set_listen()?;
//!
//! let mut from_len = 0;
//! let accepted = tcp.new_accept(&mut from_len)?;
//!
//! let mut conn = Tcp::new()?;
//! conn.adopt(accepted);
//! conn.new_send(b"hello")?;
//! # Ok::<(), nstcp::Error>(())
//! ```
//!
//! ### No-wait Client
//!
//! ```rust,no_run
//! use nstcp::Tcp;
//! use socket2::{Domain, Type};
//! use std::time::Duration;
//!
//! let mut tcp = Tcp::new()?;
//! tcp.connection.ip_address = "127.0.0.1".into();
//! tcp.connection.port = 9000;
//! tcp.connection.tag = 42;
//!
//! tcp.get_sock_nw(Domain::IPV4, Type::STREAM, None, 0)?;
//! tcp.set_sockaddr(Domain::IPV4);
//! match tcp.make_connect_nw() {
//!     Err(e) if e.is_would_block() => {}
//!     other => other?,
//! }
//! for done in tcp.wait(Some(Duration::from_secs(5)))? {
//!     println!("tag {} completed", done.tag);
//! }
//! # Ok::<(), nstcp::Error>(())
//! ```
//!
//! ## Threading
//!
//! A [`Tcp`] is single-owner state. It is `Send` but carries no locking; share
//! it across threads only behind the caller's own synchronization.

#![warn(missing_docs)]

mod address;
mod completion;
mod connection;
mod error;
pub mod logging;
mod process;
mod table;

pub use address::{AddressStructure, INADDR_NONE, inet_addr};
pub use completion::{Completion, CompletionQueue, Interest};
pub use connection::{ConnectionInfo, Descriptor, ShutdownMode};
pub use error::{Error, Result};
pub use process::{inet_process, set_inet_process};
pub use table::Tcp;
