//! # socklib - portable blocking sockets with pooled receive buffers
//!
//! A small cross-platform socket abstraction: a portable value type
//! wrapping an opaque native handle, one platform backend compiled in
//! per target, explicit error-code translation into a portable
//! taxonomy, and a reference-counted buffer pool so receive loops do
//! not allocate per call.
//!
//! ## Platform support
//!
//! | Platform | Backend          |
//! |----------|------------------|
//! | Unix     | POSIX sockets    |
//! | Windows  | Winsock 2        |
//!
//! The backend is selected at build time; both satisfy the same
//! contract, so calling code never branches on platform.
//!
//! ## Quick start
//!
//! ```no_run
//! use socklib::{Address, Family, Socket, Type};
//!
//! fn main() -> socklib::Result<()> {
//!     socklib::init()?;
//!
//!     let mut server = Socket::open(Family::Inet, Type::Stream)?;
//!     server.bind(&Address::new("127.0.0.1", 7778)?)?;
//!     server.listen(socklib::DEFAULT_BACKLOG)?;
//!
//!     let mut peer = Address::default();
//!     let mut conn = server.accept_from(&mut peer)?;
//!     println!("connection from {peer}");
//!
//!     // Borrowed scratch space; returned to the pool at end of scope.
//!     let view = conn.recv_into_pool(4096)?;
//!     conn.send_all(&view.buf())?;
//!
//!     socklib::shutdown();
//!     Ok(())
//! }
//! ```
//!
//! ## Error handling
//!
//! Operations return [`Result`]. Transient conditions
//! ([`SockError::TimedOut`], [`SockError::WouldBlock`]) are meant to be
//! retried by the caller; everything else is either a programming error
//! or fatal by default. See the [`error`](SockError) taxonomy. The most
//! recent failure is also retrievable from
//! [`Socket::last_error`].

mod addr;
mod error;
mod pool;
mod socket;
mod sys;
#[cfg(feature = "alloc-trace")]
pub mod trace;

pub use addr::Address;
pub use error::{Result, SockError, SockErrorKind};
pub use pool::{Pool, PoolView, get_pool, init_pools};
pub use socket::{DEFAULT_BACKLOG, Family, Shutdown, Socket, Type};

use std::sync::atomic::{AtomicBool, Ordering};

static STARTED: AtomicBool = AtomicBool::new(false);

/// Process-wide one-time initialisation of the native sockets
/// subsystem (Winsock startup on Windows, a no-op elsewhere).
///
/// Call once before any [`Socket`] is created. Extra calls are
/// ignored.
pub fn init() -> Result<()> {
  if !STARTED.swap(true, Ordering::AcqRel) {
    sys::lib_init()?;
    tracing::trace!("socket subsystem initialised");
  }
  Ok(())
}

/// Tears the native sockets subsystem back down. Call once, after all
/// [`Socket`]s are destroyed. Ignored if [`init`] has not run.
pub fn shutdown() {
  if STARTED.swap(false, Ordering::AcqRel) {
    sys::lib_shutdown();
    tracing::trace!("socket subsystem shut down");
  }
}
