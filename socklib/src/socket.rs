//! The portable socket type.
//!
//! A [`Socket`] owns at most one native handle and moves through the
//! states Unbound (no handle) → Created → Bound → Listening | Connected
//! | Datagram-ready → Closed. The handle is closed exactly once, when
//! the owning value is dropped. The type is deliberately not `Clone`:
//! ownership transfer, such as the new connection returned by
//! [`accept`](Socket::accept), is a move.
//!
//! All blocking semantics live in the native layer. Operations either
//! block until progress is made or, with
//! [`set_nonblocking`](Socket::set_nonblocking), fail immediately with
//! [`SockError::WouldBlock`]. [`set_timeout`](Socket::set_timeout)
//! bounds blocking receives. The layer never retries on its own;
//! retry/backoff loops belong to the caller.

use std::time::Duration;

use crate::addr::Address;
use crate::error::{Result, SockError, SockErrorKind};
use crate::pool::{self, PoolView};
use crate::sys;

/// Address family for [`Socket::create`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Family {
  Inet,
  Inet6,
}

/// Transport for [`Socket::create`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Type {
  /// TCP.
  Stream,
  /// UDP.
  Dgram,
}

/// Which direction(s) [`Socket::shutdown`] disables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shutdown {
  Read,
  Write,
  Both,
}

/// Backlog used by the demo programs; [`Socket::listen`] takes an
/// explicit value.
pub const DEFAULT_BACKLOG: i32 = 16;

/// A portable blocking socket.
///
/// ```no_run
/// use socklib::{Address, Family, Socket, Type};
///
/// fn main() -> socklib::Result<()> {
///   socklib::init()?;
///
///   let mut sock = Socket::open(Family::Inet, Type::Stream)?;
///   sock.connect(&Address::new("127.0.0.1", 7778)?)?;
///   sock.send_all(b"Hi there!")?;
///
///   let mut buffer = [0u8; 4096];
///   let n = sock.recv(&mut buffer)?;
///   println!("peer says {:?}", &buffer[..n]);
///
///   socklib::shutdown();
///   Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct Socket {
  handle: sys::HandleBlob,
  has_handle: bool,
  nonblocking: bool,
  timeout_armed: bool,
  last_error: Option<SockErrorKind>,
}

impl Socket {
  /// An empty socket with no native handle. Populate it with
  /// [`create`](Socket::create).
  pub fn new() -> Self {
    Self {
      handle: [0u8; sys::HANDLE_BLOB_LEN],
      has_handle: false,
      nonblocking: false,
      timeout_armed: false,
      last_error: None,
    }
  }

  /// Creates and immediately populates a socket.
  pub fn open(family: Family, ty: Type) -> Result<Self> {
    let mut sock = Self::new();
    sock.create(family, ty)?;
    Ok(sock)
  }

  pub(crate) fn from_native(handle: sys::HandleBlob) -> Self {
    Self {
      handle,
      has_handle: true,
      nonblocking: false,
      timeout_armed: false,
      last_error: None,
    }
  }

  /// Allocates the native handle for the requested family and
  /// transport.
  ///
  /// Fails with [`SockError::AlreadyCreated`] if a handle already
  /// exists; no second native allocation is attempted.
  pub fn create(&mut self, family: Family, ty: Type) -> Result<()> {
    if self.has_handle {
      return self.record(Err(SockError::AlreadyCreated));
    }
    self.handle = self.record(sys::create(family, ty))?;
    self.has_handle = true;
    Ok(())
  }

  pub fn has_handle(&self) -> bool {
    self.has_handle
  }

  /// Binds to a local endpoint. Legal from the Created state.
  pub fn bind(&mut self, addr: &Address) -> Result<()> {
    let res = self.native().and_then(|h| sys::bind(h, addr));
    self.record(res)
  }

  /// Transitions a bound socket to Listening.
  ///
  /// `backlog` bounds the queue of not-yet-accepted pending
  /// connections; overflow is rejected by the platform, not here.
  pub fn listen(&mut self, backlog: i32) -> Result<()> {
    let res = self.native().and_then(|h| sys::listen(h, backlog));
    self.record(res)
  }

  /// Blocks until a pending connection exists and returns a new
  /// connected [`Socket`] for that peer.
  ///
  /// In non-blocking mode this fails with [`SockError::WouldBlock`]
  /// when the queue is empty. Use
  /// [`accept_from`](Socket::accept_from) to also learn the peer's
  /// address.
  pub fn accept(&mut self) -> Result<Socket> {
    let res = self.native().and_then(|h| sys::accept(h, None));
    self.io_result(res).map(Socket::from_native)
  }

  /// Like [`accept`](Socket::accept), additionally storing the peer's
  /// address into `peer`.
  pub fn accept_from(&mut self, peer: &mut Address) -> Result<Socket> {
    let res = self.native().and_then(|h| sys::accept(h, Some(peer)));
    self.io_result(res).map(Socket::from_native)
  }

  /// Initiates a stream connection, blocking until it is established
  /// or fails. On a datagram socket this records the default peer for
  /// later [`send`](Socket::send)/[`recv`](Socket::recv) calls.
  pub fn connect(&mut self, addr: &Address) -> Result<()> {
    let res = self.native().and_then(|h| sys::connect(h, addr));
    self.io_result(res)
  }

  /// Hands `data` to the transport and returns the number of bytes it
  /// accepted, which **may be less than `data.len()`**. Callers that
  /// need every byte delivered should use
  /// [`send_all`](Socket::send_all).
  pub fn send(&mut self, data: &[u8]) -> Result<usize> {
    let res = self.native().and_then(|h| sys::send(h, data));
    self.io_result(res)
  }

  /// Loops over [`send`](Socket::send) until all of `data` has been
  /// accepted by the transport, returning `data.len()`, or until an
  /// error aborts the loop.
  pub fn send_all(&mut self, data: &[u8]) -> Result<usize> {
    let mut sent = 0;
    while sent < data.len() {
      sent += self.send(&data[sent..])?;
    }
    Ok(sent)
  }

  /// Receives into `buf`, blocking until at least one byte arrives,
  /// the peer closes, or an error occurs.
  ///
  /// `Ok(0)` signals peer-initiated orderly close, not an error.
  pub fn recv(&mut self, buf: &mut [u8]) -> Result<usize> {
    let res = self.native().and_then(|h| sys::recv(h, buf));
    self.io_result(res)
  }

  /// Sends one datagram to `dst`.
  pub fn send_to(&mut self, data: &[u8], dst: &Address) -> Result<usize> {
    let res = self.native().and_then(|h| sys::send_to(h, data, dst));
    self.io_result(res)
  }

  /// Receives one datagram, storing the sender's endpoint into `src`.
  pub fn recv_from(
    &mut self,
    buf: &mut [u8],
    src: &mut Address,
  ) -> Result<usize> {
    let res = self.native().and_then(|h| sys::recv_from(h, buf, src));
    self.io_result(res)
  }

  /// Receives into a buffer borrowed from the global pool instead of a
  /// caller-provided one, so a hot receive loop does not allocate.
  ///
  /// The returned view holds at most `max_len` received bytes and
  /// returns its buffer to the pool when dropped.
  pub fn recv_into_pool(&mut self, max_len: usize) -> Result<PoolView> {
    let view = pool::get_pool(max_len).named("recv scratch");
    {
      let mut buf = view.buf();
      buf.resize(max_len, 0);
      let n = {
        let res = self.native().and_then(|h| sys::recv(h, &mut buf));
        self.io_result(res)?
      };
      buf.truncate(n);
    }
    Ok(view)
  }

  /// Toggles whether operations fail with [`SockError::WouldBlock`]
  /// instead of blocking.
  pub fn set_nonblocking(&mut self, nonblocking: bool) -> Result<()> {
    let res = self.native().and_then(|h| sys::set_nonblocking(h, nonblocking));
    let res = self.record(res);
    if res.is_ok() {
      self.nonblocking = nonblocking;
    }
    res
  }

  /// Bounds how long a subsequent blocking receive may wait before
  /// failing with [`SockError::TimedOut`]. Fractional seconds are
  /// honoured; [`Duration::ZERO`] clears the timeout (wait
  /// indefinitely).
  pub fn set_timeout(&mut self, timeout: Duration) -> Result<()> {
    let res = self.native().and_then(|h| sys::set_timeout(h, timeout));
    let res = self.record(res);
    if res.is_ok() {
      self.timeout_armed = !timeout.is_zero();
    }
    res
  }

  /// Disables further sends and/or receives. A half-close via
  /// [`Shutdown::Write`] makes the peer's receive return `Ok(0)`.
  pub fn shutdown(&mut self, how: Shutdown) -> Result<()> {
    let res = self.native().and_then(|h| sys::shutdown(h, how));
    self.record(res)
  }

  /// The local endpoint this socket is bound to. Useful after binding
  /// to port 0 to learn the port the platform picked.
  pub fn local_address(&mut self) -> Result<Address> {
    let res = self.native().and_then(sys::local_address);
    self.record(res)
  }

  /// Classification of the most recent failed operation, or `None` if
  /// nothing has failed yet.
  pub fn last_error(&self) -> Option<SockErrorKind> {
    self.last_error
  }

  fn native(&self) -> Result<&sys::HandleBlob> {
    if self.has_handle { Ok(&self.handle) } else { Err(SockError::NotCreated) }
  }

  fn record<T>(&mut self, res: Result<T>) -> Result<T> {
    if let Err(err) = &res {
      self.last_error = Some(err.kind());
    }
    res
  }

  fn io_result<T>(&mut self, res: Result<T>) -> Result<T> {
    let res = res.map_err(|e| self.reclassify(e));
    self.record(res)
  }

  // SO_RCVTIMEO surfaces as EAGAIN on POSIX. On a blocking socket with
  // a timeout armed that can only mean the wait expired.
  fn reclassify(&self, err: SockError) -> SockError {
    match err {
      SockError::WouldBlock if self.timeout_armed && !self.nonblocking => {
        SockError::TimedOut
      }
      other => other,
    }
  }
}

impl Default for Socket {
  fn default() -> Self {
    Self::new()
  }
}

impl Drop for Socket {
  fn drop(&mut self) {
    if self.has_handle {
      sys::close(&self.handle);
      self.has_handle = false;
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn new_socket_is_unbound() {
    let sock = Socket::new();
    assert!(!sock.has_handle());
    assert_eq!(sock.last_error(), None);
  }

  #[test]
  fn operations_without_a_handle_are_rejected() {
    let mut sock = Socket::new();
    let addr = Address::new("127.0.0.1", 1).unwrap();
    assert!(matches!(sock.bind(&addr), Err(SockError::NotCreated)));
    assert!(matches!(sock.listen(DEFAULT_BACKLOG), Err(SockError::NotCreated)));
    assert!(matches!(sock.send(b"x"), Err(SockError::NotCreated)));
    assert_eq!(sock.last_error(), Some(SockErrorKind::Other));
  }

  #[test]
  fn transient_reclassification_needs_an_armed_timeout() {
    let mut sock = Socket::new();
    assert!(matches!(
      sock.reclassify(SockError::WouldBlock),
      SockError::WouldBlock
    ));

    sock.timeout_armed = true;
    assert!(matches!(
      sock.reclassify(SockError::WouldBlock),
      SockError::TimedOut
    ));

    sock.nonblocking = true;
    assert!(matches!(
      sock.reclassify(SockError::WouldBlock),
      SockError::WouldBlock
    ));
  }
}
