//! POSIX sockets backend.

use std::io;
use std::mem;
use std::net::Ipv4Addr;
use std::time::Duration;

use crate::addr::{ADDR_BLOB_LEN, Address};
use crate::error::{Result, SockError};
use crate::socket::{Family, Shutdown, Type};
use crate::sys::{HANDLE_BLOB_LEN, HandleBlob};

const _: () = assert!(HANDLE_BLOB_LEN >= mem::size_of::<libc::c_int>());
const _: () = assert!(ADDR_BLOB_LEN >= mem::size_of::<libc::sockaddr_in>());

macro_rules! syscall {
  ($fn: ident ( $($arg: expr),* $(,)* ) ) => {{
      #[allow(unused_unsafe)]
      let res = unsafe { libc::$fn($($arg, )*) };
      if res == -1 {
          Err(std::io::Error::last_os_error())
      } else {
          Ok(res)
      }
  }};
}

// MSG_NOSIGNAL turns a send on a reset connection into EPIPE instead of
// a process-wide SIGPIPE. Apple targets lack the flag; they get
// SO_NOSIGPIPE at creation time instead.
#[cfg(target_os = "linux")]
const SEND_FLAGS: libc::c_int = libc::MSG_NOSIGNAL;
#[cfg(not(target_os = "linux"))]
const SEND_FLAGS: libc::c_int = 0;

/// Maps a native error code into the portable taxonomy.
///
/// `EAGAIN` is reported as `WouldBlock` here; the portable layer turns
/// it into `TimedOut` when the socket is blocking with a receive
/// timeout armed, which is the only way `EAGAIN` arises on a blocking
/// socket.
fn classify(call: &'static str, err: io::Error) -> SockError {
  match err.raw_os_error() {
    Some(code)
      if code == libc::EAGAIN
        || code == libc::EWOULDBLOCK
        || code == libc::EINPROGRESS =>
    {
      SockError::WouldBlock
    }
    Some(code) if code == libc::ETIMEDOUT => SockError::TimedOut,
    Some(code) if code == libc::ECONNRESET || code == libc::EPIPE => {
      SockError::ConnectionReset
    }
    _ => SockError::System { call, source: err },
  }
}

pub(crate) fn lib_init() -> Result<()> {
  // The POSIX sockets subsystem needs no process-wide setup.
  Ok(())
}

pub(crate) fn lib_shutdown() {}

fn to_native(handle: &HandleBlob) -> libc::c_int {
  libc::c_int::from_ne_bytes([handle[0], handle[1], handle[2], handle[3]])
}

fn from_native(fd: libc::c_int) -> HandleBlob {
  let mut blob = [0u8; HANDLE_BLOB_LEN];
  blob[..4].copy_from_slice(&fd.to_ne_bytes());
  blob
}

fn to_native_addr(addr: &Address) -> libc::sockaddr_in {
  // SAFETY: sockaddr_in is a plain C struct; all-zero is a valid value.
  let mut sin: libc::sockaddr_in = unsafe { mem::zeroed() };
  sin.sin_family = libc::AF_INET as libc::sa_family_t;
  sin.sin_port = addr.port().to_be();
  sin.sin_addr =
    libc::in_addr { s_addr: u32::from(Ipv4Addr::from(addr.octets())).to_be() };
  sin
}

fn from_native_storage(storage: &libc::sockaddr_storage) -> Result<Address> {
  if storage.ss_family != libc::AF_INET as libc::sa_family_t {
    return Err(SockError::System {
      call: "sockaddr",
      source: io::Error::from_raw_os_error(libc::EAFNOSUPPORT),
    });
  }

  // SAFETY: ss_family is AF_INET, so the storage holds a sockaddr_in.
  let sin = unsafe {
    *(storage as *const libc::sockaddr_storage as *const libc::sockaddr_in)
  };
  let ip = Ipv4Addr::from(sin.sin_addr.s_addr.to_be());
  Ok(Address::from_parts(ip.octets(), u16::from_be(sin.sin_port)))
}

pub(crate) fn create(family: Family, ty: Type) -> Result<HandleBlob> {
  let native_family = match family {
    Family::Inet => libc::AF_INET,
    Family::Inet6 => libc::AF_INET6,
  };
  let (native_type, native_proto) = match ty {
    Type::Stream => (libc::SOCK_STREAM, libc::IPPROTO_TCP),
    Type::Dgram => (libc::SOCK_DGRAM, libc::IPPROTO_UDP),
  };

  let fd = syscall!(socket(native_family, native_type, native_proto))
    .map_err(|e| classify("socket", e))?;

  if let Err(err) = setup_socket_options(fd) {
    // SAFETY: fd was just returned by socket() and is owned here.
    unsafe { libc::close(fd) };
    return Err(err);
  }

  Ok(from_native(fd))
}

fn setup_socket_options(fd: libc::c_int) -> Result<()> {
  // SO_REUSEADDR allows quick rebinds after restarts.
  let opt: libc::c_int = 1;
  syscall!(setsockopt(
    fd,
    libc::SOL_SOCKET,
    libc::SO_REUSEADDR,
    &opt as *const libc::c_int as *const libc::c_void,
    mem::size_of::<libc::c_int>() as libc::socklen_t,
  ))
  .map_err(|e| classify("setsockopt", e))?;

  #[cfg(apple)]
  {
    let opt: libc::c_int = 1;
    syscall!(setsockopt(
      fd,
      libc::SOL_SOCKET,
      libc::SO_NOSIGPIPE,
      &opt as *const libc::c_int as *const libc::c_void,
      mem::size_of::<libc::c_int>() as libc::socklen_t,
    ))
    .map_err(|e| classify("setsockopt", e))?;
  }

  Ok(())
}

pub(crate) fn close(handle: &HandleBlob) {
  // Nothing to report from Drop.
  let _ = syscall!(close(to_native(handle)));
}

pub(crate) fn bind(handle: &HandleBlob, addr: &Address) -> Result<()> {
  let sin = to_native_addr(addr);
  syscall!(bind(
    to_native(handle),
    &sin as *const libc::sockaddr_in as *const libc::sockaddr,
    mem::size_of::<libc::sockaddr_in>() as libc::socklen_t,
  ))
  .map(|_| ())
  .map_err(|e| classify("bind", e))
}

pub(crate) fn listen(handle: &HandleBlob, backlog: i32) -> Result<()> {
  syscall!(listen(to_native(handle), backlog))
    .map(|_| ())
    .map_err(|e| classify("listen", e))
}

pub(crate) fn accept(
  handle: &HandleBlob,
  peer: Option<&mut Address>,
) -> Result<HandleBlob> {
  // SAFETY: sockaddr_storage is a plain C struct; all-zero is valid.
  let mut storage: libc::sockaddr_storage = unsafe { mem::zeroed() };
  let mut len = mem::size_of::<libc::sockaddr_storage>() as libc::socklen_t;

  let fd = syscall!(accept(
    to_native(handle),
    &mut storage as *mut libc::sockaddr_storage as *mut libc::sockaddr,
    &mut len,
  ))
  .map_err(|e| classify("accept", e))?;

  if let Some(out) = peer {
    *out = from_native_storage(&storage)?;
  }

  Ok(from_native(fd))
}

pub(crate) fn connect(handle: &HandleBlob, addr: &Address) -> Result<()> {
  let sin = to_native_addr(addr);
  syscall!(connect(
    to_native(handle),
    &sin as *const libc::sockaddr_in as *const libc::sockaddr,
    mem::size_of::<libc::sockaddr_in>() as libc::socklen_t,
  ))
  .map(|_| ())
  .map_err(|e| classify("connect", e))
}

pub(crate) fn send(handle: &HandleBlob, data: &[u8]) -> Result<usize> {
  let n = syscall!(send(
    to_native(handle),
    data.as_ptr() as *const libc::c_void,
    data.len(),
    SEND_FLAGS,
  ))
  .map_err(|e| classify("send", e))?;
  Ok(n as usize)
}

pub(crate) fn recv(handle: &HandleBlob, buf: &mut [u8]) -> Result<usize> {
  let n = syscall!(recv(
    to_native(handle),
    buf.as_mut_ptr() as *mut libc::c_void,
    buf.len(),
    0,
  ))
  .map_err(|e| classify("recv", e))?;
  Ok(n as usize)
}

pub(crate) fn send_to(
  handle: &HandleBlob,
  data: &[u8],
  dst: &Address,
) -> Result<usize> {
  let sin = to_native_addr(dst);
  let n = syscall!(sendto(
    to_native(handle),
    data.as_ptr() as *const libc::c_void,
    data.len(),
    SEND_FLAGS,
    &sin as *const libc::sockaddr_in as *const libc::sockaddr,
    mem::size_of::<libc::sockaddr_in>() as libc::socklen_t,
  ))
  .map_err(|e| classify("sendto", e))?;
  Ok(n as usize)
}

pub(crate) fn recv_from(
  handle: &HandleBlob,
  buf: &mut [u8],
  src: &mut Address,
) -> Result<usize> {
  // SAFETY: sockaddr_storage is a plain C struct; all-zero is valid.
  let mut storage: libc::sockaddr_storage = unsafe { mem::zeroed() };
  let mut len = mem::size_of::<libc::sockaddr_storage>() as libc::socklen_t;

  let n = syscall!(recvfrom(
    to_native(handle),
    buf.as_mut_ptr() as *mut libc::c_void,
    buf.len(),
    0,
    &mut storage as *mut libc::sockaddr_storage as *mut libc::sockaddr,
    &mut len,
  ))
  .map_err(|e| classify("recvfrom", e))?;

  *src = from_native_storage(&storage)?;
  Ok(n as usize)
}

pub(crate) fn set_nonblocking(
  handle: &HandleBlob,
  nonblocking: bool,
) -> Result<()> {
  let fd = to_native(handle);
  let flags =
    syscall!(fcntl(fd, libc::F_GETFL, 0)).map_err(|e| classify("fcntl", e))?;
  let flags = if nonblocking {
    flags | libc::O_NONBLOCK
  } else {
    flags & !libc::O_NONBLOCK
  };
  syscall!(fcntl(fd, libc::F_SETFL, flags))
    .map(|_| ())
    .map_err(|e| classify("fcntl", e))
}

/// `Duration::ZERO` disables the timeout, matching SO_RCVTIMEO.
pub(crate) fn set_timeout(
  handle: &HandleBlob,
  timeout: Duration,
) -> Result<()> {
  let tv = libc::timeval {
    tv_sec: timeout.as_secs() as libc::time_t,
    tv_usec: timeout.subsec_micros() as libc::suseconds_t,
  };
  syscall!(setsockopt(
    to_native(handle),
    libc::SOL_SOCKET,
    libc::SO_RCVTIMEO,
    &tv as *const libc::timeval as *const libc::c_void,
    mem::size_of::<libc::timeval>() as libc::socklen_t,
  ))
  .map(|_| ())
  .map_err(|e| classify("setsockopt", e))
}

pub(crate) fn shutdown(handle: &HandleBlob, how: Shutdown) -> Result<()> {
  let how = match how {
    Shutdown::Read => libc::SHUT_RD,
    Shutdown::Write => libc::SHUT_WR,
    Shutdown::Both => libc::SHUT_RDWR,
  };
  syscall!(shutdown(to_native(handle), how))
    .map(|_| ())
    .map_err(|e| classify("shutdown", e))
}

pub(crate) fn local_address(handle: &HandleBlob) -> Result<Address> {
  // SAFETY: sockaddr_storage is a plain C struct; all-zero is valid.
  let mut storage: libc::sockaddr_storage = unsafe { mem::zeroed() };
  let mut len = mem::size_of::<libc::sockaddr_storage>() as libc::socklen_t;

  syscall!(getsockname(
    to_native(handle),
    &mut storage as *mut libc::sockaddr_storage as *mut libc::sockaddr,
    &mut len,
  ))
  .map_err(|e| classify("getsockname", e))?;

  from_native_storage(&storage)
}
