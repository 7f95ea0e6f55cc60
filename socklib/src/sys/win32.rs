//! Windows sockets (Winsock 2) backend.

use std::io;
use std::mem;
use std::net::Ipv4Addr;
use std::time::Duration;

use windows_sys::Win32::Networking::WinSock as wsock;

use crate::addr::{ADDR_BLOB_LEN, Address};
use crate::error::{Result, SockError};
use crate::socket::{Family, Shutdown, Type};
use crate::sys::{HANDLE_BLOB_LEN, HandleBlob};

const _: () = assert!(HANDLE_BLOB_LEN >= mem::size_of::<wsock::SOCKET>());
const _: () = assert!(ADDR_BLOB_LEN >= mem::size_of::<wsock::SOCKADDR_IN>());

/// Winsock calls report failure through `SOCKET_ERROR` plus
/// `WSAGetLastError`, not errno.
macro_rules! wsa_syscall {
  ($fn: ident ( $($arg: expr),* $(,)* ) ) => {{
      let res = unsafe { wsock::$fn($($arg, )*) };
      if res == wsock::SOCKET_ERROR {
          Err(last_wsa_error())
      } else {
          Ok(res)
      }
  }};
}

fn last_wsa_error() -> io::Error {
  // SAFETY: WSAGetLastError only reads thread-local state.
  io::Error::from_raw_os_error(unsafe { wsock::WSAGetLastError() })
}

fn classify(call: &'static str, err: io::Error) -> SockError {
  match err.raw_os_error() {
    Some(code) if code == wsock::WSAETIMEDOUT => SockError::TimedOut,
    Some(code) if code == wsock::WSAEWOULDBLOCK => SockError::WouldBlock,
    Some(code) if code == wsock::WSAECONNRESET => SockError::ConnectionReset,
    _ => SockError::System { call, source: err },
  }
}

pub(crate) fn lib_init() -> Result<()> {
  // SAFETY: WSADATA is a plain C struct filled in by WSAStartup.
  let mut wsa_data: wsock::WSADATA = unsafe { mem::zeroed() };
  // Winsock 2.2.
  let res = unsafe { wsock::WSAStartup(0x0202, &mut wsa_data) };
  if res != 0 {
    return Err(SockError::System {
      call: "WSAStartup",
      source: io::Error::from_raw_os_error(res),
    });
  }
  Ok(())
}

pub(crate) fn lib_shutdown() {
  // SAFETY: balanced against the WSAStartup in lib_init.
  unsafe { wsock::WSACleanup() };
}

fn to_native(handle: &HandleBlob) -> wsock::SOCKET {
  u64::from_ne_bytes(*handle) as wsock::SOCKET
}

fn from_native(socket: wsock::SOCKET) -> HandleBlob {
  (socket as u64).to_ne_bytes()
}

fn to_native_addr(addr: &Address) -> wsock::SOCKADDR_IN {
  // SAFETY: SOCKADDR_IN is a plain C struct; all-zero is a valid value.
  let mut sin: wsock::SOCKADDR_IN = unsafe { mem::zeroed() };
  sin.sin_family = wsock::AF_INET;
  sin.sin_port = addr.port().to_be();
  sin.sin_addr = wsock::IN_ADDR {
    S_un: wsock::IN_ADDR_0 {
      S_addr: u32::from(Ipv4Addr::from(addr.octets())).to_be(),
    },
  };
  sin
}

fn from_native_storage(storage: &wsock::SOCKADDR_STORAGE) -> Result<Address> {
  if storage.ss_family != wsock::AF_INET {
    return Err(SockError::System {
      call: "sockaddr",
      source: io::Error::from_raw_os_error(wsock::WSAEAFNOSUPPORT),
    });
  }

  // SAFETY: ss_family is AF_INET, so the storage holds a SOCKADDR_IN.
  let sin = unsafe {
    *(storage as *const wsock::SOCKADDR_STORAGE as *const wsock::SOCKADDR_IN)
  };
  // SAFETY: every variant of the IN_ADDR union is four address bytes.
  let ip = Ipv4Addr::from(unsafe { sin.sin_addr.S_un.S_addr }.to_be());
  Ok(Address::from_parts(ip.octets(), u16::from_be(sin.sin_port)))
}

pub(crate) fn create(family: Family, ty: Type) -> Result<HandleBlob> {
  let native_family = match family {
    Family::Inet => wsock::AF_INET,
    Family::Inet6 => wsock::AF_INET6,
  };
  let (native_type, native_proto) = match ty {
    Type::Stream => (wsock::SOCK_STREAM, wsock::IPPROTO_TCP),
    Type::Dgram => (wsock::SOCK_DGRAM, wsock::IPPROTO_UDP),
  };

  // SAFETY: plain Winsock call; failure is signalled via INVALID_SOCKET.
  let socket = unsafe {
    wsock::socket(native_family as i32, native_type, native_proto as i32)
  };
  if socket == wsock::INVALID_SOCKET {
    return Err(classify("socket", last_wsa_error()));
  }

  // SO_REUSEADDR allows quick rebinds after restarts.
  let opt: i32 = 1;
  if let Err(err) = wsa_syscall!(setsockopt(
    socket,
    wsock::SOL_SOCKET as i32,
    wsock::SO_REUSEADDR as i32,
    &opt as *const i32 as *const u8,
    mem::size_of::<i32>() as i32,
  )) {
    // SAFETY: socket was just returned by socket() and is owned here.
    unsafe { wsock::closesocket(socket) };
    return Err(classify("setsockopt", err));
  }

  Ok(from_native(socket))
}

pub(crate) fn close(handle: &HandleBlob) {
  // Nothing to report from Drop.
  let _ = wsa_syscall!(closesocket(to_native(handle)));
}

pub(crate) fn bind(handle: &HandleBlob, addr: &Address) -> Result<()> {
  let sin = to_native_addr(addr);
  wsa_syscall!(bind(
    to_native(handle),
    &sin as *const wsock::SOCKADDR_IN as *const wsock::SOCKADDR,
    mem::size_of::<wsock::SOCKADDR_IN>() as i32,
  ))
  .map(|_| ())
  .map_err(|e| classify("bind", e))
}

pub(crate) fn listen(handle: &HandleBlob, backlog: i32) -> Result<()> {
  wsa_syscall!(listen(to_native(handle), backlog))
    .map(|_| ())
    .map_err(|e| classify("listen", e))
}

pub(crate) fn accept(
  handle: &HandleBlob,
  peer: Option<&mut Address>,
) -> Result<HandleBlob> {
  // SAFETY: SOCKADDR_STORAGE is a plain C struct; all-zero is valid.
  let mut storage: wsock::SOCKADDR_STORAGE = unsafe { mem::zeroed() };
  let mut len = mem::size_of::<wsock::SOCKADDR_STORAGE>() as i32;

  // SAFETY: storage and len are valid for the duration of the call.
  let socket = unsafe {
    wsock::accept(
      to_native(handle),
      &mut storage as *mut wsock::SOCKADDR_STORAGE as *mut wsock::SOCKADDR,
      &mut len,
    )
  };
  if socket == wsock::INVALID_SOCKET {
    return Err(classify("accept", last_wsa_error()));
  }

  if let Some(out) = peer {
    *out = from_native_storage(&storage)?;
  }

  Ok(from_native(socket))
}

pub(crate) fn connect(handle: &HandleBlob, addr: &Address) -> Result<()> {
  let sin = to_native_addr(addr);
  wsa_syscall!(connect(
    to_native(handle),
    &sin as *const wsock::SOCKADDR_IN as *const wsock::SOCKADDR,
    mem::size_of::<wsock::SOCKADDR_IN>() as i32,
  ))
  .map(|_| ())
  .map_err(|e| classify("connect", e))
}

pub(crate) fn send(handle: &HandleBlob, data: &[u8]) -> Result<usize> {
  let n = wsa_syscall!(send(
    to_native(handle),
    data.as_ptr(),
    data.len() as i32,
    0,
  ))
  .map_err(|e| classify("send", e))?;
  Ok(n as usize)
}

pub(crate) fn recv(handle: &HandleBlob, buf: &mut [u8]) -> Result<usize> {
  let n = wsa_syscall!(recv(
    to_native(handle),
    buf.as_mut_ptr(),
    buf.len() as i32,
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
  let n = wsa_syscall!(sendto(
    to_native(handle),
    data.as_ptr(),
    data.len() as i32,
    0,
    &sin as *const wsock::SOCKADDR_IN as *const wsock::SOCKADDR,
    mem::size_of::<wsock::SOCKADDR_IN>() as i32,
  ))
  .map_err(|e| classify("sendto", e))?;
  Ok(n as usize)
}

pub(crate) fn recv_from(
  handle: &HandleBlob,
  buf: &mut [u8],
  src: &mut Address,
) -> Result<usize> {
  // SAFETY: SOCKADDR_STORAGE is a plain C struct; all-zero is valid.
  let mut storage: wsock::SOCKADDR_STORAGE = unsafe { mem::zeroed() };
  let mut len = mem::size_of::<wsock::SOCKADDR_STORAGE>() as i32;

  let n = wsa_syscall!(recvfrom(
    to_native(handle),
    buf.as_mut_ptr(),
    buf.len() as i32,
    0,
    &mut storage as *mut wsock::SOCKADDR_STORAGE as *mut wsock::SOCKADDR,
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
  let mut mode: u32 = nonblocking as u32;
  wsa_syscall!(ioctlsocket(to_native(handle), wsock::FIONBIO, &mut mode))
    .map(|_| ())
    .map_err(|e| classify("ioctlsocket", e))
}

/// `Duration::ZERO` disables the timeout, matching SO_RCVTIMEO. Winsock
/// takes the timeout in whole milliseconds, so sub-millisecond precision
/// is rounded down.
pub(crate) fn set_timeout(
  handle: &HandleBlob,
  timeout: Duration,
) -> Result<()> {
  let millis: u32 = timeout.as_millis().try_into().unwrap_or(u32::MAX);
  wsa_syscall!(setsockopt(
    to_native(handle),
    wsock::SOL_SOCKET as i32,
    wsock::SO_RCVTIMEO as i32,
    &millis as *const u32 as *const u8,
    mem::size_of::<u32>() as i32,
  ))
  .map(|_| ())
  .map_err(|e| classify("setsockopt", e))
}

pub(crate) fn shutdown(handle: &HandleBlob, how: Shutdown) -> Result<()> {
  let how = match how {
    Shutdown::Read => wsock::SD_RECEIVE,
    Shutdown::Write => wsock::SD_SEND,
    Shutdown::Both => wsock::SD_BOTH,
  };
  wsa_syscall!(shutdown(to_native(handle), how))
    .map(|_| ())
    .map_err(|e| classify("shutdown", e))
}

pub(crate) fn local_address(handle: &HandleBlob) -> Result<Address> {
  // SAFETY: SOCKADDR_STORAGE is a plain C struct; all-zero is valid.
  let mut storage: wsock::SOCKADDR_STORAGE = unsafe { mem::zeroed() };
  let mut len = mem::size_of::<wsock::SOCKADDR_STORAGE>() as i32;

  wsa_syscall!(getsockname(
    to_native(handle),
    &mut storage as *mut wsock::SOCKADDR_STORAGE as *mut wsock::SOCKADDR,
    &mut len,
  ))
  .map_err(|e| classify("getsockname", e))?;

  from_native_storage(&storage)
}
