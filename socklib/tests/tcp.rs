use std::thread;
use std::time::{Duration, Instant};

use socklib::{
  Address, Family, Shutdown, SockError, SockErrorKind, Socket, Type,
};

/// A listening socket on an ephemeral loopback port.
fn listener() -> (Socket, Address) {
  socklib::init().unwrap();
  let mut server = Socket::open(Family::Inet, Type::Stream).unwrap();
  server.bind(&Address::new("127.0.0.1", 0).unwrap()).unwrap();
  server.listen(4).unwrap();
  let addr = server.local_address().unwrap();
  (server, addr)
}

fn client_for(addr: &Address) -> Socket {
  let mut client = Socket::open(Family::Inet, Type::Stream).unwrap();
  client.connect(addr).unwrap();
  client
}

#[test]
fn create_twice_is_a_config_error() {
  socklib::init().unwrap();
  let mut sock = Socket::open(Family::Inet, Type::Stream).unwrap();
  let err = sock.create(Family::Inet, Type::Stream).unwrap_err();
  assert!(matches!(err, SockError::AlreadyCreated));
  assert!(!err.is_transient());
  assert_eq!(sock.last_error(), Some(SockErrorKind::Other));
  // The original handle is still usable.
  assert!(sock.has_handle());
}

#[test]
fn echo_roundtrip() {
  let (mut server, addr) = listener();

  let server_thread = thread::spawn(move || {
    let mut conn = server.accept().unwrap();
    let mut total = Vec::new();
    let mut buf = [0u8; 1024];
    loop {
      let n = conn.recv(&mut buf).unwrap();
      if n == 0 {
        break;
      }
      total.extend_from_slice(&buf[..n]);
    }
    conn.send_all(&total).unwrap();
    total.len()
  });

  let mut client = client_for(&addr);
  client.send_all(b"hello across loopback").unwrap();
  client.shutdown(Shutdown::Write).unwrap();

  let mut got = Vec::new();
  let mut buf = [0u8; 64];
  loop {
    let n = client.recv(&mut buf).unwrap();
    if n == 0 {
      break;
    }
    got.extend_from_slice(&buf[..n]);
  }

  assert_eq!(got, b"hello across loopback");
  assert_eq!(server_thread.join().unwrap(), got.len());
}

#[test]
fn send_all_transfers_every_byte() {
  let (mut server, addr) = listener();
  let payload: Vec<u8> = (0..4 << 20).map(|_| fastrand::u8(..)).collect();
  let expected = payload.clone();

  // 4 MiB is far beyond the socket buffers, so send_all must loop over
  // partial sends while this thread drains the other end.
  let client_thread = thread::spawn(move || {
    let mut client = client_for(&addr);
    let sent = client.send_all(&payload).unwrap();
    assert_eq!(sent, payload.len());
  });

  let mut conn = server.accept().unwrap();
  let mut got = Vec::with_capacity(expected.len());
  let mut buf = [0u8; 8192];
  while got.len() < expected.len() {
    let n = conn.recv(&mut buf).unwrap();
    assert!(n > 0, "peer closed before the full payload arrived");
    got.extend_from_slice(&buf[..n]);
  }

  assert_eq!(got, expected);
  client_thread.join().unwrap();
}

#[test]
fn recv_returns_zero_exactly_once_at_half_close() {
  let (mut server, addr) = listener();

  let client_thread = thread::spawn(move || {
    let mut client = client_for(&addr);
    client.send_all(b"bye").unwrap();
    // Dropping closes the client's end without sending further data.
  });

  let mut conn = server.accept().unwrap();
  let mut buf = [0u8; 16];

  let mut n = conn.recv(&mut buf).unwrap();
  if n != 0 {
    assert_eq!(&buf[..n], b"bye");
    n = conn.recv(&mut buf).unwrap();
  }
  assert_eq!(n, 0, "orderly close must surface as a zero-length receive");

  // Never a positive count after the close.
  match conn.recv(&mut buf) {
    Ok(m) => assert_eq!(m, 0),
    Err(SockError::ConnectionReset) | Err(SockError::System { .. }) => {}
    Err(other) => panic!("unexpected error after close: {other}"),
  }

  client_thread.join().unwrap();
}

#[test]
fn blocking_recv_observes_the_timeout() {
  let (mut server, addr) = listener();
  let _client = client_for(&addr);
  let mut conn = server.accept().unwrap();

  conn.set_timeout(Duration::from_millis(100)).unwrap();
  let start = Instant::now();
  let mut buf = [0u8; 16];
  let err = conn.recv(&mut buf).unwrap_err();

  assert!(matches!(err, SockError::TimedOut), "got {err}");
  assert!(err.is_transient());
  assert_eq!(conn.last_error(), Some(SockErrorKind::TimedOut));
  assert!(start.elapsed() >= Duration::from_millis(80));
}

#[test]
fn clearing_the_timeout_restores_indefinite_waits() {
  let (mut server, addr) = listener();
  let client_thread = thread::spawn(move || {
    let mut client = client_for(&addr);
    thread::sleep(Duration::from_millis(300));
    client.send_all(b"late").unwrap();
  });

  let mut conn = server.accept().unwrap();
  conn.set_timeout(Duration::from_millis(50)).unwrap();
  let mut buf = [0u8; 16];
  assert!(matches!(conn.recv(&mut buf), Err(SockError::TimedOut)));

  conn.set_timeout(Duration::ZERO).unwrap();
  let n = conn.recv(&mut buf).unwrap();
  assert_eq!(&buf[..n], b"late");

  client_thread.join().unwrap();
}

#[test]
fn nonblocking_recv_reports_would_block() {
  let (mut server, addr) = listener();
  let _client = client_for(&addr);
  let mut conn = server.accept().unwrap();

  conn.set_nonblocking(true).unwrap();
  let mut buf = [0u8; 16];
  let err = conn.recv(&mut buf).unwrap_err();

  assert!(matches!(err, SockError::WouldBlock), "got {err}");
  assert_eq!(conn.last_error(), Some(SockErrorKind::WouldBlock));
}

#[test]
fn nonblocking_accept_reports_would_block() {
  let (mut server, _addr) = listener();
  server.set_nonblocking(true).unwrap();
  let err = server.accept().unwrap_err();
  assert!(matches!(err, SockError::WouldBlock), "got {err}");
}

#[test]
fn accept_reports_the_peer_address() {
  let (mut server, addr) = listener();

  let client_thread = thread::spawn(move || {
    let mut client = client_for(&addr);
    client.local_address().unwrap()
  });

  let mut peer = Address::default();
  let _conn = server.accept_from(&mut peer).unwrap();
  let client_local = client_thread.join().unwrap();

  assert!(!peer.is_unspecified());
  assert_eq!(peer, client_local);
}

#[test]
#[ignore = "relies on platform backlog timing"]
fn backlog_bounds_pending_connections() {
  socklib::init().unwrap();
  let mut server = Socket::open(Family::Inet, Type::Stream).unwrap();
  server.bind(&Address::new("127.0.0.1", 0).unwrap()).unwrap();
  server.listen(1).unwrap();
  let addr = server.local_address().unwrap();

  // The first attempt queues while nobody accepts.
  let mut first = client_for(&addr);

  // A burst beyond the backlog cannot all complete immediately.
  let mut overflow = Socket::open(Family::Inet, Type::Stream).unwrap();
  overflow.set_nonblocking(true).unwrap();
  assert!(overflow.connect(&addr).is_err());

  thread::sleep(Duration::from_millis(200));

  // Once accept runs, the queued attempt goes through.
  let mut conn = server.accept().unwrap();
  conn.send_all(b"ok").unwrap();
  let mut buf = [0u8; 4];
  let n = first.recv(&mut buf).unwrap();
  assert_eq!(&buf[..n], b"ok");
}
