//! UDP request with timeout-doubling retries
//!
//! This example demonstrates:
//! - Datagram send/receive with explicit source addresses
//! - Receive timeouts and the [`SockError::TimedOut`] classification
//! - A caller-side retry loop that doubles its wait on every miss
//!
//! Run `cargo run --example udp_retry serve [port]` in one terminal and
//! `cargo run --example udp_retry [port]` in another. Datagrams are
//! unreliable by contract, so the client keeps resending until a reply
//! arrives or the wait grows past five seconds.

use std::env;
use std::time::Duration;

use socklib::{Address, Family, SockError, Socket, Type};

const GIVE_UP: Duration = Duration::from_secs(5);

fn serve(port: u16) -> socklib::Result<()> {
  let mut sock = Socket::open(Family::Inet, Type::Dgram)?;
  sock.bind(&Address::new("0.0.0.0", port)?)?;
  println!("answering on {}", sock.local_address()?);

  let mut buf = [0u8; 1024];
  let mut from = Address::default();
  loop {
    let n = sock.recv_from(&mut buf, &mut from)?;
    println!("{from}: {:?}", String::from_utf8_lossy(&buf[..n]));
    sock.send_to(b"PONG", &from)?;
  }
}

fn query(port: u16) -> socklib::Result<()> {
  let server = Address::new("127.0.0.1", port)?;
  let mut sock = Socket::open(Family::Inet, Type::Dgram)?;

  let mut wait = Duration::from_millis(100);
  loop {
    sock.set_timeout(wait)?;
    sock.send_to(b"PING", &server)?;

    let mut buf = [0u8; 1024];
    let mut from = Address::default();
    match sock.recv_from(&mut buf, &mut from) {
      Ok(n) => {
        println!("{from} says {:?}", String::from_utf8_lossy(&buf[..n]));
        return Ok(());
      }
      Err(SockError::TimedOut) => {
        println!("no reply within {wait:?}, retrying");
        wait *= 2;
        if wait >= GIVE_UP {
          println!("giving up");
          return Ok(());
        }
      }
      Err(err) => return Err(err),
    }
  }
}

fn main() -> socklib::Result<()> {
  tracing_subscriber::fmt().init();
  socklib::init()?;

  let mut args = env::args().skip(1);
  let (serving, port) = match args.next().as_deref() {
    Some("serve") => {
      (true, args.next().and_then(|a| a.parse().ok()).unwrap_or(7778))
    }
    Some(arg) => (false, arg.parse().unwrap_or(7778)),
    None => (false, 7778),
  };

  let result = if serving { serve(port) } else { query(port) };
  socklib::shutdown();
  result
}
