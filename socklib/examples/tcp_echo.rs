//! TCP echo server
//!
//! This example demonstrates:
//! - Binding and listening on a stream socket
//! - Accepting connections and learning the peer address
//! - Receiving into pooled buffers so the loop never allocates
//!
//! Run with `cargo run --example tcp_echo [port]` (default 7778), then
//! connect with e.g. `nc 127.0.0.1 7778`.

use std::env;

use socklib::{Address, Family, Socket, Type};

fn main() -> socklib::Result<()> {
  tracing_subscriber::fmt().init();

  let port = env::args()
    .nth(1)
    .and_then(|arg| arg.parse().ok())
    .unwrap_or(7778u16);

  socklib::init()?;

  let mut server = Socket::open(Family::Inet, Type::Stream)?;
  server.bind(&Address::new("0.0.0.0", port)?)?;
  server.listen(socklib::DEFAULT_BACKLOG)?;
  println!("echoing on {}", server.local_address()?);

  loop {
    let mut peer = Address::default();
    let mut conn = server.accept_from(&mut peer)?;
    println!("connection from {peer}");

    loop {
      let view = match conn.recv_into_pool(4096) {
        Ok(view) => view,
        Err(err) => {
          eprintln!("{peer}: {err}");
          break;
        }
      };
      if view.buf().is_empty() {
        println!("{peer}: closed");
        break;
      }
      conn.send_all(&view.buf())?;
    }
  }
}
