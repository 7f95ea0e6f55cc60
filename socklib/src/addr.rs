//! Portable endpoint addresses.

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use crate::error::{Result, SockError};

/// Size of the opaque address blob. Sized above the largest native
/// sockaddr any backend stores in it; each backend const-asserts that.
pub(crate) const ADDR_BLOB_LEN: usize = 32;

const FAMILY_NONE: u8 = 0;
const FAMILY_INET: u8 = 1;

// Blob layout, private to this crate. The backends read these fields to
// build the platform sockaddr; the platform layout never leaks out.
//
//   [0]      family tag
//   [1]      reserved
//   [2..4]   port, network byte order
//   [4..8]   IPv4 octets, network order
const PORT_OFF: usize = 2;
const IP_OFF: usize = 4;

/// A fixed-size, platform-independent network endpoint (IP plus port).
///
/// Constructed by parsing a dotted-decimal IPv4 literal, immutable
/// afterwards, and freely copyable. A [`default`](Address::default)
/// address is zero-valued and is meant as the out-parameter destination
/// for operations that discover a peer, such as
/// [`Socket::recv_from`](crate::Socket::recv_from).
///
/// ```
/// use socklib::Address;
///
/// let addr = Address::new("127.0.0.1", 8080)?;
/// assert_eq!(addr.to_string(), "127.0.0.1:8080");
/// # Ok::<(), socklib::SockError>(())
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct Address {
  data: [u8; ADDR_BLOB_LEN],
}

impl Address {
  /// Parses a dotted-decimal IPv4 literal.
  ///
  /// Fails with [`SockError::InvalidAddress`] if `text` is not a valid
  /// address for the supported family.
  pub fn new(text: &str, port: u16) -> Result<Self> {
    let ip = Ipv4Addr::from_str(text)
      .map_err(|_| SockError::InvalidAddress(text.to_owned()))?;
    Ok(Self::from_parts(ip.octets(), port))
  }

  pub(crate) fn from_parts(octets: [u8; 4], port: u16) -> Self {
    let mut data = [0u8; ADDR_BLOB_LEN];
    data[0] = FAMILY_INET;
    data[PORT_OFF..PORT_OFF + 2].copy_from_slice(&port.to_be_bytes());
    data[IP_OFF..IP_OFF + 4].copy_from_slice(&octets);
    Self { data }
  }

  /// True until the address has been filled in, either by parsing or by
  /// an operation that discovers a peer.
  pub fn is_unspecified(&self) -> bool {
    self.data[0] == FAMILY_NONE
  }

  pub fn ip(&self) -> Ipv4Addr {
    Ipv4Addr::from(self.octets())
  }

  pub fn port(&self) -> u16 {
    u16::from_be_bytes([self.data[PORT_OFF], self.data[PORT_OFF + 1]])
  }

  pub(crate) fn octets(&self) -> [u8; 4] {
    [
      self.data[IP_OFF],
      self.data[IP_OFF + 1],
      self.data[IP_OFF + 2],
      self.data[IP_OFF + 3],
    ]
  }
}

impl fmt::Display for Address {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}:{}", self.ip(), self.port())
  }
}

impl fmt::Debug for Address {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if self.is_unspecified() {
      f.write_str("Address(unspecified)")
    } else {
      write!(f, "Address({self})")
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn blob_stores_network_byte_order() {
    let addr = Address::new("10.1.2.3", 0x1234).unwrap();
    assert_eq!(addr.data[PORT_OFF], 0x12);
    assert_eq!(addr.data[PORT_OFF + 1], 0x34);
    assert_eq!(addr.octets(), [10, 1, 2, 3]);
  }

  #[test]
  fn default_is_unspecified() {
    let addr = Address::default();
    assert!(addr.is_unspecified());
    assert_eq!(addr.port(), 0);
  }

  #[test]
  fn debug_renders_like_display() {
    let addr = Address::new("192.168.0.1", 443).unwrap();
    assert_eq!(format!("{addr:?}"), "Address(192.168.0.1:443)");
  }
}
