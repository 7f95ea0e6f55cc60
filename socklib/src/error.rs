//! Portable error taxonomy for socket operations.
//!
//! Every native error code the backends see is translated into a
//! [`SockError`] before it reaches calling code, so callers never branch
//! on platform error numbers. The taxonomy is intentionally small:
//!
//! - configuration errors ([`SockError::InvalidAddress`],
//!   [`SockError::AlreadyCreated`], [`SockError::NotCreated`]) signal
//!   programmer error and are never worth retrying;
//! - transient conditions ([`SockError::TimedOut`],
//!   [`SockError::WouldBlock`]) are expected to be retried or polled;
//! - peer-initiated conditions ([`SockError::ConnectionReset`]; orderly
//!   close is `Ok(0)` from a receive, not an error);
//! - everything else is [`SockError::System`] with the syscall name and
//!   the underlying OS error attached.
//!
//! The layer itself never retries; backoff policy belongs to the caller.

use std::io;

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T, E = SockError> = std::result::Result<T, E>;

/// Error for any socket or address operation.
#[derive(Debug, Error)]
pub enum SockError {
  /// The text did not parse as an IP literal for the supported family.
  #[error("failed to parse IP address '{0}'")]
  InvalidAddress(String),

  /// `create` was called on a socket that already owns a native handle.
  #[error("socket already has an associated system socket")]
  AlreadyCreated,

  /// An operation needing a native handle ran before `create`.
  #[error("socket has not been created")]
  NotCreated,

  /// A blocking receive waited longer than the configured timeout.
  #[error("operation timed out")]
  TimedOut,

  /// The socket is in non-blocking mode and the operation could not
  /// complete immediately.
  #[error("operation would block")]
  WouldBlock,

  /// The peer reset the connection.
  #[error("connection reset by peer")]
  ConnectionReset,

  /// Unclassified native failure, fatal by default.
  #[error("{call}(): {source}")]
  System {
    call: &'static str,
    #[source]
    source: io::Error,
  },
}

/// Coarse classification of the most recent failure, kept by
/// [`Socket::last_error`](crate::Socket::last_error).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SockErrorKind {
  TimedOut,
  WouldBlock,
  ConnectionReset,
  /// Configuration errors and unclassified system errors.
  Other,
}

impl SockError {
  pub fn kind(&self) -> SockErrorKind {
    match self {
      SockError::TimedOut => SockErrorKind::TimedOut,
      SockError::WouldBlock => SockErrorKind::WouldBlock,
      SockError::ConnectionReset => SockErrorKind::ConnectionReset,
      _ => SockErrorKind::Other,
    }
  }

  /// True for conditions a caller is expected to retry.
  pub fn is_transient(&self) -> bool {
    matches!(self, SockError::TimedOut | SockError::WouldBlock)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn kinds_follow_taxonomy() {
    assert_eq!(SockError::TimedOut.kind(), SockErrorKind::TimedOut);
    assert_eq!(SockError::WouldBlock.kind(), SockErrorKind::WouldBlock);
    assert_eq!(
      SockError::ConnectionReset.kind(),
      SockErrorKind::ConnectionReset
    );
    assert_eq!(SockError::AlreadyCreated.kind(), SockErrorKind::Other);
    assert_eq!(
      SockError::System { call: "recv", source: io::Error::other("boom") }
        .kind(),
      SockErrorKind::Other
    );
  }

  #[test]
  fn only_timeouts_and_would_block_are_transient() {
    assert!(SockError::TimedOut.is_transient());
    assert!(SockError::WouldBlock.is_transient());
    assert!(!SockError::ConnectionReset.is_transient());
    assert!(!SockError::AlreadyCreated.is_transient());
  }
}
