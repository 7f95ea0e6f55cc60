//! Platform backends for the portable socket surface.
//!
//! Exactly one backend is compiled in per target, selected here rather
//! than through a runtime vtable. Both backends export the same function
//! set and must produce identical externally observable behavior: the
//! same state machine, the same error classification for analogous
//! native codes, and the same partial-send semantics.
//!
//! The portable types store native handles and addresses as opaque byte
//! blobs; only the active backend interprets them.

#[cfg(posix)]
mod posix;
#[cfg(posix)]
pub(crate) use posix::*;

#[cfg(win32)]
mod win32;
#[cfg(win32)]
pub(crate) use win32::*;

/// Opaque storage for one native socket handle. Large enough for any
/// backend's handle type; each backend const-asserts that.
pub(crate) const HANDLE_BLOB_LEN: usize = 8;
pub(crate) type HandleBlob = [u8; HANDLE_BLOB_LEN];
