//! Opt-in allocation tracking (feature `alloc-trace`).
//!
//! Useful when verifying that a receive loop built on
//! [`recv_into_pool`](crate::Socket::recv_into_pool) really stays off
//! the heap. Tracking is explicit on both ends: the counting allocator
//! must be registered by the binary, and measurements happen inside a
//! named [`AllocScope`] rather than through a silent global hook.
//!
//! ```ignore
//! #[global_allocator]
//! static ALLOC: socklib::trace::CountingAlloc = socklib::trace::CountingAlloc;
//!
//! let scope = socklib::trace::AllocScope::enter("recv loop");
//! // ... run the loop ...
//! assert_eq!(scope.allocations(), 0);
//! ```

use std::alloc::{GlobalAlloc, Layout, System};
use std::sync::atomic::{AtomicU64, Ordering};

static ALLOCS: AtomicU64 = AtomicU64::new(0);
static FREES: AtomicU64 = AtomicU64::new(0);
static BYTES: AtomicU64 = AtomicU64::new(0);

/// Counting wrapper around the system allocator.
pub struct CountingAlloc;

unsafe impl GlobalAlloc for CountingAlloc {
  unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
    ALLOCS.fetch_add(1, Ordering::Relaxed);
    BYTES.fetch_add(layout.size() as u64, Ordering::Relaxed);
    // SAFETY: forwarded unchanged to the system allocator.
    unsafe { System.alloc(layout) }
  }

  unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
    FREES.fetch_add(1, Ordering::Relaxed);
    // SAFETY: ptr came from the matching alloc above.
    unsafe { System.dealloc(ptr, layout) }
  }
}

/// A named tracking window over the process-wide counters.
///
/// Captures the counters on entry; deltas are available while the
/// scope is alive and a summary is logged when it is dropped.
pub struct AllocScope {
  name: &'static str,
  allocs: u64,
  frees: u64,
  bytes: u64,
}

impl AllocScope {
  pub fn enter(name: &'static str) -> Self {
    Self {
      name,
      allocs: ALLOCS.load(Ordering::Relaxed),
      frees: FREES.load(Ordering::Relaxed),
      bytes: BYTES.load(Ordering::Relaxed),
    }
  }

  /// Allocations made since the scope was entered.
  pub fn allocations(&self) -> u64 {
    ALLOCS.load(Ordering::Relaxed) - self.allocs
  }

  /// Bytes requested since the scope was entered.
  pub fn bytes(&self) -> u64 {
    BYTES.load(Ordering::Relaxed) - self.bytes
  }

  /// Allocations not yet released since the scope was entered.
  /// Negative when the scope freed more than it allocated.
  pub fn outstanding(&self) -> i64 {
    let freed = FREES.load(Ordering::Relaxed) - self.frees;
    self.allocations() as i64 - freed as i64
  }
}

impl Drop for AllocScope {
  fn drop(&mut self) {
    tracing::debug!(
      scope = self.name,
      allocations = self.allocations(),
      outstanding = self.outstanding(),
      bytes = self.bytes(),
      "leaving allocation scope"
    );
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn scope_sees_counted_traffic() {
    let scope = AllocScope::enter("test");
    let layout = Layout::from_size_align(64, 8).unwrap();

    // Drive the wrapper directly; registering a global allocator from
    // a test would affect the whole test binary.
    let ptr = unsafe { CountingAlloc.alloc(layout) };
    assert!(!ptr.is_null());
    assert_eq!(scope.allocations(), 1);
    assert_eq!(scope.bytes(), 64);
    assert_eq!(scope.outstanding(), 1);

    unsafe { CountingAlloc.dealloc(ptr, layout) };
    assert_eq!(scope.outstanding(), 0);
  }
}
