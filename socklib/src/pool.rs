//! A fixed set of reusable growable byte buffers.
//!
//! Receiving in a hot loop should not pay a heap allocation per call.
//! [`Pool`] keeps a collection of slots, each a growable byte buffer
//! plus a lock count, and hands out scope-bound [`PoolView`]s over
//! them. A view returns its slot to the pool automatically when the
//! last view over that slot is dropped.
//!
//! Exhaustion is not an error: when no unlocked slot is large enough,
//! the pool appends a new slot sized to the next power of two above the
//! request. That bounds the distinct buffer sizes the pool ever
//! allocates and keeps matching cheap, at the price of some slack
//! capacity.
//!
//! Slot acquisition and release use atomic lock counts and each buffer
//! sits behind its own mutex, so a pool may be shared across threads;
//! the worst effect of contention is growth, never blocking on a slot.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, LazyLock, Mutex, MutexGuard, PoisonError};

struct PoolSlot {
  index: usize,
  /// 0 = free, otherwise the number of live views over this slot.
  locks: AtomicU32,
  buf: Mutex<Vec<u8>>,
}

/// A pool of reusable byte buffers.
///
/// Most callers use the process-wide pool through [`get_pool`]; owning
/// a `Pool` directly is mainly useful for tests and for isolating a
/// subsystem's buffers.
pub struct Pool {
  slots: Mutex<Vec<Arc<PoolSlot>>>,
}

impl Pool {
  pub fn new() -> Self {
    Self { slots: Mutex::new(Vec::new()) }
  }

  /// Pre-populates the pool with one unlocked slot per requested
  /// capacity.
  pub fn with_sizes(sizes: &[usize]) -> Self {
    let pool = Self::new();
    for &size in sizes {
      pool.add_slot(size);
    }
    pool
  }

  /// Returns a view over an unlocked slot with capacity of at least
  /// `min_size`, growing the pool if no existing slot qualifies.
  ///
  /// A reused slot is cleared before it is handed out; its capacity is
  /// retained.
  pub fn get(&self, min_size: usize) -> PoolView {
    let mut slots = lock(&self.slots);

    for slot in slots.iter() {
      // Winning the 0 -> 1 race means no live view exists, so the
      // buffer mutex below is uncontended.
      if slot
        .locks
        .compare_exchange(0, 1, Ordering::AcqRel, Ordering::Acquire)
        .is_ok()
      {
        let mut buf = lock(&slot.buf);
        if buf.capacity() >= min_size {
          buf.clear();
          drop(buf);
          return PoolView { slot: Arc::clone(slot), name: "" };
        }
        drop(buf);
        slot.locks.store(0, Ordering::Release);
      }
    }

    let capacity = min_size.next_power_of_two();
    tracing::debug!(
      requested = min_size,
      capacity,
      slots = slots.len() + 1,
      "pool exhausted, adding slot"
    );
    let slot = Arc::new(PoolSlot {
      index: slots.len(),
      locks: AtomicU32::new(1),
      buf: Mutex::new(Vec::with_capacity(capacity)),
    });
    slots.push(Arc::clone(&slot));
    PoolView { slot, name: "" }
  }

  /// Appends an unlocked slot with the given capacity.
  pub fn add_slot(&self, capacity: usize) {
    let mut slots = lock(&self.slots);
    let index = slots.len();
    slots.push(Arc::new(PoolSlot {
      index,
      locks: AtomicU32::new(0),
      buf: Mutex::new(Vec::with_capacity(capacity)),
    }));
  }

  /// Number of slots currently in the pool, locked or not.
  pub fn slot_count(&self) -> usize {
    lock(&self.slots).len()
  }
}

impl Default for Pool {
  fn default() -> Self {
    Self::new()
  }
}

// A panicked holder must not disable a pool slot for the rest of the
// process.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
  mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A scope-bound, exclusive-while-alive borrow of one pool slot.
///
/// The view does not own the buffer memory; the pool does. Cloning a
/// view re-acquires the same slot, so the slot only becomes reusable
/// once every outstanding view over it has been dropped.
pub struct PoolView {
  slot: Arc<PoolSlot>,
  name: &'static str,
}

impl PoolView {
  /// Attaches a diagnostic name, reported when the view is released.
  pub fn named(mut self, name: &'static str) -> Self {
    self.name = name;
    self
  }

  pub fn name(&self) -> &'static str {
    self.name
  }

  /// The slot's buffer. The guard must be dropped before the view is.
  pub fn buf(&self) -> MutexGuard<'_, Vec<u8>> {
    lock(&self.slot.buf)
  }
}

impl Clone for PoolView {
  fn clone(&self) -> Self {
    self.slot.locks.fetch_add(1, Ordering::AcqRel);
    Self { slot: Arc::clone(&self.slot), name: self.name }
  }
}

impl Drop for PoolView {
  fn drop(&mut self) {
    let previous = self.slot.locks.fetch_sub(1, Ordering::AcqRel);
    debug_assert!(previous > 0, "pool slot released more times than acquired");
    if self.name.is_empty() {
      tracing::trace!(slot = self.slot.index, "relinquishing pool slot");
    } else {
      tracing::trace!(
        slot = self.slot.index,
        name = self.name,
        "relinquishing pool slot"
      );
    }
  }
}

static POOL: LazyLock<Pool> = LazyLock::new(Pool::new);

/// Borrows a buffer of at least `min_size` capacity from the
/// process-wide pool. See [`Pool::get`].
pub fn get_pool(min_size: usize) -> PoolView {
  POOL.get(min_size)
}

/// Pre-populates the process-wide pool, one slot per requested
/// capacity.
pub fn init_pools(sizes: &[usize]) {
  for &size in sizes {
    POOL.add_slot(size);
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn lock_count_tracks_views() {
    let pool = Pool::new();
    let view = pool.get(8);
    assert_eq!(view.slot.locks.load(Ordering::Acquire), 1);

    let alias = view.clone();
    assert_eq!(alias.slot.locks.load(Ordering::Acquire), 2);

    drop(view);
    assert_eq!(alias.slot.locks.load(Ordering::Acquire), 1);

    let slot = Arc::clone(&alias.slot);
    drop(alias);
    assert_eq!(slot.locks.load(Ordering::Acquire), 0);
  }

  #[test]
  fn new_slots_are_powers_of_two() {
    let pool = Pool::new();
    let view = pool.get(100);
    assert_eq!(view.buf().capacity(), 128);
  }

  #[test]
  fn preseeded_slot_capacities_are_kept_verbatim() {
    let pool = Pool::with_sizes(&[100]);
    let view = pool.get(64);
    assert_eq!(view.buf().capacity(), 100);
    assert_eq!(pool.slot_count(), 1);
  }

  #[test]
  fn reused_slots_are_cleared() {
    let pool = Pool::new();
    {
      let first = pool.get(16);
      first.buf().extend_from_slice(b"stale data");
    }
    let second = pool.get(16);
    assert!(second.buf().is_empty());
    assert!(second.buf().capacity() >= 16);
  }

  #[test]
  fn named_views_keep_their_name() {
    let pool = Pool::new();
    let view = pool.get(8).named("demo");
    assert_eq!(view.name(), "demo");
    let alias = view.clone();
    assert_eq!(alias.name(), "demo");
  }
}
