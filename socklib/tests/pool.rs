use socklib::Pool;

#[test]
fn grows_to_the_next_power_of_two() {
  let pool = Pool::new();
  let view = pool.get(100);
  assert!(view.buf().capacity() >= 128);
  assert_eq!(pool.slot_count(), 1);
}

#[test]
fn held_slot_is_never_handed_out_twice() {
  let pool = Pool::new();
  let first = pool.get(100);
  let second = pool.get(50);

  // The first slot is locked, so the smaller request gets its own.
  assert_eq!(pool.slot_count(), 2);

  drop(second);
  drop(first);
}

#[test]
fn released_slot_is_reused_instead_of_allocating() {
  let pool = Pool::new();
  let first = pool.get(100);
  drop(first);

  let again = pool.get(64);
  assert_eq!(pool.slot_count(), 1);
  assert!(again.buf().capacity() >= 64);
}

#[test]
fn fresh_views_start_empty() {
  let pool = Pool::new();
  {
    let view = pool.get(32);
    view.buf().extend_from_slice(b"leftovers");
  }
  let view = pool.get(32);
  assert_eq!(view.buf().len(), 0);
}

#[test]
fn cloned_view_keeps_the_slot_held() {
  let pool = Pool::new();
  let view = pool.get(32);
  let alias = view.clone();
  drop(view);

  // Still held through the clone.
  let other = pool.get(32);
  assert_eq!(pool.slot_count(), 2);

  drop(alias);
  drop(other);

  // Everything released; no growth on the next request.
  let reused = pool.get(16);
  assert_eq!(pool.slot_count(), 2);
  drop(reused);
}

#[test]
fn views_are_writable_scratch_space() {
  let pool = Pool::new();
  let view = pool.get(16);
  view.buf().extend_from_slice(b"0123456789");
  assert_eq!(view.buf().as_slice(), b"0123456789");
}

#[test]
fn global_pool_grows_on_demand() {
  socklib::init_pools(&[256]);
  let view = socklib::get_pool(200);
  assert!(view.buf().capacity() >= 200);
}
