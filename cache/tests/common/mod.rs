#![allow(dead_code)]

use std::hash::{BuildHasher, Hasher};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use steep_cache::RemovalCause;

// A custom hasher that allows us to control which shard a key is assigned to.
// It simply uses the integer value of the key as its hash.
// For a 4-shard cache:
// - key 0 -> shard 0
// - key 1 -> shard 1
// - key 5 -> shard 1 (5 & 3 = 1)
#[derive(Clone, Default)]
pub struct ShardControllingHasher;
impl BuildHasher for ShardControllingHasher {
  type Hasher = TestHasher;
  fn build_hasher(&self) -> Self::Hasher {
    TestHasher(0)
  }
}
pub struct TestHasher(u64);
impl Hasher for TestHasher {
  fn finish(&self) -> u64 {
    self.0
  }
  fn write(&mut self, bytes: &[u8]) {
    for byte in bytes {
      self.0 = self.0.wrapping_mul(31).wrapping_add(u64::from(*byte));
    }
  }
  fn write_i32(&mut self, i: i32) {
    self.0 = i as u64;
  }
}

/// Records every removal notification in order.
///
/// Listeners run synchronously, so a notification is visible as soon as the
/// cache call that caused it returns.
pub struct RemovalLog<K, V> {
  events: Arc<Mutex<Vec<(K, Arc<V>, RemovalCause)>>>,
}

impl<K, V> Clone for RemovalLog<K, V> {
  fn clone(&self) -> Self {
    Self {
      events: self.events.clone(),
    }
  }
}

impl<K, V> RemovalLog<K, V>
where
  K: Clone + Send + 'static,
  V: Send + Sync + 'static,
{
  pub fn new() -> Self {
    Self {
      events: Arc::new(Mutex::new(Vec::new())),
    }
  }

  /// Returns a listener that appends to this log.
  pub fn listener(&self) -> impl Fn(K, Arc<V>, RemovalCause) + Send + Sync + 'static {
    let events = self.events.clone();
    move |key, value, cause| events.lock().unwrap().push((key, value, cause))
  }

  pub fn len(&self) -> usize {
    self.events.lock().unwrap().len()
  }

  /// Drains the recorded notifications.
  pub fn take(&self) -> Vec<(K, Arc<V>, RemovalCause)> {
    std::mem::take(&mut *self.events.lock().unwrap())
  }

  /// Drains the recorded notifications, keeping only keys and causes.
  pub fn take_causes(&self) -> Vec<(K, RemovalCause)> {
    self
      .take()
      .into_iter()
      .map(|(key, _, cause)| (key, cause))
      .collect()
  }
}

/// Polls `condition` until it holds, panicking after `timeout`.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) {
  let deadline = Instant::now() + timeout;
  while !condition() {
    assert!(Instant::now() < deadline, "condition not met within {timeout:?}");
    thread::sleep(Duration::from_millis(5));
  }
}
