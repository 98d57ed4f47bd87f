use super::lru_list::LruList;
use super::{AccessClock, CachePolicy, Candidate};

use parking_lot::Mutex;
use std::hash::Hash;

/// An eviction policy that evicts the least recently used entries.
#[derive(Debug)]
pub(crate) struct LruPolicy<K: Eq + Hash + Clone> {
  list: Mutex<LruList<K>>,
}

impl<K: Eq + Hash + Clone> LruPolicy<K> {
  pub(crate) fn new() -> Self {
    Self {
      list: Mutex::new(LruList::new()),
    }
  }
}

impl<K> CachePolicy<K> for LruPolicy<K>
where
  K: Eq + Hash + Clone + Send + Sync,
{
  fn on_access(&self, key: &K, clock: &AccessClock) {
    let mut list = self.list.lock();
    if list.contains(key) {
      list.move_to_front(key, clock.tick());
    }
  }

  fn on_insert(&self, key: &K, weight: u64, clock: &AccessClock) {
    let mut list = self.list.lock();
    list.push_front(key.clone(), weight, clock.tick());
  }

  fn on_update(&self, key: &K, weight: u64) {
    self.list.lock().set_weight(key, weight);
  }

  fn on_remove(&self, key: &K) {
    self.list.lock().remove(key);
  }

  fn peek_victim(&self) -> Option<Candidate<K>> {
    self.list.lock().peek_back()
  }

  fn clear(&self) {
    self.list.lock().clear();
  }
}
