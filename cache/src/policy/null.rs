use crate::policy::{AccessClock, CachePolicy, Candidate};

/// The policy used by unbounded caches. It tracks nothing and never offers a victim.
#[derive(Debug, Default)]
pub(crate) struct NullPolicy;

impl<K> CachePolicy<K> for NullPolicy {
  fn on_access(&self, _key: &K, _clock: &AccessClock) {}

  fn on_insert(&self, _key: &K, _weight: u64, _clock: &AccessClock) {}

  fn on_update(&self, _key: &K, _weight: u64) {}

  fn on_remove(&self, _key: &K) {}

  fn peek_victim(&self) -> Option<Candidate<K>> {
    None
  }

  fn clear(&self) {}
}
