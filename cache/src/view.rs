use crate::shared::CacheShared;

use std::collections::HashMap;
use std::fmt;
use std::hash::{BuildHasher, Hash};
use std::sync::Arc;

/// A live, map-like view of a cache.
///
/// Reads through the view neither count towards statistics nor refresh an
/// entry's access time, and never trigger a load. Expired entries are
/// invisible. Writes go straight to the cache and notify the removal
/// listener as usual.
///
/// Bulk accessors take a snapshot one shard at a time, so they are not an
/// atomic picture of a cache under concurrent modification.
pub struct MapView<K, V, H = ahash::RandomState> {
  shared: Arc<CacheShared<K, V, H>>,
}

impl<K, V, H> fmt::Debug for MapView<K, V, H> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("MapView").finish_non_exhaustive()
  }
}

impl<K, V, H> MapView<K, V, H>
where
  K: Eq + Hash + Clone + Send + Sync + 'static,
  V: Send + Sync + 'static,
  H: BuildHasher + Clone + Send + Sync + 'static,
{
  pub(crate) fn new(shared: Arc<CacheShared<K, V, H>>) -> Self {
    Self { shared }
  }

  /// Counts the live entries.
  pub fn len(&self) -> usize {
    let now = self.shared.now();
    self
      .shared
      .store
      .iter_shards()
      .map(|shard| {
        let map = shard.map.read();
        map
          .values()
          .filter(|entry| !self.shared.expiry.is_expired(entry, now))
          .count()
      })
      .sum()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  pub fn contains_key(&self, key: &K) -> bool {
    self.shared.peek(key).is_some()
  }

  pub fn get(&self, key: &K) -> Option<Arc<V>> {
    self.shared.peek(key).map(|entry| entry.value())
  }

  pub fn insert(&self, key: K, value: V) {
    self.shared.put(key, value);
  }

  /// Removes `key`, returning `true` if a live entry was removed.
  pub fn remove(&self, key: &K) -> bool {
    self.shared.invalidate(key)
  }

  pub fn keys(&self) -> Vec<K> {
    self.iter().map(|(key, _)| key).collect()
  }

  pub fn values(&self) -> Vec<Arc<V>> {
    self.iter().map(|(_, value)| value).collect()
  }

  /// Iterates over a snapshot of the live entries.
  pub fn iter(&self) -> std::vec::IntoIter<(K, Arc<V>)> {
    self.shared.live_entries().into_iter()
  }

  pub fn to_hash_map(&self) -> HashMap<K, Arc<V>> {
    self.iter().collect()
  }
}

impl<K, V, H> IntoIterator for &MapView<K, V, H>
where
  K: Eq + Hash + Clone + Send + Sync + 'static,
  V: Send + Sync + 'static,
  H: BuildHasher + Clone + Send + Sync + 'static,
{
  type Item = (K, Arc<V>);
  type IntoIter = std::vec::IntoIter<(K, Arc<V>)>;

  fn into_iter(self) -> Self::IntoIter {
    self.iter()
  }
}
