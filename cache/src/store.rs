use crate::entry::CacheEntry;
use crate::loader::LoadFuture;
use crate::policy::CachePolicy;

use core::fmt;
use std::collections::HashMap;
use std::hash::{BuildHasher, Hash, Hasher};
use std::sync::Arc;

use crossbeam_utils::CachePadded;
use parking_lot::{Mutex, RwLock};

/// A helper function to hash a key using a `BuildHasher`.
#[inline]
pub(crate) fn hash_key<K: Hash + ?Sized, H: BuildHasher>(hasher: &H, key: &K) -> u64 {
  let mut state = hasher.build_hasher();
  key.hash(&mut state);
  state.finish()
}

/// One independently locked partition of the cache.
///
/// Lock order is `pending`, then `map`, then the policy's internal lock.
pub(crate) struct Shard<K, V, H> {
  /// The live entries of this shard.
  pub(crate) map: RwLock<HashMap<K, Arc<CacheEntry<V>>, H>>,
  /// Loads in flight for keys of this shard, at most one per key.
  pub(crate) pending: Mutex<HashMap<K, Arc<LoadFuture<V>>, H>>,
  /// Recency bookkeeping for the keys in `map`.
  pub(crate) policy: Box<dyn CachePolicy<K>>,
}

/// A cache store that is partitioned into multiple, independently locked shards.
///
/// This design allows for high concurrency by ensuring that operations on
/// different keys are unlikely to contend for the same lock.
pub(crate) struct ShardedStore<K, V, H> {
  shards: Box<[CachePadded<Shard<K, V, H>>]>,
  hasher: H,
}

impl<K, V, H> fmt::Debug for ShardedStore<K, V, H> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ShardedStore")
      .field("num_shards", &self.shards.len())
      .finish()
  }
}

impl<K, V, H> ShardedStore<K, V, H>
where
  K: Eq + Hash,
  H: BuildHasher + Clone,
{
  /// Creates a store with `num_shards` shards, which must be a power of two.
  pub(crate) fn new(
    num_shards: usize,
    shard_capacity: usize,
    hasher: H,
    new_policy: impl Fn() -> Box<dyn CachePolicy<K>>,
  ) -> Self {
    debug_assert!(num_shards.is_power_of_two());
    let mut shards = Vec::with_capacity(num_shards);
    for _ in 0..num_shards {
      shards.push(CachePadded::new(Shard {
        map: RwLock::new(HashMap::with_capacity_and_hasher(shard_capacity, hasher.clone())),
        pending: Mutex::new(HashMap::with_hasher(hasher.clone())),
        policy: new_policy(),
      }));
    }

    Self {
      shards: shards.into_boxed_slice(),
      hasher,
    }
  }

  #[inline]
  pub(crate) fn shard_index(&self, key: &K) -> usize {
    let hash = hash_key(&self.hasher, key);
    hash as usize & (self.shards.len() - 1)
  }

  /// Returns the shard that owns `key`.
  #[inline]
  pub(crate) fn shard(&self, key: &K) -> &Shard<K, V, H> {
    &self.shards[self.shard_index(key)]
  }

  #[inline]
  pub(crate) fn shard_at(&self, index: usize) -> &Shard<K, V, H> {
    &self.shards[index]
  }

  pub(crate) fn num_shards(&self) -> usize {
    self.shards.len()
  }

  /// Returns an iterator over all shards, in index order.
  pub(crate) fn iter_shards(&self) -> impl Iterator<Item = &Shard<K, V, H>> {
    self.shards.iter().map(|padded| &**padded)
  }

  /// Counts the stored entries, including ones that have expired but were
  /// not yet cleaned up.
  pub(crate) fn len(&self) -> usize {
    self.iter_shards().map(|shard| shard.map.read().len()).sum()
  }

  /// Clones every stored `(key, entry)` pair, one shard at a time.
  pub(crate) fn collect_entries(&self) -> Vec<(K, Arc<CacheEntry<V>>)>
  where
    K: Clone,
  {
    let mut entries = Vec::new();
    for shard in self.iter_shards() {
      let guard = shard.map.read();
      entries.extend(guard.iter().map(|(k, e)| (k.clone(), e.clone())));
    }
    entries
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::policy::null::NullPolicy;

  fn store(shards: usize) -> ShardedStore<u64, u64, ahash::RandomState> {
    ShardedStore::new(shards, 0, ahash::RandomState::new(), || Box::new(NullPolicy))
  }

  #[test]
  fn keys_always_map_to_the_same_shard() {
    let store = store(8);
    for key in 0..100u64 {
      let index = store.shard_index(&key);
      assert!(index < 8);
      assert_eq!(index, store.shard_index(&key));
    }
  }

  #[test]
  fn len_and_collect_span_all_shards() {
    let store = store(4);
    for key in 0..20u64 {
      store
        .shard(&key)
        .map
        .write()
        .insert(key, Arc::new(CacheEntry::new(key * 10, 1, 0)));
    }
    assert_eq!(store.len(), 20);

    let mut values: Vec<u64> = store
      .collect_entries()
      .into_iter()
      .map(|(_, entry)| *entry.value())
      .collect();
    values.sort_unstable();
    assert_eq!(values, (0..20).map(|k| k * 10).collect::<Vec<_>>());
  }
}
