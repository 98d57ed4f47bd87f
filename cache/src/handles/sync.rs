use crate::error::{BoxError, LoadError};
use crate::shared::CacheShared;
use crate::stats::CacheStats;
use crate::view::MapView;
use crate::AsyncCache;

use std::collections::HashMap;
use std::fmt;
use std::hash::{BuildHasher, Hash};
use std::sync::Arc;

#[cfg(feature = "bulk")]
use rayon::iter::{IntoParallelIterator, ParallelIterator};

/// A thread-safe, synchronous cache.
///
/// Lookups that need a load block the calling thread until that load
/// finishes. Concurrent lookups of the same key share one load.
pub struct Cache<K, V, H = ahash::RandomState> {
  pub(crate) shared: Arc<CacheShared<K, V, H>>,
}

impl<K, V, H> Clone for Cache<K, V, H> {
  fn clone(&self) -> Self {
    Self {
      shared: self.shared.clone(),
    }
  }
}

impl<K, V, H> fmt::Debug for Cache<K, V, H> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Cache").field("shared", &self.shared).finish()
  }
}

impl<K, V, H> Cache<K, V, H>
where
  K: Eq + Hash + Clone + Send + Sync + 'static,
  V: Send + Sync + 'static,
  H: BuildHasher + Clone + Send + Sync + 'static,
{
  /// Converts this synchronous `Cache` into an asynchronous `AsyncCache`.
  /// This is a zero-cost conversion.
  pub fn to_async(&self) -> AsyncCache<K, V, H> {
    AsyncCache {
      shared: self.shared.clone(),
    }
  }

  /// Returns the value for `key`, loading it with the configured loader if
  /// it is absent or expired.
  ///
  /// An entry that is due for refresh is returned as is while a background
  /// reload replaces it. Fails with [`LoadError::MissingLoader`] on a miss
  /// if the cache has no loader.
  pub fn get(&self, key: &K) -> Result<Arc<V>, LoadError> {
    self.shared.get_blocking(key)
  }

  /// Returns the value for `key`, computing it with `init` if it is absent.
  ///
  /// `init` runs on the calling thread and only if no other caller is
  /// already loading the key; otherwise this waits for that load.
  pub fn get_with<F>(&self, key: &K, init: F) -> Result<Arc<V>, LoadError>
  where
    F: FnOnce(&K) -> V,
  {
    self.shared.get_with_blocking(key, false, |key| Ok(init(key)))
  }

  /// Like [`get_with`](Self::get_with), for an `init` that can fail.
  ///
  /// The error is handed to every caller waiting on this load and nothing
  /// is cached.
  pub fn try_get_with<F, E>(&self, key: &K, init: F) -> Result<Arc<V>, LoadError>
  where
    F: FnOnce(&K) -> Result<V, E>,
    E: Into<BoxError>,
  {
    self
      .shared
      .get_with_blocking(key, false, |key| init(key).map_err(|e| LoadError::failed(e)))
  }

  /// Returns the value for `key` if a live entry exists. Never loads.
  pub fn get_if_present(&self, key: &K) -> Option<Arc<V>> {
    self.shared.get_if_present(key)
  }

  /// Returns the live values among `keys`. Never loads.
  pub fn get_all_present<'a, I>(&self, keys: I) -> HashMap<K, Arc<V>>
  where
    I: IntoIterator<Item = &'a K>,
  {
    keys
      .into_iter()
      .filter_map(|key| {
        self
          .shared
          .get_if_present(key)
          .map(|value| (key.clone(), value))
      })
      .collect()
  }

  /// Returns the values for all `keys`, loading the missing ones.
  ///
  /// With the `bulk` feature the lookups run in parallel. Every key is
  /// looked up; the first load failure is returned and values that did load
  /// stay cached.
  pub fn get_all<'a, I>(&self, keys: I) -> Result<HashMap<K, Arc<V>>, LoadError>
  where
    I: IntoIterator<Item = &'a K>,
  {
    let keys: Vec<&K> = keys.into_iter().collect();

    #[cfg(feature = "bulk")]
    {
      // Every lookup runs to completion before the first failure is picked.
      let results: Vec<_> = keys
        .into_par_iter()
        .map(|key| self.get(key).map(|value| (key.clone(), value)))
        .collect();
      results.into_iter().collect()
    }

    #[cfg(not(feature = "bulk"))]
    {
      let results: Vec<_> = keys
        .into_iter()
        .map(|key| self.get(key).map(|value| (key.clone(), value)))
        .collect();
      results.into_iter().collect()
    }
  }

  /// Stores `value` under `key`.
  ///
  /// A previous value is reported to the removal listener as `Replaced`. A
  /// load in flight for `key` is detached and its result is not stored.
  /// Eviction owed by earlier writes runs first; eviction for this write is
  /// deferred to the next maintenance pass, so this write may briefly leave
  /// the cache over its bound.
  pub fn put(&self, key: K, value: V) {
    self.shared.put(key, value);
  }

  pub fn put_all<I>(&self, entries: I)
  where
    I: IntoIterator<Item = (K, V)>,
  {
    for (key, value) in entries {
      self.shared.put(key, value);
    }
  }

  /// Removes the entry for `key`, returning `true` if a live entry was found.
  pub fn invalidate(&self, key: &K) -> bool {
    self.shared.invalidate(key)
  }

  pub fn invalidate_keys<'a, I>(&self, keys: I)
  where
    I: IntoIterator<Item = &'a K>,
  {
    for key in keys {
      self.shared.invalidate(key);
    }
  }

  /// Removes all entries from the cache.
  pub fn invalidate_all(&self) {
    self.shared.invalidate_all();
  }

  /// Reloads `key` in the background with the configured loader.
  ///
  /// Readers keep seeing the current value until the reload completes. A
  /// failed reload leaves the current value in place.
  pub fn refresh(&self, key: &K) {
    self.shared.refresh(key);
  }

  /// Returns a live view of the cache's entries.
  pub fn as_map(&self) -> MapView<K, V, H> {
    MapView::new(self.shared.clone())
  }

  pub fn stats(&self) -> CacheStats {
    self.shared.stats.snapshot()
  }

  /// Returns the number of stored entries. This may include entries that
  /// have expired but were not cleaned up yet.
  pub fn estimated_size(&self) -> u64 {
    self.shared.store.len() as u64
  }

  /// Returns the total weight of stored entries, or their count when no
  /// weigher is configured.
  pub fn weighted_size(&self) -> u64 {
    self.shared.weighted_size()
  }

  /// Runs any pending maintenance now: expired entries are removed and the
  /// cache is brought back within its bound.
  pub fn clean_up(&self) {
    self.shared.clean_up();
  }
}
