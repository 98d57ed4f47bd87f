use crate::error::{BoxError, LoadError};
use crate::loader::LoadHandle;
use crate::shared::{CacheShared, Lookup};
use crate::stats::CacheStats;
use crate::view::MapView;
use crate::Cache;

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::hash::{BuildHasher, Hash};
use std::sync::Arc;

use futures_util::future;
use futures_util::FutureExt;

/// A thread-safe, asynchronous cache.
///
/// Lookups never block the calling thread. A lookup that needs a load
/// returns a [`LoadHandle`] that resolves once the load, running on the
/// cache's executor, finishes.
pub struct AsyncCache<K, V, H = ahash::RandomState> {
  pub(crate) shared: Arc<CacheShared<K, V, H>>,
}

impl<K, V, H> Clone for AsyncCache<K, V, H> {
  fn clone(&self) -> Self {
    Self {
      shared: self.shared.clone(),
    }
  }
}

impl<K, V, H> fmt::Debug for AsyncCache<K, V, H> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("AsyncCache").field("shared", &self.shared).finish()
  }
}

impl<K, V, H> AsyncCache<K, V, H>
where
  K: Eq + Hash + Clone + Send + Sync + 'static,
  V: Send + Sync + 'static,
  H: BuildHasher + Clone + Send + Sync + 'static,
{
  /// Converts this asynchronous `AsyncCache` into a synchronous `Cache`.
  /// This is a zero-cost conversion.
  pub fn to_sync(&self) -> Cache<K, V, H> {
    Cache {
      shared: self.shared.clone(),
    }
  }

  /// Returns a handle to the value for `key`, starting a load with the
  /// configured loader if it is absent or expired.
  ///
  /// The load starts immediately, not when the handle is first polled.
  /// Stale entries resolve at once while a background reload replaces them.
  pub fn get(&self, key: &K) -> LoadHandle<V> {
    self.shared.get_handle(key)
  }

  /// Returns a handle to the value for `key`, computing it with the future
  /// produced by `init` if it is absent.
  ///
  /// `init` is only called if no other caller is already loading the key.
  pub fn get_with<F, Fut>(&self, key: &K, init: F) -> LoadHandle<V>
  where
    F: FnOnce(K) -> Fut,
    Fut: Future<Output = V> + Send + 'static,
  {
    self.try_get_with(key, move |key| init(key).map(Ok::<V, LoadError>))
  }

  /// Like [`get_with`](Self::get_with), for an `init` whose future can fail.
  pub fn try_get_with<F, Fut, E>(&self, key: &K, init: F) -> LoadHandle<V>
  where
    F: FnOnce(K) -> Fut,
    Fut: Future<Output = Result<V, E>> + Send + 'static,
    E: Into<BoxError>,
  {
    match self.shared.begin(key, false) {
      Lookup::Hit(value) => LoadHandle::ready(Ok(value)),
      Lookup::Join(future) => LoadHandle::waiting(future),
      Lookup::Lead(guard) => {
        let handle = LoadHandle::waiting(guard.future().clone());
        let task = init(key.clone())
          .map(|result| result.map_err(|e| LoadError::failed(e)))
          .boxed();
        self.shared.spawn_future_load(guard, task);
        handle
      }
    }
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
    self.to_sync().get_all_present(keys)
  }

  /// Returns the values for all `keys`, loading the missing ones concurrently.
  ///
  /// Resolves to the first load failure, if any.
  pub async fn get_all<'a, I>(&self, keys: I) -> Result<HashMap<K, Arc<V>>, LoadError>
  where
    I: IntoIterator<Item = &'a K>,
  {
    let pending: Vec<_> = keys
      .into_iter()
      .map(|key| {
        let key = key.clone();
        self.get(&key).map(move |result| result.map(|value| (key, value)))
      })
      .collect();

    future::join_all(pending).await.into_iter().collect()
  }

  /// Stores `value` under `key`. See [`Cache::put`].
  pub fn put(&self, key: K, value: V) {
    self.shared.put(key, value);
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

  pub fn estimated_size(&self) -> u64 {
    self.shared.store.len() as u64
  }

  pub fn weighted_size(&self) -> u64 {
    self.shared.weighted_size()
  }

  /// Runs any pending maintenance now on the calling thread.
  pub fn clean_up(&self) {
    self.shared.clean_up();
  }
}
