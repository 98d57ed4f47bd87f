pub mod maintenance_frequency;

use crate::config::CacheConfig;
use crate::error::{BoxError, BuildError, ConfigError, LoadError};
use crate::expiry::ExpiryPolicy;
use crate::handles::{AsyncCache, Cache};
use crate::listener::RemovalListener;
use crate::loader::Loader;
use crate::maintenance::{Janitor, Maintenance};
use crate::notifier::Notifier;
use crate::policy::lru::LruPolicy;
use crate::policy::null::NullPolicy;
use crate::policy::{AccessClock, CachePolicy};
use crate::runtime::{self, TaskSpawner};
use crate::shared::{CacheShared, Weigher};
use crate::stats::StatsCounter;
use crate::store::ShardedStore;
use crate::time::{SystemTicker, Ticker};

use core::fmt;
use std::future::Future;
use std::hash::{BuildHasher, Hash};
use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use parking_lot::Mutex;

const MAX_SHARDS: usize = 1 << 16;
const MAX_MAINTENANCE_FREQUENCY: u32 = 1 << 30;

/// A builder for creating `Cache` and `AsyncCache` instances.
///
/// Every option is fixed once the cache is built.
///
/// ```
/// use std::time::Duration;
/// use steep_cache::CacheBuilder;
///
/// let cache = CacheBuilder::new()
///   .maximum_size(100)
///   .expire_after_access(Duration::from_secs(2))
///   .loader(|key: &String| key.to_uppercase())
///   .build()
///   .unwrap();
///
/// assert_eq!(*cache.get(&"hello".to_string()).unwrap(), "HELLO");
/// ```
pub struct CacheBuilder<K, V, H = ahash::RandomState> {
  maximum_size: Option<u64>,
  maximum_weight: Option<u64>,
  weigher: Option<Arc<Weigher<K, V>>>,
  expire_after_write: Option<Duration>,
  expire_after_access: Option<Duration>,
  refresh_after_write: Option<Duration>,
  listener: Option<Arc<dyn RemovalListener<K, V>>>,
  record_stats: bool,
  loader: Option<Loader<K, V>>,
  spawner: Option<Arc<dyn TaskSpawner>>,
  ticker: Option<Arc<dyn Ticker>>,
  shards: usize,
  initial_capacity: usize,
  maintenance_frequency: u32,
  janitor_tick_interval: Option<Duration>,
  hasher: H,
}

// Manual Debug implementation for CacheBuilder.
impl<K, V, H> fmt::Debug for CacheBuilder<K, V, H> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("CacheBuilder")
      .field("maximum_size", &self.maximum_size)
      .field("maximum_weight", &self.maximum_weight)
      .field("expire_after_write", &self.expire_after_write)
      .field("expire_after_access", &self.expire_after_access)
      .field("refresh_after_write", &self.refresh_after_write)
      .field("record_stats", &self.record_stats)
      .field("loader", &self.loader)
      .field("shards", &self.shards)
      .field("has_weigher", &self.weigher.is_some())
      .field("has_listener", &self.listener.is_some())
      .finish_non_exhaustive()
  }
}

// --- General Configuration Methods ---
// This impl block has no restrictive bounds on K or V.
impl<K, V, H> CacheBuilder<K, V, H> {
  /// Bounds the cache to at most `size` entries.
  ///
  /// Cannot be combined with [`maximum_weight`](Self::maximum_weight).
  pub fn maximum_size(mut self, size: u64) -> Self {
    self.maximum_size = Some(size);
    self
  }

  /// Bounds the total weight of all entries, as measured by the
  /// [`weigher`](Self::weigher).
  pub fn maximum_weight(mut self, weight: u64) -> Self {
    self.maximum_weight = Some(weight);
    self
  }

  /// Sets the function that computes the weight of each entry.
  ///
  /// Weights are computed once, when the entry is written or refreshed.
  pub fn weigher<F>(mut self, weigher: F) -> Self
  where
    F: Fn(&K, &V) -> u32 + Send + Sync + 'static,
  {
    self.weigher = Some(Arc::new(weigher));
    self
  }

  /// Expires entries a fixed duration after they were written or refreshed.
  pub fn expire_after_write(mut self, duration: Duration) -> Self {
    self.expire_after_write = Some(duration);
    self
  }

  /// Expires entries a fixed duration after they were last read or written.
  pub fn expire_after_access(mut self, duration: Duration) -> Self {
    self.expire_after_access = Some(duration);
    self
  }

  /// Makes entries eligible for a background reload once this long has
  /// passed since they were written.
  ///
  /// The stale value keeps being served until the reload completes. This
  /// requires a loader.
  pub fn refresh_after_write(mut self, duration: Duration) -> Self {
    self.refresh_after_write = Some(duration);
    self
  }

  /// Sets the listener that is told about every entry leaving the cache.
  pub fn removal_listener<Listener>(mut self, listener: Listener) -> Self
  where
    Listener: RemovalListener<K, V> + 'static,
  {
    self.listener = Some(Arc::new(listener));
    self
  }

  /// Enables the hit, miss, load and eviction counters behind `stats()`.
  pub fn record_stats(mut self) -> Self {
    self.record_stats = true;
    self
  }

  /// Sets the executor for asynchronous loads and background refreshes.
  ///
  /// Without one, the cache uses the Tokio runtime it is built in, or a
  /// thread per task outside of any runtime.
  pub fn executor(mut self, spawner: Arc<dyn TaskSpawner>) -> Self {
    self.spawner = Some(spawner);
    self
  }

  /// Sets the time source for expiration and refresh. Defaults to [`SystemTicker`].
  pub fn ticker(mut self, ticker: Arc<dyn Ticker>) -> Self {
    self.ticker = Some(ticker);
    self
  }

  /// Sets the number of concurrent shards to use.
  ///
  /// The count is capped at 65536 and rounded up to a power of two. Zero is
  /// rejected by `build()`.
  pub fn shards(mut self, shards: usize) -> Self {
    self.shards = shards;
    self
  }

  /// Pre-sizes the store for `capacity` entries.
  pub fn initial_capacity(mut self, capacity: usize) -> Self {
    self.initial_capacity = capacity;
    self
  }

  /// Sets how often, on average, a write also sweeps its shard for expired
  /// entries. See [`maintenance_frequency`] for presets.
  pub fn maintenance_frequency(mut self, one_in: u32) -> Self {
    self.maintenance_frequency = one_in
      .clamp(1, MAX_MAINTENANCE_FREQUENCY)
      .next_power_of_two();
    self
  }

  /// Starts a background thread that runs a full maintenance pass (expiry
  /// sweep and eviction) every `interval`.
  ///
  /// Without it, the cache only maintains itself on the threads that use it.
  pub fn janitor_tick_interval(mut self, interval: Duration) -> Self {
    self.janitor_tick_interval = Some(interval);
    self
  }

  /// Applies the options of a [`CacheConfig`] on top of this builder.
  pub fn apply_config(mut self, config: &CacheConfig) -> Self {
    if let Some(size) = config.maximum_size {
      self.maximum_size = Some(size);
    }
    if let Some(weight) = config.maximum_weight {
      self.maximum_weight = Some(weight);
    }
    if let Some(d) = config.expire_after_write {
      self.expire_after_write = Some(d);
    }
    if let Some(d) = config.expire_after_access {
      self.expire_after_access = Some(d);
    }
    if let Some(d) = config.refresh_after_write {
      self.refresh_after_write = Some(d);
    }
    if let Some(capacity) = config.initial_capacity {
      self.initial_capacity = capacity;
    }
    if let Some(shards) = config.shards {
      self.shards = shards;
    }
    if let Some(interval) = config.janitor_tick_interval {
      self.janitor_tick_interval = Some(interval);
    }
    self.record_stats |= config.record_stats;
    self
  }
}

// --- Constructors ---
impl<K, V> CacheBuilder<K, V> {
  /// Creates a new `CacheBuilder` with default settings: unbounded, no
  /// expiration, no loader and no statistics.
  pub fn new() -> Self {
    Self::with_hasher(ahash::RandomState::new())
  }

  /// Creates a builder from a [`CacheConfig`].
  pub fn from_config(config: &CacheConfig) -> Self {
    Self::new().apply_config(config)
  }

  /// Creates a builder from a spec string such as
  /// `"maximumSize=100,expireAfterAccess=2s,recordStats"`.
  pub fn from_spec(spec: &str) -> Result<Self, ConfigError> {
    let config: CacheConfig = spec.parse()?;
    Ok(Self::from_config(&config))
  }
}

impl<K, V, H> CacheBuilder<K, V, H> {
  /// Creates a builder whose shards hash keys with `hasher`.
  pub fn with_hasher(hasher: H) -> Self {
    Self {
      maximum_size: None,
      maximum_weight: None,
      weigher: None,
      expire_after_write: None,
      expire_after_access: None,
      refresh_after_write: None,
      listener: None,
      record_stats: false,
      loader: None,
      spawner: None,
      ticker: None,
      shards: (num_cpus::get() * 4).max(1).next_power_of_two(),
      initial_capacity: 0,
      maintenance_frequency: maintenance_frequency::RESPONSIVE,
      janitor_tick_interval: None,
      hasher,
    }
  }
}

impl<K, V> Default for CacheBuilder<K, V> {
  fn default() -> Self {
    Self::new()
  }
}

// --- Loaders and Build Methods ---
// This impl block contains the full set of trait bounds required to actually
// construct the cache.
impl<K, V, H> CacheBuilder<K, V, H>
where
  K: Eq + Hash + Clone + Send + Sync + 'static,
  V: Send + Sync + 'static,
  H: BuildHasher + Clone + Send + Sync + 'static,
{
  /// Sets an infallible synchronous loader, used by `get` on a miss and to
  /// refresh stale entries.
  pub fn loader<F>(mut self, f: F) -> Self
  where
    F: Fn(&K) -> V + Send + Sync + 'static,
  {
    let load = move |key: &K| -> Result<V, LoadError> { Ok(f(key)) };
    self.loader = Some(Loader::Sync(Arc::new(load)));
    self
  }

  /// Sets a fallible synchronous loader. An `Err` reaches every caller
  /// waiting on that load and is never cached.
  pub fn try_loader<F, E>(mut self, f: F) -> Self
  where
    F: Fn(&K) -> Result<V, E> + Send + Sync + 'static,
    E: Into<BoxError>,
  {
    let load = move |key: &K| -> Result<V, LoadError> { f(key).map_err(|e| LoadError::failed(e)) };
    self.loader = Some(Loader::Sync(Arc::new(load)));
    self
  }

  /// Sets an infallible asynchronous loader, run on the configured executor.
  pub fn async_loader<F, Fut>(mut self, f: F) -> Self
  where
    F: Fn(K) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = V> + Send + 'static,
  {
    let load = move |key: K| -> BoxFuture<'static, Result<V, LoadError>> { f(key).map(Ok).boxed() };
    self.loader = Some(Loader::Async(Arc::new(load)));
    self
  }

  /// Sets a fallible asynchronous loader, run on the configured executor.
  pub fn try_async_loader<F, Fut, E>(mut self, f: F) -> Self
  where
    F: Fn(K) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<V, E>> + Send + 'static,
    E: Into<BoxError>,
  {
    let load = move |key: K| -> BoxFuture<'static, Result<V, LoadError>> {
      f(key).map(|result| result.map_err(|e| LoadError::failed(e))).boxed()
    };
    self.loader = Some(Loader::Async(Arc::new(load)));
    self
  }

  /// Builds a synchronous `Cache`.
  pub fn build(self) -> Result<Cache<K, V, H>, BuildError> {
    let shared = self.build_shared_core()?;
    Ok(Cache { shared })
  }

  /// Builds an asynchronous `AsyncCache`.
  pub fn build_async(self) -> Result<AsyncCache<K, V, H>, BuildError> {
    let shared = self.build_shared_core()?;
    Ok(AsyncCache { shared })
  }

  /// Central logic to construct the shared core of the cache.
  fn build_shared_core(self) -> Result<Arc<CacheShared<K, V, H>>, BuildError> {
    self.validate()?;

    let spawner = match self.spawner {
      Some(spawner) => spawner,
      None => runtime::default_spawner(),
    };

    let bound = self.maximum_size.or(self.maximum_weight);
    let shards = self.shards.min(MAX_SHARDS).next_power_of_two();
    let per_shard_capacity = self.initial_capacity.div_ceil(shards);
    let store = ShardedStore::new(shards, per_shard_capacity, self.hasher, || {
      // Unbounded caches never evict, so they skip recency tracking.
      if bound.is_some() {
        Box::new(LruPolicy::new()) as Box<dyn CachePolicy<K>>
      } else {
        Box::new(NullPolicy)
      }
    });

    let shared = Arc::new(CacheShared {
      store,
      expiry: ExpiryPolicy::new(
        self.expire_after_write,
        self.expire_after_access,
        self.refresh_after_write,
      ),
      bound,
      weigher: self.weigher,
      loader: self.loader,
      spawner,
      notifier: self.listener.map(Notifier::new),
      stats: StatsCounter::new(self.record_stats),
      ticker: self.ticker.unwrap_or_else(|| Arc::new(SystemTicker)),
      maintenance: Maintenance::new(self.maintenance_frequency),
      clock: AccessClock::default(),
      total_weight: AtomicU64::new(0),
      janitor: Mutex::new(None),
    });

    if let Some(interval) = self.janitor_tick_interval {
      match Janitor::spawn(Arc::downgrade(&shared), interval) {
        Ok(janitor) => *shared.janitor.lock() = Some(janitor),
        Err(e) => tracing::warn!(error = %e, "failed to start the cache janitor"),
      }
    }

    tracing::debug!(?bound, shards, "cache built");
    Ok(shared)
  }

  /// Validates the builder configuration.
  fn validate(&self) -> Result<(), BuildError> {
    if self.maximum_size.is_some() && self.maximum_weight.is_some() {
      return Err(BuildError::SizeAndWeightBounds);
    }
    if self.weigher.is_some() && self.maximum_weight.is_none() {
      return Err(BuildError::WeigherWithoutMaximumWeight);
    }
    if self.maximum_weight.is_some() && self.weigher.is_none() {
      return Err(BuildError::MaximumWeightWithoutWeigher);
    }
    if self.refresh_after_write.is_some() && self.loader.is_none() {
      return Err(BuildError::RefreshWithoutLoader);
    }
    if self.shards == 0 {
      return Err(BuildError::ZeroShards);
    }
    let needs_runtime = self.loader.as_ref().map_or(false, Loader::is_async);
    if needs_runtime && self.spawner.is_none() && !runtime::runtime_available() {
      return Err(BuildError::SpawnerRequired);
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn builder() -> CacheBuilder<String, String> {
    CacheBuilder::new()
  }

  #[test]
  fn bounds_are_mutually_exclusive() {
    let err = builder()
      .maximum_size(10)
      .maximum_weight(10)
      .weigher(|_, v: &String| v.len() as u32)
      .build()
      .unwrap_err();
    assert_eq!(err, BuildError::SizeAndWeightBounds);
  }

  #[test]
  fn weigher_and_maximum_weight_come_together() {
    let err = builder()
      .weigher(|_, v: &String| v.len() as u32)
      .build()
      .unwrap_err();
    assert_eq!(err, BuildError::WeigherWithoutMaximumWeight);

    let err = builder().maximum_weight(5).build().unwrap_err();
    assert_eq!(err, BuildError::MaximumWeightWithoutWeigher);
  }

  #[test]
  fn refresh_requires_a_loader() {
    let err = builder()
      .refresh_after_write(Duration::from_secs(1))
      .build()
      .unwrap_err();
    assert_eq!(err, BuildError::RefreshWithoutLoader);
  }

  #[test]
  fn zero_shards_is_rejected() {
    assert_eq!(builder().shards(0).build().unwrap_err(), BuildError::ZeroShards);
  }

  #[test]
  fn async_loader_outside_a_runtime_needs_an_executor() {
    let err = builder()
      .async_loader(|key: String| async move { key })
      .build_async()
      .unwrap_err();
    assert_eq!(err, BuildError::SpawnerRequired);

    let built = builder()
      .async_loader(|key: String| async move { key })
      .executor(Arc::new(crate::runtime::ThreadSpawner))
      .build_async();
    assert!(built.is_ok());
  }

  #[test]
  fn shard_count_is_rounded_to_a_power_of_two() {
    let cache = builder().shards(5).build().unwrap();
    assert_eq!(cache.shared.store.num_shards(), 8);
  }

  #[test]
  fn huge_settings_are_clamped() {
    let cache = builder().shards(usize::MAX).build().unwrap();
    assert_eq!(cache.shared.store.num_shards(), MAX_SHARDS);

    let rare = builder().maintenance_frequency(u32::MAX);
    assert_eq!(rare.maintenance_frequency, MAX_MAINTENANCE_FREQUENCY);
    assert_eq!(rare.maintenance_frequency(0).maintenance_frequency, 1);
  }
}
