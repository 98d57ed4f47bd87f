use crate::entry::CacheEntry;
use crate::error::LoadError;
use crate::expiry::ExpiryPolicy;
use crate::listener::RemovalCause;
use crate::loader::{LoadFuture, LoadHandle, LoadResult, Loader};
use crate::maintenance::{Janitor, Maintenance};
use crate::notifier::{Notification, Notifier};
use crate::policy::AccessClock;
use crate::runtime::TaskSpawner;
use crate::stats::StatsCounter;
use crate::store::{Shard, ShardedStore};
use crate::time::Ticker;

use std::collections::HashMap;
use std::fmt;
use std::hash::{BuildHasher, Hash};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use parking_lot::Mutex;

/// Computes the weight of an entry.
pub(crate) type Weigher<K, V> = dyn Fn(&K, &V) -> u32 + Send + Sync;

type EntryMap<K, V, H> = HashMap<K, Arc<CacheEntry<V>>, H>;

/// How a lookup that may load was resolved.
pub(crate) enum Lookup<K, V, H>
where
  K: Eq + Hash + Clone + Send + Sync + 'static,
  V: Send + Sync + 'static,
  H: BuildHasher + Clone + Send + Sync + 'static,
{
  /// A live entry was found.
  Hit(Arc<V>),
  /// Another caller is loading the key.
  Join(Arc<LoadFuture<V>>),
  /// This caller must run the load and report through the guard.
  Lead(LoadGuard<K, V, H>),
}

enum Claim<V> {
  Present(Arc<CacheEntry<V>>),
  Joined(Arc<LoadFuture<V>>),
  Leader(Arc<LoadFuture<V>>),
}

/// The internal, thread-safe core of the cache.
pub(crate) struct CacheShared<K, V, H> {
  pub(crate) store: ShardedStore<K, V, H>,
  pub(crate) expiry: ExpiryPolicy,
  /// The size or weight bound. Without a weigher every entry weighs 1.
  pub(crate) bound: Option<u64>,
  pub(crate) weigher: Option<Arc<Weigher<K, V>>>,
  pub(crate) loader: Option<Loader<K, V>>,
  pub(crate) spawner: Arc<dyn TaskSpawner>,
  pub(crate) notifier: Option<Notifier<K, V>>,
  pub(crate) stats: StatsCounter,
  pub(crate) ticker: Arc<dyn Ticker>,
  pub(crate) maintenance: Maintenance<K>,
  pub(crate) clock: AccessClock,
  pub(crate) total_weight: AtomicU64,
  pub(crate) janitor: Mutex<Option<Janitor>>,
}

impl<K, V, H> fmt::Debug for CacheShared<K, V, H> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("CacheShared")
      .field("bound", &self.bound)
      .field("expiry", &self.expiry)
      .field("loader", &self.loader)
      .field("weighted_size", &self.total_weight.load(Ordering::Relaxed))
      .field("stats", &self.stats.snapshot())
      .finish_non_exhaustive()
  }
}

impl<K, V, H> Drop for CacheShared<K, V, H> {
  fn drop(&mut self) {
    if let Some(janitor) = self.janitor.get_mut().take() {
      janitor.stop();
    }
  }
}

impl<K, V, H> CacheShared<K, V, H>
where
  K: Eq + Hash + Clone + Send + Sync + 'static,
  V: Send + Sync + 'static,
  H: BuildHasher + Clone + Send + Sync + 'static,
{
  #[inline]
  pub(crate) fn now(&self) -> u64 {
    self.ticker.read()
  }

  #[inline]
  fn weigh(&self, key: &K, value: &V) -> u32 {
    self.weigher.as_ref().map_or(1, |weigher| weigher(key, value))
  }

  pub(crate) fn weighted_size(&self) -> u64 {
    self.total_weight.load(Ordering::Acquire)
  }

  /// Returns the live entry for `key` and records the access.
  ///
  /// An expired entry found here is removed with cause `Expired`.
  pub(crate) fn lookup(&self, key: &K) -> Option<Arc<CacheEntry<V>>> {
    let now = self.now();
    let shard = self.store.shard(key);
    let stale = {
      let map = shard.map.read();
      let entry = map.get(key)?;
      if !self.expiry.is_expired(entry, now) {
        entry.touch(now);
        shard.policy.on_access(key, &self.clock);
        return Some(entry.clone());
      }
      entry.clone()
    };
    self.remove_expired(key, &stale, now);
    None
  }

  /// Returns the live entry for `key` without touching it.
  pub(crate) fn peek(&self, key: &K) -> Option<Arc<CacheEntry<V>>> {
    let now = self.now();
    let map = self.store.shard(key).map.read();
    map
      .get(key)
      .filter(|entry| !self.expiry.is_expired(entry, now))
      .cloned()
  }

  /// A lookup that never loads. Only a hit is counted, since misses are
  /// calls that ran the loader.
  pub(crate) fn get_if_present(&self, key: &K) -> Option<Arc<V>> {
    let entry = self.lookup(key)?;
    self.stats.record_hits(1);
    Some(entry.value())
  }

  fn remove_expired(&self, key: &K, stale: &Arc<CacheEntry<V>>, now: u64) {
    let shard = self.store.shard(key);
    let removed = {
      let mut map = shard.map.write();
      let same = map.get(key).map_or(false, |current| Arc::ptr_eq(current, stale));
      if same {
        self.unlink_locked(shard, &mut map, key)
      } else {
        None
      }
    };
    if let Some(entry) = removed {
      let mut notifications = Vec::new();
      self.retire(key.clone(), &entry, RemovalCause::Expired, now, &mut notifications);
      self.dispatch(notifications);
    }
  }

  /// Resolves a lookup that may load, updating hit and miss counters.
  ///
  /// With `refresh` set, a hit on an entry that is due for refresh starts a
  /// background reload with the configured loader.
  pub(crate) fn begin(self: &Arc<Self>, key: &K, refresh: bool) -> Lookup<K, V, H> {
    let claim = match self.lookup(key) {
      Some(entry) => Claim::Present(entry),
      None => self.claim(key),
    };
    match claim {
      Claim::Present(entry) => {
        self.stats.record_hits(1);
        if refresh {
          self.maybe_refresh(key, &entry);
        }
        Lookup::Hit(entry.value())
      }
      Claim::Joined(future) => {
        self.stats.record_hits(1);
        Lookup::Join(future)
      }
      Claim::Leader(future) => {
        self.stats.record_misses(1);
        Lookup::Lead(LoadGuard::new(self.clone(), key.clone(), future))
      }
    }
  }

  /// Joins the load in flight for `key`, or registers a new one.
  fn claim(&self, key: &K) -> Claim<V> {
    let shard = self.store.shard(key);
    let mut pending = shard.pending.lock();
    if let Some(future) = pending.get(key) {
      return Claim::Joined(future.clone());
    }
    {
      // A load may have completed since the caller's lookup.
      let map = shard.map.read();
      if let Some(entry) = map.get(key) {
        let now = self.now();
        if !self.expiry.is_expired(entry, now) {
          entry.touch(now);
          shard.policy.on_access(key, &self.clock);
          return Claim::Present(entry.clone());
        }
      }
    }
    let future = Arc::new(LoadFuture::new());
    pending.insert(key.clone(), future.clone());
    Claim::Leader(future)
  }

  /// Loads `key` on the calling thread with `init` unless it is present or
  /// already being loaded, in which case this blocks for that load instead.
  pub(crate) fn get_with_blocking<F>(self: &Arc<Self>, key: &K, refresh: bool, init: F) -> LoadResult<V>
  where
    F: FnOnce(&K) -> Result<V, LoadError>,
  {
    match self.begin(key, refresh) {
      Lookup::Hit(value) => Ok(value),
      Lookup::Join(future) => future.wait(),
      Lookup::Lead(guard) => {
        let result = panic::catch_unwind(AssertUnwindSafe(|| init(key)))
          .unwrap_or_else(|payload| Err(LoadError::from_panic(payload)));
        guard.finish(result)
      }
    }
  }

  /// The blocking lookup behind `Cache::get`.
  pub(crate) fn get_blocking(self: &Arc<Self>, key: &K) -> LoadResult<V> {
    match &self.loader {
      None => self.get_if_present(key).ok_or(LoadError::MissingLoader),
      Some(Loader::Sync(load)) => {
        let load = load.clone();
        self.get_with_blocking(key, true, |key| load(key))
      }
      Some(Loader::Async(load)) => match self.begin(key, true) {
        Lookup::Hit(value) => Ok(value),
        Lookup::Join(future) => future.wait(),
        Lookup::Lead(guard) => {
          let future = guard.future().clone();
          let task = load(key.clone());
          self.spawn_future_load(guard, task);
          future.wait()
        }
      },
    }
  }

  /// The non-blocking lookup behind `AsyncCache::get`.
  pub(crate) fn get_handle(self: &Arc<Self>, key: &K) -> LoadHandle<V> {
    let Some(loader) = self.loader.clone() else {
      let result = self.get_if_present(key).ok_or(LoadError::MissingLoader);
      return LoadHandle::ready(result);
    };
    match self.begin(key, true) {
      Lookup::Hit(value) => LoadHandle::ready(Ok(value)),
      Lookup::Join(future) => LoadHandle::waiting(future),
      Lookup::Lead(guard) => {
        let handle = LoadHandle::waiting(guard.future().clone());
        self.spawn_load(guard, loader);
        handle
      }
    }
  }

  /// Hands the load led by `guard` to the executor.
  pub(crate) fn spawn_load(&self, guard: LoadGuard<K, V, H>, loader: Loader<K, V>) {
    match loader {
      Loader::Sync(load) => self.spawner.spawn_blocking(Box::new(move || {
        let result = panic::catch_unwind(AssertUnwindSafe(|| load(guard.key())))
          .unwrap_or_else(|payload| Err(LoadError::from_panic(payload)));
        guard.finish(result);
      })),
      Loader::Async(load) => {
        let task = load(guard.key().clone());
        self.spawn_future_load(guard, task);
      }
    }
  }

  pub(crate) fn spawn_future_load(
    &self,
    guard: LoadGuard<K, V, H>,
    task: BoxFuture<'static, Result<V, LoadError>>,
  ) {
    self.spawner.spawn(Box::pin(async move {
      let result = AssertUnwindSafe(task)
        .catch_unwind()
        .await
        .unwrap_or_else(|payload| Err(LoadError::from_panic(payload)));
      guard.finish(result);
    }));
  }

  /// Publishes the outcome of a load to the store and to every waiter.
  ///
  /// A load that was detached by `put` or `invalidate` still reaches its
  /// waiters but is never stored.
  pub(crate) fn complete_load(
    &self,
    key: &K,
    future: &Arc<LoadFuture<V>>,
    result: Result<V, LoadError>,
    elapsed: Duration,
  ) -> LoadResult<V> {
    let shard = self.store.shard(key);
    let mut notifications = Vec::new();
    let outcome = match result {
      Ok(value) => {
        self.stats.record_load_success(elapsed);
        let now = self.now();
        let weight = self.weigh(key, &value);
        let entry = Arc::new(CacheEntry::new(value, weight, now));
        let value = entry.value();

        let mut pending = shard.pending.lock();
        if owns_pending(&pending, key, future) {
          pending.remove(key);
          let mut map = shard.map.write();
          self.insert_locked(shard, &mut map, key.clone(), entry, now, &mut notifications);
        } else {
          tracing::trace!("discarding the result of a detached load");
        }
        tracing::trace!(?elapsed, weight, "load completed");
        Ok(value)
      }
      Err(error) => {
        self.stats.record_load_failure(elapsed);
        let mut pending = shard.pending.lock();
        if owns_pending(&pending, key, future) {
          pending.remove(key);
        }
        tracing::trace!(?elapsed, %error, "load failed");
        Err(error)
      }
    };

    future.complete(outcome.clone());
    self.dispatch(notifications);
    self.maintain();
    outcome
  }

  /// Starts a background reload if `entry` is due for one and nobody else
  /// is already refreshing it.
  fn maybe_refresh(self: &Arc<Self>, key: &K, entry: &Arc<CacheEntry<V>>) {
    if !self.expiry.needs_refresh(entry, self.now()) || !entry.try_begin_refresh() {
      return;
    }
    match self.loader.clone() {
      Some(loader) => self.spawn_refresh(key.clone(), entry.clone(), loader),
      None => entry.end_refresh(),
    }
  }

  /// Reloads `key` in the background.
  ///
  /// A present entry keeps being served until the new value replaces it. An
  /// absent key is loaded as if by a lookup, without counting a hit or a miss.
  pub(crate) fn refresh(self: &Arc<Self>, key: &K) {
    let Some(loader) = self.loader.clone() else {
      tracing::debug!("refresh requested on a cache without a loader");
      return;
    };
    if let Some(entry) = self.peek(key) {
      if entry.try_begin_refresh() {
        self.spawn_refresh(key.clone(), entry, loader);
      }
      return;
    }
    if let Claim::Leader(future) = self.claim(key) {
      let guard = LoadGuard::new(self.clone(), key.clone(), future);
      self.spawn_load(guard, loader);
    }
  }

  fn spawn_refresh(self: &Arc<Self>, key: K, entry: Arc<CacheEntry<V>>, loader: Loader<K, V>) {
    tracing::trace!("refreshing a stale entry");
    let shared = self.clone();
    match loader {
      Loader::Sync(load) => self.spawner.spawn_blocking(Box::new(move || {
        let started = Instant::now();
        let result = panic::catch_unwind(AssertUnwindSafe(|| load(&key)))
          .unwrap_or_else(|payload| Err(LoadError::from_panic(payload)));
        shared.complete_refresh(key, &entry, result, started.elapsed());
      })),
      Loader::Async(load) => {
        let started = Instant::now();
        let task = load(key.clone());
        self.spawner.spawn(Box::pin(async move {
          let result = AssertUnwindSafe(task)
            .catch_unwind()
            .await
            .unwrap_or_else(|payload| Err(LoadError::from_panic(payload)));
          shared.complete_refresh(key, &entry, result, started.elapsed());
        }));
      }
    }
  }

  /// Installs a refreshed value, unless the entry was replaced or removed
  /// while the refresh ran. Failures keep the current value.
  pub(crate) fn complete_refresh(
    &self,
    key: K,
    entry: &Arc<CacheEntry<V>>,
    result: Result<V, LoadError>,
    elapsed: Duration,
  ) {
    match result {
      Ok(value) => {
        self.stats.record_load_success(elapsed);
        let now = self.now();
        let weight = self.weigh(&key, &value);
        let refreshed = Arc::new(entry.refreshed(value, weight, now));
        let shard = self.store.shard(&key);
        let mut notifications = Vec::new();
        {
          let mut map = shard.map.write();
          let same = map.get(&key).map_or(false, |current| Arc::ptr_eq(current, entry));
          if same {
            // A refresh is not a use, so the key keeps its recency rank.
            shard.policy.on_update(&key, u64::from(refreshed.weight()));
            self.store_locked(&mut map, key, refreshed, now, &mut notifications);
          } else {
            tracing::trace!("discarding the refresh of a replaced entry");
          }
        }
        self.dispatch(notifications);
        self.maintain();
      }
      Err(error) => {
        self.stats.record_load_failure(elapsed);
        entry.end_refresh();
        tracing::warn!(%error, "refresh failed, keeping the current value");
      }
    }
  }

  /// Stores `value` under `key`, replacing and detaching whatever was there.
  ///
  /// The pass owed by earlier writes runs first; eviction for this write is
  /// deferred to the next one.
  pub(crate) fn put(&self, key: K, value: V) {
    self.maintain_if_requested();
    let now = self.now();
    let weight = self.weigh(&key, &value);
    let entry = Arc::new(CacheEntry::new(value, weight, now));
    let shard_index = self.store.shard_index(&key);
    let shard = self.store.shard_at(shard_index);
    let mut notifications = Vec::new();
    {
      let mut pending = shard.pending.lock();
      if pending.remove(&key).is_some() {
        tracing::trace!("put detached an in-flight load");
      }
      let mut map = shard.map.write();
      drop(pending);
      self.insert_locked(shard, &mut map, key, entry, now, &mut notifications);
    }
    if self.expiry.expires() && self.maintenance.should_sweep() {
      self.sweep_shard(shard_index, now, &mut notifications);
    }
    self.dispatch(notifications);
  }

  /// Removes `key` and detaches any load in flight for it.
  ///
  /// Returns true if a live entry was removed.
  pub(crate) fn invalidate(&self, key: &K) -> bool {
    let now = self.now();
    let shard = self.store.shard(key);
    let removed = {
      let mut pending = shard.pending.lock();
      pending.remove(key);
      let mut map = shard.map.write();
      drop(pending);
      self.unlink_locked(shard, &mut map, key)
    };
    match removed {
      Some(entry) => {
        let live = !self.expiry.is_expired(&entry, now);
        let mut notifications = Vec::new();
        self.retire(key.clone(), &entry, RemovalCause::Explicit, now, &mut notifications);
        self.dispatch(notifications);
        live
      }
      None => false,
    }
  }

  pub(crate) fn invalidate_all(&self) {
    let now = self.now();
    for shard in self.store.iter_shards() {
      let mut notifications = Vec::new();
      {
        let mut pending = shard.pending.lock();
        pending.clear();
        let mut map = shard.map.write();
        drop(pending);
        shard.policy.clear();
        for (key, entry) in map.drain() {
          self
            .total_weight
            .fetch_sub(u64::from(entry.weight()), Ordering::AcqRel);
          self.retire(key, &entry, RemovalCause::Explicit, now, &mut notifications);
        }
      }
      self.dispatch(notifications);
    }
    self.maintenance.clear_oversized();
  }

  /// Clones every live `(key, value)` pair without recording access.
  pub(crate) fn live_entries(&self) -> Vec<(K, Arc<V>)> {
    let now = self.now();
    self
      .store
      .collect_entries()
      .into_iter()
      .filter(|(_, entry)| !self.expiry.is_expired(entry, now))
      .map(|(key, entry)| (key, entry.value()))
      .collect()
  }

  /// Inserts `entry` while the caller holds the shard's map lock.
  pub(crate) fn insert_locked(
    &self,
    shard: &Shard<K, V, H>,
    map: &mut EntryMap<K, V, H>,
    key: K,
    entry: Arc<CacheEntry<V>>,
    now: u64,
    notifications: &mut Vec<Notification<K, V>>,
  ) {
    shard.policy.on_insert(&key, u64::from(entry.weight()), &self.clock);
    self.store_locked(map, key, entry, now, notifications);
  }

  /// Puts `entry` into a locked map once the policy has been told about it.
  fn store_locked(
    &self,
    map: &mut EntryMap<K, V, H>,
    key: K,
    entry: Arc<CacheEntry<V>>,
    now: u64,
    notifications: &mut Vec<Notification<K, V>>,
  ) {
    let weight = u64::from(entry.weight());
    self.total_weight.fetch_add(weight, Ordering::AcqRel);
    let oversized = self.is_oversized(weight);
    if let Some(old) = map.insert(key.clone(), entry) {
      self
        .total_weight
        .fetch_sub(u64::from(old.weight()), Ordering::AcqRel);
      if self.is_oversized(u64::from(old.weight())) {
        self.maintenance.forget_oversized(&key);
      }
      self.retire(key.clone(), &old, RemovalCause::Replaced, now, notifications);
    }
    if oversized {
      self.maintenance.track_oversized(key);
    }
    self.maintenance.request();
  }

  /// Whether an entry of `weight` alone exceeds the bound.
  fn is_oversized(&self, weight: u64) -> bool {
    self.bound.map_or(false, |bound| weight > bound)
  }

  /// Removes `key` from a locked shard and releases its weight.
  pub(crate) fn unlink_locked(
    &self,
    shard: &Shard<K, V, H>,
    map: &mut EntryMap<K, V, H>,
    key: &K,
  ) -> Option<Arc<CacheEntry<V>>> {
    let entry = map.remove(key)?;
    shard.policy.on_remove(key);
    let weight = u64::from(entry.weight());
    self.total_weight.fetch_sub(weight, Ordering::AcqRel);
    if self.is_oversized(weight) {
      self.maintenance.forget_oversized(key);
    }
    Some(entry)
  }

  /// Accounts for an entry that left the store and queues its notification.
  ///
  /// An entry that had already expired is reported as `Expired` whatever
  /// removed it.
  pub(crate) fn retire(
    &self,
    key: K,
    entry: &CacheEntry<V>,
    cause: RemovalCause,
    now: u64,
    notifications: &mut Vec<Notification<K, V>>,
  ) {
    let cause = if self.expiry.is_expired(entry, now) {
      RemovalCause::Expired
    } else {
      cause
    };
    if cause.was_evicted() {
      self.stats.record_eviction(u64::from(entry.weight()));
    }
    if self.notifier.is_some() {
      notifications.push((key, entry.value(), cause));
    }
  }

  /// Delivers queued notifications. Callers must not hold any cache lock.
  pub(crate) fn dispatch(&self, notifications: Vec<Notification<K, V>>) {
    if let Some(notifier) = &self.notifier {
      notifier.notify_all(notifications);
    }
  }
}

fn owns_pending<K, V, H>(
  pending: &HashMap<K, Arc<LoadFuture<V>>, H>,
  key: &K,
  future: &Arc<LoadFuture<V>>,
) -> bool
where
  K: Eq + Hash,
  H: BuildHasher,
{
  pending
    .get(key)
    .map_or(false, |current| Arc::ptr_eq(current, future))
}

/// Owns the duty of completing one pending load.
///
/// Dropping the guard without calling [`finish`](Self::finish), for example
/// when the task running the loader is cancelled, fails every waiter with
/// `LoadError::Abandoned` and frees the key for a new load.
pub(crate) struct LoadGuard<K, V, H>
where
  K: Eq + Hash + Clone + Send + Sync + 'static,
  V: Send + Sync + 'static,
  H: BuildHasher + Clone + Send + Sync + 'static,
{
  shared: Arc<CacheShared<K, V, H>>,
  key: K,
  future: Arc<LoadFuture<V>>,
  started: Instant,
  finished: bool,
}

impl<K, V, H> LoadGuard<K, V, H>
where
  K: Eq + Hash + Clone + Send + Sync + 'static,
  V: Send + Sync + 'static,
  H: BuildHasher + Clone + Send + Sync + 'static,
{
  fn new(shared: Arc<CacheShared<K, V, H>>, key: K, future: Arc<LoadFuture<V>>) -> Self {
    Self {
      shared,
      key,
      future,
      started: Instant::now(),
      finished: false,
    }
  }

  pub(crate) fn key(&self) -> &K {
    &self.key
  }

  pub(crate) fn future(&self) -> &Arc<LoadFuture<V>> {
    &self.future
  }

  pub(crate) fn finish(mut self, result: Result<V, LoadError>) -> LoadResult<V> {
    self.finished = true;
    self
      .shared
      .complete_load(&self.key, &self.future, result, self.started.elapsed())
  }
}

impl<K, V, H> Drop for LoadGuard<K, V, H>
where
  K: Eq + Hash + Clone + Send + Sync + 'static,
  V: Send + Sync + 'static,
  H: BuildHasher + Clone + Send + Sync + 'static,
{
  fn drop(&mut self) {
    if !self.finished {
      tracing::debug!("load abandoned before completion");
      let _ = self.shared.complete_load(
        &self.key,
        &self.future,
        Err(LoadError::Abandoned),
        self.started.elapsed(),
      );
    }
  }
}
