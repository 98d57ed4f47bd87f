use crate::listener::RemovalCause;
use crate::notifier::Notification;
use crate::policy::Candidate;
use crate::rng::FastRng;
use crate::shared::CacheShared;

use std::hash::{BuildHasher, Hash};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Bookkeeping for deferred eviction work.
#[derive(Debug)]
pub(crate) struct Maintenance<K> {
  /// Held by whichever thread is currently running a pass.
  lock: Mutex<()>,
  /// Set by writes; cleared by the pass that handles them.
  pending: AtomicBool,
  /// Keys whose entry alone outweighed the bound when it was written.
  oversized: Mutex<Vec<K>>,
  rng: FastRng,
  sweep_frequency: u32,
}

impl<K> Maintenance<K> {
  /// `sweep_frequency` must be a power of two.
  pub(crate) fn new(sweep_frequency: u32) -> Self {
    debug_assert!(sweep_frequency.is_power_of_two());
    Self {
      lock: Mutex::new(()),
      pending: AtomicBool::new(false),
      oversized: Mutex::new(Vec::new()),
      rng: FastRng::new(0x5EED),
      sweep_frequency,
    }
  }

  #[inline]
  pub(crate) fn request(&self) {
    self.pending.store(true, Ordering::Release);
  }

  /// Whether a write should also sweep its shard for expired entries.
  #[inline]
  pub(crate) fn should_sweep(&self) -> bool {
    self.rng.should_run(self.sweep_frequency)
  }

  pub(crate) fn track_oversized(&self, key: K) {
    self.oversized.lock().push(key);
  }

  pub(crate) fn clear_oversized(&self) {
    self.oversized.lock().clear();
  }

  #[cfg(test)]
  pub(crate) fn oversized_len(&self) -> usize {
    self.oversized.lock().len()
  }
}

impl<K: Eq> Maintenance<K> {
  pub(crate) fn forget_oversized(&self, key: &K) {
    self.oversized.lock().retain(|tracked| tracked != key);
  }
}

impl<K, V, H> CacheShared<K, V, H>
where
  K: Eq + Hash + Clone + Send + Sync + 'static,
  V: Send + Sync + 'static,
  H: BuildHasher + Clone + Send + Sync + 'static,
{
  /// Brings the cache back within its bound.
  ///
  /// Runs inline on the calling thread. If another thread is already running
  /// a pass, this returns immediately and that thread picks up the request.
  pub(crate) fn maintain(&self) {
    self.maintenance.request();
    loop {
      let notifications = {
        let Some(_guard) = self.maintenance.lock.try_lock() else {
          return;
        };
        let mut notifications = Vec::new();
        while self.maintenance.pending.swap(false, Ordering::AcqRel) {
          self.evict_to_bound(&mut notifications);
        }
        notifications
      };
      self.dispatch(notifications);
      if !self.maintenance.pending.load(Ordering::Acquire) {
        return;
      }
    }
  }

  /// Runs a pass only if a write has asked for one.
  pub(crate) fn maintain_if_requested(&self) {
    if self.bound.is_some() && self.maintenance.pending.load(Ordering::Acquire) {
      self.maintain();
    }
  }

  /// Removes every expired entry, then evicts down to the bound.
  pub(crate) fn clean_up(&self) {
    if self.expiry.expires() {
      let now = self.now();
      for index in 0..self.store.num_shards() {
        let mut notifications = Vec::new();
        self.sweep_shard(index, now, &mut notifications);
        self.dispatch(notifications);
      }
    }
    self.maintain();
  }

  /// Removes the expired entries of one shard.
  pub(crate) fn sweep_shard(
    &self,
    index: usize,
    now: u64,
    notifications: &mut Vec<Notification<K, V>>,
  ) {
    let shard = self.store.shard_at(index);
    let mut map = shard.map.write();
    let expired: Vec<K> = map
      .iter()
      .filter(|(_, entry)| self.expiry.is_expired(entry, now))
      .map(|(key, _)| key.clone())
      .collect();
    if expired.is_empty() {
      return;
    }
    tracing::debug!(shard = index, count = expired.len(), "sweeping expired entries");
    for key in expired {
      if let Some(entry) = self.unlink_locked(shard, &mut map, &key) {
        self.retire(key, &entry, RemovalCause::Expired, now, notifications);
      }
    }
  }

  fn evict_to_bound(&self, notifications: &mut Vec<Notification<K, V>>) {
    let Some(bound) = self.bound else {
      return;
    };
    let mut evicted = 0usize;
    while self.weighted_size() > bound {
      if self.evict_oversized(bound, notifications) {
        evicted += 1;
        continue;
      }
      let Some((index, candidate)) = self.global_victim() else {
        break;
      };
      if self.evict_candidate(index, candidate, notifications) {
        evicted += 1;
      }
    }
    if evicted > 0 {
      tracing::debug!(evicted, weighted_size = self.weighted_size(), bound, "eviction pass finished");
    }
  }

  /// Evicts one entry that can never fit, if any is still stored.
  fn evict_oversized(&self, bound: u64, notifications: &mut Vec<Notification<K, V>>) -> bool {
    loop {
      let Some(key) = self.maintenance.oversized.lock().pop() else {
        return false;
      };
      let shard = self.store.shard(&key);
      let mut map = shard.map.write();
      let still_oversized = map
        .get(&key)
        .map_or(false, |entry| u64::from(entry.weight()) > bound);
      if !still_oversized {
        continue;
      }
      if let Some(entry) = self.unlink_locked(shard, &mut map, &key) {
        let now = self.now();
        self.retire(key, &entry, RemovalCause::Size, now, notifications);
        return true;
      }
    }
  }

  /// Picks the least recently used entry across all shards.
  fn global_victim(&self) -> Option<(usize, Candidate<K>)> {
    (0..self.store.num_shards())
      .filter_map(|index| {
        self
          .store
          .shard_at(index)
          .policy
          .peek_victim()
          .map(|candidate| (index, candidate))
      })
      .min_by_key(|(_, candidate)| candidate.stamp)
  }

  /// Evicts `candidate` unless it was touched after it was picked.
  fn evict_candidate(
    &self,
    index: usize,
    candidate: Candidate<K>,
    notifications: &mut Vec<Notification<K, V>>,
  ) -> bool {
    let shard = self.store.shard_at(index);
    let mut map = shard.map.write();
    let unchanged = shard
      .policy
      .peek_victim()
      .map_or(false, |current| current.key == candidate.key && current.stamp == candidate.stamp);
    if !unchanged {
      return false;
    }
    match self.unlink_locked(shard, &mut map, &candidate.key) {
      Some(entry) => {
        let now = self.now();
        tracing::trace!(
          weight = candidate.weight,
          age = now.saturating_sub(entry.created_at()),
          "evicting least recently used entry"
        );
        self.retire(candidate.key, &entry, RemovalCause::Size, now, notifications);
        true
      }
      None => {
        // Ranked but not stored; drop the stale rank so the pass makes progress.
        shard.policy.on_remove(&candidate.key);
        false
      }
    }
  }
}

/// The optional background thread that keeps an idle cache tidy.
#[derive(Debug)]
pub(crate) struct Janitor {
  handle: JoinHandle<()>,
  stop_flag: Arc<AtomicBool>,
}

impl Janitor {
  /// Spawns a janitor that runs a full maintenance pass every `tick_interval`.
  ///
  /// The thread holds only a weak reference and exits once the cache is gone.
  pub(crate) fn spawn<K, V, H>(
    shared: Weak<CacheShared<K, V, H>>,
    tick_interval: Duration,
  ) -> std::io::Result<Self>
  where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
    H: BuildHasher + Clone + Send + Sync + 'static,
  {
    let stop_flag = Arc::new(AtomicBool::new(false));
    let stop_clone = stop_flag.clone();

    let handle = thread::Builder::new()
      .name("steep-cache-janitor".into())
      .spawn(move || {
        while !stop_clone.load(Ordering::Acquire) {
          let tick_start = Instant::now();

          match shared.upgrade() {
            Some(shared) => shared.clean_up(),
            None => break,
          }

          if let Some(remaining) = tick_interval.checked_sub(tick_start.elapsed()) {
            thread::park_timeout(remaining);
          }
        }
        tracing::debug!("janitor stopped");
      })?;

    Ok(Self { handle, stop_flag })
  }

  /// Signals the janitor thread to stop and wakes it if it is sleeping.
  pub(crate) fn stop(self) {
    self.stop_flag.store(true, Ordering::Release);
    self.handle.thread().unpark();
  }
}

#[cfg(test)]
mod tests {
  use crate::CacheBuilder;

  #[test]
  fn oversized_keys_are_forgotten_once_their_entry_leaves() {
    let cache = CacheBuilder::<u32, Vec<u8>>::new()
      .maximum_weight(4)
      .weigher(|_key, value: &Vec<u8>| value.len() as u32)
      .build()
      .unwrap();

    for key in 0..100 {
      cache.put(key, vec![0; 8]);
      assert!(cache.invalidate(&key));
    }
    assert_eq!(cache.shared.maintenance.oversized_len(), 0);

    cache.put(7, vec![0; 8]);
    assert_eq!(cache.shared.maintenance.oversized_len(), 1);
    cache.clean_up();
    assert_eq!(cache.shared.maintenance.oversized_len(), 0);
    assert_eq!(cache.weighted_size(), 0);
  }
}
