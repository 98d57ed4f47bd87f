use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crossbeam_utils::CachePadded;

use crate::time::as_nanos;

/// A thread-safe, internal statistics collector for the cache.
/// All fields are atomic to allow for lock-free updates.
#[derive(Debug)]
pub(crate) struct StatsCounter {
  enabled: bool,
  hits: CachePadded<AtomicU64>,
  misses: CachePadded<AtomicU64>,
  load_successes: CachePadded<AtomicU64>,
  load_failures: CachePadded<AtomicU64>,
  total_load_nanos: CachePadded<AtomicU64>,
  evictions: CachePadded<AtomicU64>,
  eviction_weight: CachePadded<AtomicU64>,
}

impl StatsCounter {
  /// Creates a counter. A disabled counter ignores every update.
  pub(crate) fn new(enabled: bool) -> Self {
    Self {
      enabled,
      hits: CachePadded::new(AtomicU64::new(0)),
      misses: CachePadded::new(AtomicU64::new(0)),
      load_successes: CachePadded::new(AtomicU64::new(0)),
      load_failures: CachePadded::new(AtomicU64::new(0)),
      total_load_nanos: CachePadded::new(AtomicU64::new(0)),
      evictions: CachePadded::new(AtomicU64::new(0)),
      eviction_weight: CachePadded::new(AtomicU64::new(0)),
    }
  }

  #[inline]
  pub(crate) fn record_hits(&self, count: u64) {
    if self.enabled && count > 0 {
      self.hits.fetch_add(count, Ordering::Relaxed);
    }
  }

  #[inline]
  pub(crate) fn record_misses(&self, count: u64) {
    if self.enabled && count > 0 {
      self.misses.fetch_add(count, Ordering::Relaxed);
    }
  }

  pub(crate) fn record_load_success(&self, load_time: Duration) {
    if self.enabled {
      self.load_successes.fetch_add(1, Ordering::Relaxed);
      self
        .total_load_nanos
        .fetch_add(as_nanos(load_time), Ordering::Relaxed);
    }
  }

  pub(crate) fn record_load_failure(&self, load_time: Duration) {
    if self.enabled {
      self.load_failures.fetch_add(1, Ordering::Relaxed);
      self
        .total_load_nanos
        .fetch_add(as_nanos(load_time), Ordering::Relaxed);
    }
  }

  pub(crate) fn record_eviction(&self, weight: u64) {
    if self.enabled {
      self.evictions.fetch_add(1, Ordering::Relaxed);
      self.eviction_weight.fetch_add(weight, Ordering::Relaxed);
    }
  }

  /// Creates a point-in-time snapshot of the current counters.
  pub(crate) fn snapshot(&self) -> CacheStats {
    CacheStats {
      hit_count: self.hits.load(Ordering::Relaxed),
      miss_count: self.misses.load(Ordering::Relaxed),
      load_success_count: self.load_successes.load(Ordering::Relaxed),
      load_failure_count: self.load_failures.load(Ordering::Relaxed),
      total_load_time: Duration::from_nanos(self.total_load_nanos.load(Ordering::Relaxed)),
      eviction_count: self.evictions.load(Ordering::Relaxed),
      eviction_weight: self.eviction_weight.load(Ordering::Relaxed),
    }
  }
}

/// An immutable, point-in-time snapshot of a cache's statistics.
///
/// Counters only advance on caches built with
/// [`CacheBuilder::record_stats`](crate::CacheBuilder::record_stats); otherwise
/// every field stays zero.
#[derive(Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct CacheStats {
  /// Lookups served from a live entry, or by joining another caller's load.
  pub hit_count: u64,
  /// Lookups that found nothing, including every lookup that invoked the loader.
  pub miss_count: u64,
  /// Loader invocations (loads and refreshes) that produced a value.
  pub load_success_count: u64,
  /// Loader invocations (loads and refreshes) that failed or panicked.
  pub load_failure_count: u64,
  /// Total time spent inside the loader.
  pub total_load_time: Duration,
  /// Entries removed because of the size bound or expiration.
  pub eviction_count: u64,
  /// Sum of the weights of evicted entries.
  pub eviction_weight: u64,
}

impl CacheStats {
  pub fn request_count(&self) -> u64 {
    self.hit_count.saturating_add(self.miss_count)
  }

  /// Returns `hits / requests`, or `1.0` when there were no requests.
  pub fn hit_rate(&self) -> f64 {
    match self.request_count() {
      0 => 1.0,
      requests => self.hit_count as f64 / requests as f64,
    }
  }

  /// Returns `misses / requests`, or `0.0` when there were no requests.
  pub fn miss_rate(&self) -> f64 {
    match self.request_count() {
      0 => 0.0,
      requests => self.miss_count as f64 / requests as f64,
    }
  }

  pub fn load_count(&self) -> u64 {
    self
      .load_success_count
      .saturating_add(self.load_failure_count)
  }

  pub fn load_failure_rate(&self) -> f64 {
    match self.load_count() {
      0 => 0.0,
      loads => self.load_failure_count as f64 / loads as f64,
    }
  }

  /// The mean time spent per loader invocation.
  pub fn average_load_penalty(&self) -> Duration {
    match self.load_count() {
      0 => Duration::ZERO,
      loads => Duration::from_nanos(as_nanos(self.total_load_time) / loads),
    }
  }

  /// Returns the difference `self - other`, clamped at zero, for measuring an interval.
  pub fn minus(&self, other: &CacheStats) -> CacheStats {
    CacheStats {
      hit_count: self.hit_count.saturating_sub(other.hit_count),
      miss_count: self.miss_count.saturating_sub(other.miss_count),
      load_success_count: self
        .load_success_count
        .saturating_sub(other.load_success_count),
      load_failure_count: self
        .load_failure_count
        .saturating_sub(other.load_failure_count),
      total_load_time: self.total_load_time.saturating_sub(other.total_load_time),
      eviction_count: self.eviction_count.saturating_sub(other.eviction_count),
      eviction_weight: self.eviction_weight.saturating_sub(other.eviction_weight),
    }
  }

  pub fn plus(&self, other: &CacheStats) -> CacheStats {
    CacheStats {
      hit_count: self.hit_count.saturating_add(other.hit_count),
      miss_count: self.miss_count.saturating_add(other.miss_count),
      load_success_count: self
        .load_success_count
        .saturating_add(other.load_success_count),
      load_failure_count: self
        .load_failure_count
        .saturating_add(other.load_failure_count),
      total_load_time: self.total_load_time.saturating_add(other.total_load_time),
      eviction_count: self.eviction_count.saturating_add(other.eviction_count),
      eviction_weight: self.eviction_weight.saturating_add(other.eviction_weight),
    }
  }
}

impl fmt::Debug for CacheStats {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("CacheStats")
      .field("hit_count", &self.hit_count)
      .field("miss_count", &self.miss_count)
      .field("hit_rate", &format!("{:.2}%", self.hit_rate() * 100.0))
      .field("load_success_count", &self.load_success_count)
      .field("load_failure_count", &self.load_failure_count)
      .field("total_load_time", &self.total_load_time)
      .field("eviction_count", &self.eviction_count)
      .field("eviction_weight", &self.eviction_weight)
      .finish()
  }
}
