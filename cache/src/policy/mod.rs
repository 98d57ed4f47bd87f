//! Recency tracking used to pick eviction victims.
//!
//! Each shard owns one policy instance. Every touch is tagged with a stamp
//! drawn from a cache-wide counter, so comparing the tails of all shards
//! yields the globally least recently used entry.

use std::sync::atomic::{AtomicU64, Ordering};

pub(crate) mod lru;
mod lru_list;
pub(crate) mod null;

/// The least recently used entry of one shard, offered up for eviction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Candidate<K> {
  pub(crate) key: K,
  pub(crate) weight: u64,
  pub(crate) stamp: u64,
}

/// The cache-wide source of access stamps.
///
/// Policies draw a stamp while holding their own lock, so stamps within one
/// shard's list are strictly ordered.
#[derive(Debug, Default)]
pub(crate) struct AccessClock(AtomicU64);

impl AccessClock {
  #[inline]
  pub(crate) fn tick(&self) -> u64 {
    self.0.fetch_add(1, Ordering::Relaxed)
  }
}

/// A trait for the per-shard recency bookkeeping behind eviction.
///
/// Callers hold the owning shard's map lock while invoking any of these
/// methods, which keeps "what is ranked" and "what exists" in step.
pub(crate) trait CachePolicy<K>: Send + Sync {
  /// Called when an item is read.
  fn on_access(&self, key: &K, clock: &AccessClock);

  /// Called when an item is written, whether new or replacing an older value.
  fn on_insert(&self, key: &K, weight: u64, clock: &AccessClock);

  /// Called when an item's value changes without it being used, as on a
  /// background refresh. Its rank is kept.
  fn on_update(&self, key: &K, weight: u64);

  /// Called when an item leaves the shard for any reason.
  fn on_remove(&self, key: &K);

  /// Returns the next eviction candidate of this shard without removing it.
  fn peek_victim(&self) -> Option<Candidate<K>>;

  /// Clears all state from the policy.
  fn clear(&self);
}
