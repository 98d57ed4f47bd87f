use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// A container for a value in the cache, holding all necessary metadata.
///
/// An entry is never mutated in place apart from its access time and refresh
/// flag. Writes and refreshes install a new `CacheEntry`, so the `Arc`
/// identity of an entry doubles as its generation.
#[derive(Debug)]
pub(crate) struct CacheEntry<V> {
  /// The user's value, wrapped in an Arc for shared ownership.
  value: Arc<V>,
  /// The weight charged against the cache's bound.
  weight: u32,
  /// Ticker reading when the key was first stored.
  created_at: u64,
  /// Ticker reading of the last write or refresh.
  last_write: u64,
  /// Ticker reading of the last read or write.
  last_access: AtomicU64,
  /// Set while a background refresh for this entry is in flight.
  refreshing: AtomicBool,
}

impl<V> CacheEntry<V> {
  /// Creates a freshly written entry.
  pub(crate) fn new(value: V, weight: u32, now: u64) -> Self {
    Self {
      value: Arc::new(value),
      weight,
      created_at: now,
      last_write: now,
      last_access: AtomicU64::new(now),
      refreshing: AtomicBool::new(false),
    }
  }

  /// Builds the entry that replaces `self` once a refresh completes.
  ///
  /// The write time moves forward while the creation and access times carry over.
  pub(crate) fn refreshed(&self, value: V, weight: u32, now: u64) -> Self {
    Self {
      value: Arc::new(value),
      weight,
      created_at: self.created_at,
      last_write: now,
      last_access: AtomicU64::new(self.last_access()),
      refreshing: AtomicBool::new(false),
    }
  }

  /// Returns a clone of the `Arc` containing the value.
  #[inline]
  pub(crate) fn value(&self) -> Arc<V> {
    self.value.clone()
  }

  #[inline]
  pub(crate) fn weight(&self) -> u32 {
    self.weight
  }

  #[inline]
  pub(crate) fn created_at(&self) -> u64 {
    self.created_at
  }

  #[inline]
  pub(crate) fn last_write(&self) -> u64 {
    self.last_write
  }

  #[inline]
  pub(crate) fn last_access(&self) -> u64 {
    self.last_access.load(Ordering::Relaxed)
  }

  /// Records a read at `now`. Readings never move backwards.
  #[inline]
  pub(crate) fn touch(&self, now: u64) {
    self.last_access.fetch_max(now, Ordering::Relaxed);
  }

  /// Claims the right to refresh this entry. Only one caller ever wins.
  pub(crate) fn try_begin_refresh(&self) -> bool {
    self
      .refreshing
      .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
      .is_ok()
  }

  /// Releases the refresh claim after a failed refresh so a later read can retry.
  pub(crate) fn end_refresh(&self) {
    self.refreshing.store(false, Ordering::Release);
  }

  #[cfg(test)]
  pub(crate) fn is_refreshing(&self) -> bool {
    self.refreshing.load(Ordering::Acquire)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn refreshed_entry_keeps_creation_and_access_times() {
    let entry = CacheEntry::new("v1", 1, 100);
    entry.touch(250);

    let refreshed = entry.refreshed("v2", 3, 400);
    assert_eq!(*refreshed.value(), "v2");
    assert_eq!(refreshed.weight(), 3);
    assert_eq!(refreshed.created_at(), 100);
    assert_eq!(refreshed.last_write(), 400);
    assert_eq!(refreshed.last_access(), 250);
    assert!(!refreshed.is_refreshing());
  }

  #[test]
  fn only_one_refresh_claim_succeeds() {
    let entry = CacheEntry::new(1, 1, 0);
    assert!(entry.try_begin_refresh());
    assert!(!entry.try_begin_refresh());
    entry.end_refresh();
    assert!(entry.try_begin_refresh());
  }

  #[test]
  fn touch_never_moves_backwards() {
    let entry = CacheEntry::new(1, 1, 50);
    entry.touch(40);
    assert_eq!(entry.last_access(), 50);
    entry.touch(70);
    assert_eq!(entry.last_access(), 70);
  }
}
