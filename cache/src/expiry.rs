use crate::entry::CacheEntry;
use crate::time::as_nanos;

use std::time::Duration;

/// Decides whether an entry is still live, and whether it is due for a refresh.
///
/// All thresholds are inclusive: an entry whose age equals its limit is expired.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct ExpiryPolicy {
  expire_after_write: Option<u64>,
  expire_after_access: Option<u64>,
  refresh_after_write: Option<u64>,
}

impl ExpiryPolicy {
  pub(crate) fn new(
    expire_after_write: Option<Duration>,
    expire_after_access: Option<Duration>,
    refresh_after_write: Option<Duration>,
  ) -> Self {
    Self {
      expire_after_write: expire_after_write.map(as_nanos),
      expire_after_access: expire_after_access.map(as_nanos),
      refresh_after_write: refresh_after_write.map(as_nanos),
    }
  }

  /// True when any time-based removal is configured.
  #[inline]
  pub(crate) fn expires(&self) -> bool {
    self.expire_after_write.is_some() || self.expire_after_access.is_some()
  }

  #[inline]
  pub(crate) fn is_expired<V>(&self, entry: &CacheEntry<V>, now: u64) -> bool {
    if let Some(limit) = self.expire_after_write {
      if now.saturating_sub(entry.last_write()) >= limit {
        return true;
      }
    }
    if let Some(limit) = self.expire_after_access {
      if now.saturating_sub(entry.last_access()) >= limit {
        return true;
      }
    }
    false
  }

  #[inline]
  pub(crate) fn needs_refresh<V>(&self, entry: &CacheEntry<V>, now: u64) -> bool {
    match self.refresh_after_write {
      Some(limit) => {
        now.saturating_sub(entry.last_write()) >= limit && !self.is_expired(entry, now)
      }
      None => false,
    }
  }
}
