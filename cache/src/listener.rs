use std::fmt;
use std::sync::Arc;

/// Describes the reason an entry was removed from the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum RemovalCause {
  /// The entry was removed by `invalidate`, `invalidate_all` or `invalidate_keys`.
  Explicit,
  /// The value was overwritten by `put` or by a completed refresh.
  Replaced,
  /// The entry was evicted to keep the cache within its size or weight bound.
  Size,
  /// The entry outlived its write or access expiry.
  Expired,
  /// The value was reclaimed by the runtime. Values are held by strong
  /// references, so the cache never reports this cause itself.
  Collected,
}

impl RemovalCause {
  /// Returns true if the removal was automatic rather than requested by the user.
  pub fn was_evicted(&self) -> bool {
    matches!(
      self,
      RemovalCause::Size | RemovalCause::Expired | RemovalCause::Collected
    )
  }
}

impl fmt::Display for RemovalCause {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      RemovalCause::Explicit => write!(f, "EXPLICIT"),
      RemovalCause::Replaced => write!(f, "REPLACED"),
      RemovalCause::Size => write!(f, "SIZE"),
      RemovalCause::Expired => write!(f, "EXPIRED"),
      RemovalCause::Collected => write!(f, "COLLECTED"),
    }
  }
}

/// A listener that can be registered with the cache to receive a notification
/// for every entry that leaves it.
///
/// `on_removal` runs synchronously on the thread that removed the entry, after
/// the entry has been unlinked and with no cache locks held, so it may freely
/// call back into the cache. A panicking listener is contained and logged.
///
/// Any `Fn(K, Arc<V>, RemovalCause)` closure is a listener.
pub trait RemovalListener<K, V>: Send + Sync {
  fn on_removal(&self, key: K, value: Arc<V>, cause: RemovalCause);
}

impl<K, V, F> RemovalListener<K, V> for F
where
  F: Fn(K, Arc<V>, RemovalCause) + Send + Sync,
{
  fn on_removal(&self, key: K, value: Arc<V>, cause: RemovalCause) {
    self(key, value, cause)
  }
}
