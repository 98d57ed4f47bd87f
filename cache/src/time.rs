//! Time sources used for expiration, refresh and load timing.

use once_cell::sync::Lazy;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

// The single, static reference point for all time calculations in the cache.
// It is initialized lazily on its first use.
static CACHE_EPOCH: Lazy<Instant> = Lazy::new(Instant::now);

/// A helper to get the current time as a `Duration` since the epoch.
#[inline]
pub(crate) fn now_duration() -> Duration {
  Instant::now().saturating_duration_since(*CACHE_EPOCH)
}

#[inline]
pub(crate) fn as_nanos(duration: Duration) -> u64 {
  u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}

/// A source of monotonic time, in nanoseconds, for the cache.
///
/// The absolute value is meaningless; only differences between readings are
/// used. Supplying a custom ticker makes expiration and refresh deterministic
/// in tests.
pub trait Ticker: Send + Sync + 'static {
  /// Returns the current reading in nanoseconds.
  fn read(&self) -> u64;
}

/// The default ticker, backed by `std::time::Instant`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemTicker;

impl Ticker for SystemTicker {
  #[inline]
  fn read(&self) -> u64 {
    as_nanos(now_duration())
  }
}

/// A ticker that only moves when told to.
#[derive(Default)]
pub struct ManualTicker {
  nanos: AtomicU64,
}

impl ManualTicker {
  pub fn new() -> Self {
    Self::default()
  }

  /// Moves the ticker forward by `duration`.
  pub fn advance(&self, duration: Duration) {
    self.nanos.fetch_add(as_nanos(duration), Ordering::SeqCst);
  }
}

impl Ticker for ManualTicker {
  fn read(&self) -> u64 {
    self.nanos.load(Ordering::SeqCst)
  }
}

impl fmt::Debug for ManualTicker {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ManualTicker")
      .field("nanos", &self.read())
      .finish()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn manual_ticker_only_moves_when_advanced() {
    let ticker = ManualTicker::new();
    assert_eq!(ticker.read(), 0);
    ticker.advance(Duration::from_millis(1500));
    assert_eq!(ticker.read(), 1_500_000_000);
  }

  #[test]
  fn system_ticker_is_monotonic() {
    let first = SystemTicker.read();
    let second = SystemTicker.read();
    assert!(second >= first);
  }
}
