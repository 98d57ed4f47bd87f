mod common;

use common::RemovalLog;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use steep_cache::{CacheBuilder, ManualTicker, RemovalCause};

#[test]
fn test_expire_after_access_removes_idle_entries() {
  let ticker = Arc::new(ManualTicker::new());
  let log = RemovalLog::new();
  let cache = CacheBuilder::<&str, i32>::new()
    .expire_after_access(Duration::from_secs(2))
    .ticker(ticker.clone())
    .removal_listener(log.listener())
    .build()
    .unwrap();

  cache.put("a", 1);

  // Each read pushes the deadline back.
  ticker.advance(Duration::from_millis(1500));
  assert!(cache.get_if_present(&"a").is_some());
  ticker.advance(Duration::from_millis(1500));
  assert!(cache.get_if_present(&"a").is_some());

  // Left untouched for two seconds.
  ticker.advance(Duration::from_secs(2));
  assert!(cache.get_if_present(&"a").is_none());
  assert_eq!(log.take_causes(), vec![("a", RemovalCause::Expired)]);
  assert_eq!(cache.estimated_size(), 0);
}

#[test]
fn test_expire_after_write_ignores_reads() {
  let ticker = Arc::new(ManualTicker::new());
  let cache = CacheBuilder::<&str, i32>::new()
    .expire_after_write(Duration::from_secs(2))
    .ticker(ticker.clone())
    .build()
    .unwrap();

  cache.put("a", 1);
  ticker.advance(Duration::from_millis(1500));
  assert!(cache.get_if_present(&"a").is_some());

  ticker.advance(Duration::from_millis(500));
  assert!(cache.get_if_present(&"a").is_none());

  // Writing again starts a new lifetime.
  cache.put("a", 2);
  ticker.advance(Duration::from_millis(1999));
  assert_eq!(*cache.get_if_present(&"a").unwrap(), 2);
}

#[test]
fn test_both_expiration_policies_apply() {
  let ticker = Arc::new(ManualTicker::new());
  let cache = CacheBuilder::<&str, i32>::new()
    .expire_after_write(Duration::from_secs(5))
    .expire_after_access(Duration::from_secs(2))
    .ticker(ticker.clone())
    .build()
    .unwrap();

  cache.put("idle", 1);
  cache.put("busy", 2);
  for _ in 0..4 {
    ticker.advance(Duration::from_secs(1));
    assert!(cache.get_if_present(&"busy").is_some());
  }
  assert!(cache.get_if_present(&"idle").is_none());

  // Reads cannot keep an entry past its write deadline.
  ticker.advance(Duration::from_secs(1));
  assert!(cache.get_if_present(&"busy").is_none());
}

#[test]
fn test_expired_entries_are_reloaded() {
  let ticker = Arc::new(ManualTicker::new());
  let load_count = Arc::new(AtomicUsize::new(0));
  let counter = load_count.clone();
  let cache = CacheBuilder::new()
    .expire_after_write(Duration::from_secs(1))
    .ticker(ticker.clone())
    .record_stats()
    .loader(move |key: &i32| key + counter.fetch_add(1, Ordering::SeqCst) as i32)
    .build()
    .unwrap();

  assert_eq!(*cache.get(&10).unwrap(), 10);
  assert_eq!(*cache.get(&10).unwrap(), 10);

  ticker.advance(Duration::from_secs(1));
  assert_eq!(*cache.get(&10).unwrap(), 11);
  assert_eq!(load_count.load(Ordering::SeqCst), 2);

  let stats = cache.stats();
  assert_eq!(stats.hit_count, 1);
  assert_eq!(stats.miss_count, 2);
  assert_eq!(stats.eviction_count, 1);
}

#[test]
fn test_clean_up_sweeps_expired_entries() {
  let ticker = Arc::new(ManualTicker::new());
  let log = RemovalLog::new();
  let cache = CacheBuilder::<i32, i32>::new()
    .expire_after_write(Duration::from_secs(1))
    .ticker(ticker.clone())
    .removal_listener(log.listener())
    .build()
    .unwrap();

  cache.put_all((0..3).map(|i| (i, i)));
  ticker.advance(Duration::from_secs(5));

  // Expired entries linger until something notices them.
  assert_eq!(cache.estimated_size(), 3);
  assert_eq!(cache.as_map().len(), 0);

  cache.clean_up();
  assert_eq!(cache.estimated_size(), 0);
  assert_eq!(cache.weighted_size(), 0);

  let causes = log.take_causes();
  assert_eq!(causes.len(), 3);
  assert!(causes.iter().all(|(_, cause)| *cause == RemovalCause::Expired));
}

#[test]
fn test_replacing_an_expired_entry_reports_expiration() {
  let ticker = Arc::new(ManualTicker::new());
  let log = RemovalLog::new();
  let cache = CacheBuilder::<&str, i32>::new()
    .expire_after_write(Duration::from_secs(1))
    .ticker(ticker.clone())
    .removal_listener(log.listener())
    .build()
    .unwrap();

  cache.put("a", 1);
  ticker.advance(Duration::from_secs(2));
  cache.put("a", 2);

  assert_eq!(log.take_causes(), vec![("a", RemovalCause::Expired)]);
  assert!(!cache.invalidate(&"b"));

  // Invalidating an expired entry reports the expiration, and finds nothing live.
  ticker.advance(Duration::from_secs(2));
  assert!(!cache.invalidate(&"a"));
  assert_eq!(log.take_causes(), vec![("a", RemovalCause::Expired)]);
}
