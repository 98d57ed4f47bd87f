mod common;

use common::{wait_until, RemovalLog};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::time::Duration;

use steep_cache::{CacheBuilder, ManualTicker, RemovalCause};

const WAIT: Duration = Duration::from_secs(5);

#[test]
fn test_stale_entry_is_served_while_refreshing() {
  let ticker = Arc::new(ManualTicker::new());
  let version = Arc::new(AtomicUsize::new(0));
  let gate = Arc::new(Barrier::new(2));

  let loader_version = version.clone();
  let loader_gate = gate.clone();
  let cache = CacheBuilder::new()
    .refresh_after_write(Duration::from_secs(2))
    .ticker(ticker.clone())
    .loader(move |key: &&str| {
      let v = loader_version.fetch_add(1, Ordering::SeqCst) + 1;
      if v > 1 {
        loader_gate.wait();
      }
      format!("{key}-v{v}")
    })
    .build()
    .unwrap();

  assert_eq!(*cache.get(&"k").unwrap(), "k-v1");

  ticker.advance(Duration::from_secs(1));
  assert_eq!(*cache.get(&"k").unwrap(), "k-v1");
  assert_eq!(version.load(Ordering::SeqCst), 1);

  // Past the refresh deadline: the old value comes back at once.
  ticker.advance(Duration::from_secs(2));
  assert_eq!(*cache.get(&"k").unwrap(), "k-v1");
  assert_eq!(*cache.get(&"k").unwrap(), "k-v1");

  // Only one reload runs no matter how many readers see the stale entry.
  wait_until(WAIT, || version.load(Ordering::SeqCst) == 2);
  assert_eq!(*cache.get(&"k").unwrap(), "k-v1");
  gate.wait();

  wait_until(WAIT, || {
    cache
      .get_if_present(&"k")
      .map_or(false, |value| *value == "k-v2")
  });
  assert_eq!(*cache.get(&"k").unwrap(), "k-v2");
  assert_eq!(version.load(Ordering::SeqCst), 2);
}

#[test]
fn test_failed_refresh_keeps_current_value() {
  let ticker = Arc::new(ManualTicker::new());
  let calls = Arc::new(AtomicUsize::new(0));
  let counter = calls.clone();
  let cache = CacheBuilder::new()
    .refresh_after_write(Duration::from_secs(2))
    .ticker(ticker.clone())
    .record_stats()
    .try_loader(move |key: &i32| {
      if counter.fetch_add(1, Ordering::SeqCst) == 0 {
        Ok(key * 100)
      } else {
        Err("backend unavailable")
      }
    })
    .build()
    .unwrap();

  assert_eq!(*cache.get(&1).unwrap(), 100);
  ticker.advance(Duration::from_secs(3));

  assert_eq!(*cache.get(&1).unwrap(), 100);
  wait_until(WAIT, || cache.stats().load_failure_count == 1);
  assert_eq!(*cache.get_if_present(&1).unwrap(), 100);

  // The failure does not wedge the entry; the next read tries again.
  assert_eq!(*cache.get(&1).unwrap(), 100);
  wait_until(WAIT, || cache.stats().load_failure_count == 2);
  assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[test]
fn test_explicit_refresh() {
  let version = Arc::new(AtomicUsize::new(0));
  let loader_version = version.clone();
  let log = RemovalLog::new();
  let cache = CacheBuilder::new()
    .record_stats()
    .removal_listener(log.listener())
    .loader(move |key: &&str| {
      let v = loader_version.fetch_add(1, Ordering::SeqCst) + 1;
      format!("{key}-v{v}")
    })
    .build()
    .unwrap();

  cache.put("present", "initial".to_string());
  cache.refresh(&"present");
  wait_until(WAIT, || log.len() == 1);
  assert_eq!(*cache.as_map().get(&"present").unwrap(), "present-v1");
  let removals = log.take();
  assert_eq!(removals.len(), 1);
  assert_eq!(*removals[0].1, "initial");
  assert_eq!(removals[0].2, RemovalCause::Replaced);

  // An absent key is loaded in the background.
  cache.refresh(&"absent");
  wait_until(WAIT, || cache.as_map().contains_key(&"absent"));

  let stats = cache.stats();
  assert_eq!(stats.hit_count, 0);
  assert_eq!(stats.miss_count, 0);
  assert_eq!(stats.load_success_count, 2);
}

#[test]
fn test_refresh_keeps_the_eviction_rank() {
  let log = RemovalLog::new();
  let cache = CacheBuilder::new()
    .maximum_size(2)
    .removal_listener(log.listener())
    .loader(|key: &&str| format!("{key}-reloaded"))
    .build()
    .unwrap();

  cache.put("older", "a".to_string());
  cache.put("newer", "b".to_string());
  cache.refresh(&"older");
  wait_until(WAIT, || log.len() == 1);

  // The reload replaced the value but did not count as a use.
  cache.put("third", "c".to_string());
  cache.clean_up();

  assert_eq!(
    log.take_causes(),
    vec![("older", RemovalCause::Replaced), ("older", RemovalCause::Size)]
  );
  assert!(cache.get_if_present(&"newer").is_some());
}

#[test]
fn test_refresh_is_discarded_when_entry_is_replaced() {
  let ticker = Arc::new(ManualTicker::new());
  let gate = Arc::new(Barrier::new(2));
  let loader_gate = gate.clone();
  let calls = Arc::new(AtomicUsize::new(0));
  let counter = calls.clone();
  let cache = CacheBuilder::new()
    .refresh_after_write(Duration::from_secs(1))
    .ticker(ticker.clone())
    .record_stats()
    .loader(move |_key: &i32| {
      if counter.fetch_add(1, Ordering::SeqCst) > 0 {
        loader_gate.wait();
      }
      "loaded".to_string()
    })
    .build()
    .unwrap();

  cache.get(&1).unwrap();
  ticker.advance(Duration::from_secs(2));
  assert_eq!(*cache.get(&1).unwrap(), "loaded");
  wait_until(WAIT, || calls.load(Ordering::SeqCst) == 2);

  cache.put(1, "manual".to_string());
  gate.wait();

  wait_until(WAIT, || cache.stats().load_success_count == 2);
  assert_eq!(*cache.get_if_present(&1).unwrap(), "manual");
}

#[test]
fn test_expired_entries_are_reloaded_not_refreshed() {
  let ticker = Arc::new(ManualTicker::new());
  let version = Arc::new(AtomicUsize::new(0));
  let loader_version = version.clone();
  let cache = CacheBuilder::new()
    .refresh_after_write(Duration::from_secs(1))
    .expire_after_write(Duration::from_secs(2))
    .ticker(ticker.clone())
    .loader(move |_key: &i32| loader_version.fetch_add(1, Ordering::SeqCst) + 1)
    .build()
    .unwrap();

  assert_eq!(*cache.get(&1).unwrap(), 1);
  ticker.advance(Duration::from_secs(3));

  // Too old to serve, so the caller waits for a fresh value.
  assert_eq!(*cache.get(&1).unwrap(), 2);
}
