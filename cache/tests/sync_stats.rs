use std::time::Duration;

use steep_cache::{CacheBuilder, CacheStats};

#[test]
fn test_hits_misses_and_loads() {
  let cache = CacheBuilder::new()
    .record_stats()
    .loader(|key: &i32| {
      std::thread::sleep(Duration::from_millis(2));
      key.to_string()
    })
    .build()
    .unwrap();

  for _ in 0..11 {
    assert_eq!(*cache.get(&7).unwrap(), "7");
  }

  let stats = cache.stats();
  assert_eq!(stats.hit_count, 10);
  assert_eq!(stats.miss_count, 1);
  assert_eq!(stats.load_success_count, 1);
  assert_eq!(stats.load_failure_count, 0);
  assert_eq!(stats.request_count(), 11);
  assert!((stats.hit_rate() - 10.0 / 11.0).abs() < 1e-9);
  assert!(stats.total_load_time >= Duration::from_millis(2));
  assert_eq!(stats.average_load_penalty(), stats.total_load_time);
}

#[test]
fn test_lookups_without_a_load_count_only_hits() {
  let cache = CacheBuilder::<i32, i32>::new().record_stats().build().unwrap();
  cache.put(1, 1);

  cache.get_if_present(&1);
  cache.get_if_present(&2);
  cache.get_if_present(&3);
  assert!(cache.get(&4).is_err());

  let stats = cache.stats();
  assert_eq!(stats.hit_count, 1);
  assert_eq!(stats.miss_count, 0);
  assert_eq!(stats.load_count(), 0);
}

#[test]
fn test_load_failures_are_counted_and_not_cached() {
  let cache = CacheBuilder::new()
    .record_stats()
    .try_loader(|_key: &i32| -> Result<i32, std::io::Error> {
      Err(std::io::Error::other("unreachable backend"))
    })
    .build()
    .unwrap();

  assert!(cache.get(&1).is_err());
  assert!(cache.get(&1).is_err());

  let stats = cache.stats();
  assert_eq!(stats.miss_count, 2);
  assert_eq!(stats.load_failure_count, 2);
  assert_eq!(stats.load_failure_rate(), 1.0);
  assert_eq!(cache.estimated_size(), 0);
}

#[test]
fn test_stats_are_off_by_default() {
  let cache = CacheBuilder::new()
    .maximum_size(1)
    .loader(|key: &i32| *key)
    .build()
    .unwrap();

  cache.get(&1).unwrap();
  cache.get(&1).unwrap();
  cache.get(&2).unwrap();

  assert_eq!(cache.stats(), CacheStats::default());
}

#[test]
fn test_snapshots_are_independent() {
  let cache = CacheBuilder::<i32, i32>::new().record_stats().build().unwrap();
  cache.put(1, 1);

  let before = cache.stats();
  cache.get_if_present(&1);
  cache.get_if_present(&1);
  let after = cache.stats();

  assert_eq!(before.hit_count, 0);
  assert_eq!(after.hit_count, 2);

  let delta = after.minus(&before);
  assert_eq!(delta.hit_count, 2);
  assert_eq!(delta.plus(&before), after);
}
