mod common;

use common::RemovalLog;
use std::sync::Arc;
use std::time::Duration;

use steep_cache::{BuildError, CacheBuilder, CacheConfig, ConfigError, ManualTicker, RemovalCause};

#[test]
fn test_cache_from_spec_string() {
  let ticker = Arc::new(ManualTicker::new());
  let log = RemovalLog::new();
  let cache = CacheBuilder::<i32, i32>::from_spec("maximumSize=2, expireAfterAccess=2s, recordStats")
    .unwrap()
    .ticker(ticker.clone())
    .removal_listener(log.listener())
    .build()
    .unwrap();

  cache.put_all([(1, 1), (2, 2), (3, 3)]);
  cache.clean_up();
  assert_eq!(cache.estimated_size(), 2);
  assert_eq!(log.take_causes(), vec![(1, RemovalCause::Size)]);

  ticker.advance(Duration::from_secs(2));
  assert!(cache.get_if_present(&2).is_none());
  // One size eviction, then the expired entry the read ran into.
  assert_eq!(cache.stats().eviction_count, 2);
}

#[test]
fn test_invalid_spec_is_rejected() {
  let error = CacheBuilder::<i32, i32>::from_spec("maximumSize=10,weakKeys").unwrap_err();
  assert_eq!(error, ConfigError::UnknownKey("weakKeys".to_string()));
  assert!(error.to_string().contains("weakKeys"));
}

#[test]
fn test_config_is_validated_at_build_time() {
  let result = CacheBuilder::<i32, i32>::from_spec("maximumSize=10,maximumWeight=10")
    .unwrap()
    .build();
  assert!(matches!(result, Err(BuildError::SizeAndWeightBounds)));

  let result = CacheBuilder::<i32, i32>::from_spec("refreshAfterWrite=1m")
    .unwrap()
    .build();
  assert!(matches!(result, Err(BuildError::RefreshWithoutLoader)));

  let result = CacheBuilder::<i32, i32>::from_spec("shards=0").unwrap().build();
  assert!(matches!(result, Err(BuildError::ZeroShards)));

  let result = CacheBuilder::<i32, i32>::new()
    .weigher(|_, _| 1)
    .build();
  assert!(matches!(result, Err(BuildError::WeigherWithoutMaximumWeight)));

  let result = CacheBuilder::<i32, i32>::new().maximum_weight(5).build();
  assert!(matches!(result, Err(BuildError::MaximumWeightWithoutWeigher)));
}

#[test]
fn test_builder_settings_override_config() {
  let config: CacheConfig = "maximumSize=1".parse().unwrap();
  let cache = CacheBuilder::<i32, i32>::from_config(&config)
    .maximum_size(3)
    .build()
    .unwrap();

  cache.put_all([(1, 1), (2, 2), (3, 3)]);
  cache.clean_up();
  assert_eq!(cache.estimated_size(), 3);
}

#[cfg(feature = "serde")]
#[test]
fn test_config_from_json() {
  let config: CacheConfig = serde_json::from_str(
    r#"{
      "maximumSize": 500,
      "expire_after_write": "1m 30s",
      "refreshAfterWrite": "250ms",
      "recordStats": true
    }"#,
  )
  .unwrap();

  assert_eq!(config.maximum_size, Some(500));
  assert_eq!(config.expire_after_write, Some(Duration::from_secs(90)));
  assert_eq!(config.refresh_after_write, Some(Duration::from_millis(250)));
  assert!(config.record_stats);
  assert_eq!(config.expire_after_access, None);

  let unknown = serde_json::from_str::<CacheConfig>(r#"{ "softValues": true }"#);
  assert!(unknown.is_err());

  let bad_duration = serde_json::from_str::<CacheConfig>(r#"{ "expireAfterWrite": "soon" }"#);
  assert!(bad_duration.is_err());
}
