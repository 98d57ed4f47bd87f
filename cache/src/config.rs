//! Declarative cache configuration.
//!
//! A [`CacheConfig`] holds the options that can be expressed without code:
//! bounds, expiration, refresh and statistics. Weighers, loaders and
//! listeners are still attached through the [`CacheBuilder`](crate::CacheBuilder).
//!
//! Configurations can be parsed from a compact spec string:
//!
//! ```
//! use std::time::Duration;
//! use steep_cache::CacheConfig;
//!
//! let config: CacheConfig = "maximumSize=100,expireAfterAccess=2s,recordStats".parse().unwrap();
//! assert_eq!(config.maximum_size, Some(100));
//! assert_eq!(config.expire_after_access, Some(Duration::from_secs(2)));
//! assert!(config.record_stats);
//! ```
//!
//! With the `serde` feature they can also be deserialized, with durations
//! written in human-readable form (`"2s"`, `"150ms"`, `"1h 30m"`).

use crate::error::ConfigError;

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// The options of a cache that can be configured without code.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default, deny_unknown_fields))]
pub struct CacheConfig {
  #[cfg_attr(feature = "serde", serde(alias = "initialCapacity"))]
  pub initial_capacity: Option<usize>,
  #[cfg_attr(feature = "serde", serde(alias = "maximumSize"))]
  pub maximum_size: Option<u64>,
  #[cfg_attr(feature = "serde", serde(alias = "maximumWeight"))]
  pub maximum_weight: Option<u64>,
  #[cfg_attr(
    feature = "serde",
    serde(alias = "expireAfterWrite", deserialize_with = "human_duration::deserialize")
  )]
  pub expire_after_write: Option<Duration>,
  #[cfg_attr(
    feature = "serde",
    serde(alias = "expireAfterAccess", deserialize_with = "human_duration::deserialize")
  )]
  pub expire_after_access: Option<Duration>,
  #[cfg_attr(
    feature = "serde",
    serde(alias = "refreshAfterWrite", deserialize_with = "human_duration::deserialize")
  )]
  pub refresh_after_write: Option<Duration>,
  #[cfg_attr(feature = "serde", serde(alias = "recordStats"))]
  pub record_stats: bool,
  pub shards: Option<usize>,
  #[cfg_attr(
    feature = "serde",
    serde(alias = "janitorTickInterval", deserialize_with = "human_duration::deserialize")
  )]
  pub janitor_tick_interval: Option<Duration>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Key {
  InitialCapacity,
  MaximumSize,
  MaximumWeight,
  ExpireAfterWrite,
  ExpireAfterAccess,
  RefreshAfterWrite,
  RecordStats,
  Shards,
  JanitorTickInterval,
}

impl Key {
  fn parse(name: &str) -> Option<Self> {
    let key = match name {
      "initialCapacity" | "initial_capacity" => Key::InitialCapacity,
      "maximumSize" | "maximum_size" => Key::MaximumSize,
      "maximumWeight" | "maximum_weight" => Key::MaximumWeight,
      "expireAfterWrite" | "expire_after_write" => Key::ExpireAfterWrite,
      "expireAfterAccess" | "expire_after_access" => Key::ExpireAfterAccess,
      "refreshAfterWrite" | "refresh_after_write" => Key::RefreshAfterWrite,
      "recordStats" | "record_stats" => Key::RecordStats,
      "shards" => Key::Shards,
      "janitorTickInterval" | "janitor_tick_interval" => Key::JanitorTickInterval,
      _ => return None,
    };
    Some(key)
  }
}

fn parse_number<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError>
where
  T::Err: fmt::Display,
{
  value.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
    key: key.to_string(),
    value: value.to_string(),
    reason: e.to_string(),
  })
}

fn parse_duration(key: &str, value: &str) -> Result<Duration, ConfigError> {
  humantime::parse_duration(value).map_err(|e| ConfigError::InvalidValue {
    key: key.to_string(),
    value: value.to_string(),
    reason: e.to_string(),
  })
}

impl FromStr for CacheConfig {
  type Err = ConfigError;

  /// Parses a comma separated list of `key=value` pairs.
  ///
  /// Keys may be camelCase or snake_case. `recordStats` takes no value.
  /// Blank specs yield the default configuration.
  fn from_str(spec: &str) -> Result<Self, Self::Err> {
    let mut config = CacheConfig::default();
    let mut seen = HashSet::new();

    for option in spec.split(',').map(str::trim).filter(|o| !o.is_empty()) {
      let (name, value) = match option.split_once('=') {
        Some((name, value)) => (name.trim(), Some(value.trim())),
        None => (option, None),
      };
      let key = Key::parse(name).ok_or_else(|| ConfigError::UnknownKey(name.to_string()))?;
      if !seen.insert(key) {
        return Err(ConfigError::DuplicateKey(name.to_string()));
      }

      if key == Key::RecordStats {
        if value.is_some() {
          return Err(ConfigError::UnexpectedValue {
            key: name.to_string(),
          });
        }
        config.record_stats = true;
        continue;
      }

      let value = value
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ConfigError::MissingValue {
          key: name.to_string(),
        })?;
      match key {
        Key::InitialCapacity => config.initial_capacity = Some(parse_number(name, value)?),
        Key::MaximumSize => config.maximum_size = Some(parse_number(name, value)?),
        Key::MaximumWeight => config.maximum_weight = Some(parse_number(name, value)?),
        Key::ExpireAfterWrite => config.expire_after_write = Some(parse_duration(name, value)?),
        Key::ExpireAfterAccess => config.expire_after_access = Some(parse_duration(name, value)?),
        Key::RefreshAfterWrite => config.refresh_after_write = Some(parse_duration(name, value)?),
        Key::Shards => config.shards = Some(parse_number(name, value)?),
        Key::JanitorTickInterval => {
          config.janitor_tick_interval = Some(parse_duration(name, value)?)
        }
        Key::RecordStats => {}
      }
    }

    Ok(config)
  }
}

/// Renders the configuration as a spec string that parses back to itself.
impl fmt::Display for CacheConfig {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let mut parts = Vec::new();
    if let Some(n) = self.initial_capacity {
      parts.push(format!("initialCapacity={n}"));
    }
    if let Some(n) = self.maximum_size {
      parts.push(format!("maximumSize={n}"));
    }
    if let Some(n) = self.maximum_weight {
      parts.push(format!("maximumWeight={n}"));
    }
    let durations = [
      ("expireAfterWrite", self.expire_after_write),
      ("expireAfterAccess", self.expire_after_access),
      ("refreshAfterWrite", self.refresh_after_write),
    ];
    for (name, duration) in durations {
      if let Some(d) = duration {
        parts.push(format!("{name}={}", humantime::format_duration(d)));
      }
    }
    if self.record_stats {
      parts.push("recordStats".to_string());
    }
    if let Some(n) = self.shards {
      parts.push(format!("shards={n}"));
    }
    if let Some(d) = self.janitor_tick_interval {
      parts.push(format!("janitorTickInterval={}", humantime::format_duration(d)));
    }
    f.write_str(&parts.join(","))
  }
}

#[cfg(feature = "serde")]
mod human_duration {
  use serde::{Deserialize, Deserializer};
  use std::time::Duration;

  pub(super) fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
  where
    D: Deserializer<'de>,
  {
    let text: Option<String> = Option::deserialize(deserializer)?;
    text
      .map(|text| humantime::parse_duration(&text).map_err(serde::de::Error::custom))
      .transpose()
  }
}
