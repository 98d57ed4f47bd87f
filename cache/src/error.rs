use std::error::Error as StdError;
use std::sync::Arc;

use thiserror::Error;

/// A type-erased error returned by a fallible loader.
pub type BoxError = Box<dyn StdError + Send + Sync>;

/// Errors that can occur when building a cache.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
  /// Both `maximum_size` and `maximum_weight` were configured.
  #[error("maximum size and maximum weight are mutually exclusive")]
  SizeAndWeightBounds,
  /// A weigher was configured without a `maximum_weight` to measure against.
  #[error("a weigher requires a maximum weight")]
  WeigherWithoutMaximumWeight,
  /// A `maximum_weight` was configured without a weigher.
  #[error("a maximum weight requires a weigher")]
  MaximumWeightWithoutWeigher,
  /// `refresh_after_write` was configured but there is no loader to refresh with.
  #[error("refresh after write requires a loader")]
  RefreshWithoutLoader,
  /// The cache was configured with zero shards.
  #[error("shard count cannot be zero")]
  ZeroShards,
  /// An async loader was configured, but no `TaskSpawner` was supplied and
  /// no Tokio runtime is available to fall back on.
  #[error("an async loader requires a task spawner or a running tokio runtime")]
  SpawnerRequired,
  /// The configuration could not be turned into a builder.
  #[error(transparent)]
  Config(#[from] ConfigError),
}

/// Errors produced while parsing a cache configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
  #[error("unknown configuration key '{0}'")]
  UnknownKey(String),

  #[error("configuration key '{0}' was specified more than once")]
  DuplicateKey(String),

  #[error("configuration key '{key}' requires a value")]
  MissingValue { key: String },

  #[error("configuration key '{key}' does not take a value")]
  UnexpectedValue { key: String },

  #[error("invalid value '{value}' for '{key}': {reason}")]
  InvalidValue {
    key: String,
    value: String,
    reason: String,
  },
}

/// The error delivered to every caller awaiting a failed load.
///
/// It is cheap to clone so a single failure can be handed to each waiter of
/// the same in-flight load.
#[derive(Debug, Clone, Error)]
pub enum LoadError {
  /// The loader returned an error.
  #[error("loader failed: {0}")]
  Failed(Arc<dyn StdError + Send + Sync>),
  /// The loader panicked. The payload message is preserved when it is a string.
  #[error("loader panicked: {0}")]
  Panicked(String),
  /// The task driving the load was dropped before it produced a value.
  #[error("load was abandoned before completion")]
  Abandoned,
  /// A loading lookup was made on a cache built without a loader.
  #[error("no loader is configured for this cache")]
  MissingLoader,
}

impl LoadError {
  pub(crate) fn failed(error: impl Into<BoxError>) -> Self {
    LoadError::Failed(Arc::from(error.into()))
  }

  pub(crate) fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
    LoadError::Panicked(panic_message(payload.as_ref()))
  }
}

/// Describes a removal listener that panicked while handling a notification.
///
/// The failure is isolated from the cache operation that triggered it and is
/// only ever logged.
#[derive(Debug, Clone, Error)]
#[error("removal listener panicked: {message}")]
pub struct ListenerError {
  pub message: String,
}

impl ListenerError {
  pub(crate) fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
    Self {
      message: panic_message(payload.as_ref()),
    }
  }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
  if let Some(message) = payload.downcast_ref::<&str>() {
    (*message).to_string()
  } else if let Some(message) = payload.downcast_ref::<String>() {
    message.clone()
  } else {
    "non-string panic payload".to_string()
  }
}
