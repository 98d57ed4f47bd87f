//! A concurrent, bounded, time-aware in-process cache with synchronous and
//! asynchronous loading.
//!
//! # Features
//! - **High Concurrency**: Built with a sharded architecture to minimize lock contention.
//! - **Sync & Async**: [`Cache`] blocks for loads, [`AsyncCache`] hands out futures.
//!   Both share one core and convert into each other for free.
//! - **Load Collapsing**: Concurrent lookups of a missing key run the loader
//!   once and all observe the same value or the same error.
//! - **Bounds**: A maximum entry count, or a maximum total weight computed by
//!   a weigher, enforced with least-recently-used eviction.
//! - **Expiration & Refresh**: Expire after write or after access; refresh
//!   stale entries in the background while still serving them.
//! - **Observability**: Removal notifications with a [`RemovalCause`], and
//!   opt-in [`CacheStats`].
//! - **Non-Clone Support**: Stores values in an `Arc<V>`, avoiding `V: Clone` bounds.
//!
//! ```
//! use steep_cache::{CacheBuilder, RemovalCause};
//! use std::sync::Arc;
//!
//! let cache = CacheBuilder::new()
//!   .maximum_size(1)
//!   .record_stats()
//!   .removal_listener(|key: u32, _value: Arc<String>, cause: RemovalCause| {
//!     println!("{key} left the cache: {cause}");
//!   })
//!   .loader(|key: &u32| format!("value-{key}"))
//!   .build()
//!   .unwrap();
//!
//! assert_eq!(*cache.get(&1).unwrap(), "value-1");
//! assert_eq!(*cache.get(&2).unwrap(), "value-2");
//! assert!(cache.get_if_present(&1).is_none());
//! assert_eq!(cache.stats().miss_count, 2);
//! ```

// Public modules that form the API
pub mod builder;
pub mod config;
pub mod error;
pub mod handles;
pub mod listener;
pub mod runtime;
pub mod stats;
pub mod time;

// Internal, crate-only modules
mod entry;
mod expiry;
mod loader;
mod maintenance;
mod notifier;
mod policy;
mod rng;
mod shared;
mod store;
mod view;

// Re-export the primary user-facing types for convenience
pub use builder::CacheBuilder;
pub use config::CacheConfig;
pub use error::{BoxError, BuildError, ConfigError, ListenerError, LoadError};
pub use handles::{AsyncCache, Cache};
pub use listener::{RemovalCause, RemovalListener};
pub use loader::LoadHandle;
#[cfg(feature = "tokio")]
pub use runtime::TokioSpawner;
pub use runtime::{TaskSpawner, ThreadSpawner};
pub use stats::CacheStats;
pub use time::{ManualTicker, SystemTicker, Ticker};
pub use view::MapView;
