//! The public faces of a cache.
//!
//! [`Cache`] blocks the calling thread while a load it needs is running;
//! [`AsyncCache`] hands out futures instead. Both are cheap to clone and can
//! be converted into one another, every handle sharing the same entries,
//! loads and statistics.

mod futures;
mod sync;

pub use self::futures::AsyncCache;
pub use self::sync::Cache;
