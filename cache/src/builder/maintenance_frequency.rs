//! Presets for [`CacheBuilder::maintenance_frequency`](crate::CacheBuilder::maintenance_frequency).
//!
//! Each value is the average number of writes per expiry sweep of the
//! written shard. Sweeps only happen on caches with expiration configured.

/// Recommended for most general-purpose workloads.
///
/// Sweeps on roughly one write in 16, which keeps expired entries from
/// lingering in write-heavy shards without noticeable cost per write.
pub const RESPONSIVE: u32 = 16;

/// Recommended for write-heavy workloads where insert throughput is critical.
///
/// Sweeps on roughly one write in 64. Expired entries that are never read
/// again may stay resident a little longer.
pub const THROUGHPUT: u32 = 64;

/// Recommended for very large caches that rely on reads or a janitor to
/// clear expired entries.
///
/// Sweeps on roughly one write in 256.
pub const LOW_OVERHEAD: u32 = 256;
