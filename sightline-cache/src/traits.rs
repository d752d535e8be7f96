//! Cache backend trait and statistics.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sightline_core::CacheError;
use std::time::Duration;

/// Cache backend trait for pluggable cache implementations.
///
/// Backends are fallible: a remote or poisoned store reports `CacheError`.
/// Callers never see those errors directly; [`crate::TtlCache`] turns them
/// into misses.
///
/// # Expiry
///
/// Every entry carries its own deadline, fixed at `put` time. A `get` after
/// the deadline must behave as a miss and may drop the entry on the spot.
/// `sweep_expired` removes every dead entry without waiting for access.
///
/// # Concurrency
///
/// Implementations must be safe to share across tasks. Operations on
/// different keys should not serialize behind one global lock.
#[async_trait]
pub trait CacheBackend<K, V>: Send + Sync
where
    K: Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    /// Get a live value, refreshing its recency.
    async fn get(&self, key: &K) -> Result<Option<V>, CacheError>;

    /// Insert or replace a value that expires after `ttl`.
    ///
    /// Inserting past capacity evicts the least recently used entry.
    async fn put(&self, key: K, value: V, ttl: Duration) -> Result<(), CacheError>;

    /// Remove a key. Returns whether an entry was present.
    async fn invalidate(&self, key: &K) -> Result<bool, CacheError>;

    /// Drop every expired entry. Returns how many were removed.
    async fn sweep_expired(&self) -> Result<usize, CacheError>;

    /// Remove every entry.
    async fn clear(&self) -> Result<(), CacheError>;

    /// Number of stored entries, including expired ones not yet swept.
    async fn len(&self) -> Result<usize, CacheError>;

    async fn is_empty(&self) -> Result<bool, CacheError> {
        Ok(self.len().await? == 0)
    }

    /// Get cache statistics.
    async fn stats(&self) -> Result<CacheStats, CacheError>;
}

/// Statistics about cache usage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Number of cache hits.
    pub hits: u64,
    /// Number of cache misses, expired entries included.
    pub misses: u64,
    /// Number of entries currently in cache.
    pub entry_count: u64,
    /// Number of evictions due to capacity.
    pub evictions: u64,
    /// Number of entries dropped because their TTL passed.
    pub expirations: u64,
    /// Number of backend errors absorbed as misses.
    pub faults: u64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
