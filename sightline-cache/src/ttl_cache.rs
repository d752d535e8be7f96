//! Miss-on-fault TTL cache.
//!
//! [`TtlCache`] is the only face of the cache layer the orchestrator sees.
//! Backend errors are logged and absorbed: a failed `get` is a miss, a failed
//! `put` or `invalidate` is a no-op.

use std::fmt::Debug;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use sightline_core::{
    CacheConfig, EnrichmentPayload, EntityId, IdentificationResult, ImageFingerprint,
};

use crate::memory::MemoryBackend;
use crate::traits::{CacheBackend, CacheStats};

/// Image fingerprint to finished identification.
pub type FingerprintCache = TtlCache<ImageFingerprint, IdentificationResult>;

/// Entity id to enrichment payload, independent of any image.
pub type ResultCache = TtlCache<EntityId, EnrichmentPayload>;

/// Bounded TTL cache over a pluggable backend.
pub struct TtlCache<K, V>
where
    K: Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    name: String,
    backend: Arc<dyn CacheBackend<K, V>>,
    default_ttl: Duration,
    faults: AtomicU64,
}

impl<K, V> TtlCache<K, V>
where
    K: Debug + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    /// Wrap an existing backend.
    pub fn new(
        name: impl Into<String>,
        backend: Arc<dyn CacheBackend<K, V>>,
        default_ttl: Duration,
    ) -> Self {
        Self {
            name: name.into(),
            backend,
            default_ttl,
            faults: AtomicU64::new(0),
        }
    }

    /// Cache name used in logs and health reports.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// TTL applied by [`TtlCache::put_default`].
    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Get a live value. Backend faults are reported as misses.
    pub async fn get(&self, key: &K) -> Option<V> {
        match self.backend.get(key).await {
            Ok(value) => value,
            Err(e) => {
                self.faults.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(cache = %self.name, key = ?key, error = %e, "Cache get failed, treating as miss");
                None
            }
        }
    }

    /// Insert a value that expires after `ttl`.
    pub async fn put(&self, key: K, value: V, ttl: Duration) {
        if let Err(e) = self.backend.put(key, value, ttl).await {
            self.faults.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(cache = %self.name, error = %e, "Cache put failed, entry dropped");
        }
    }

    /// Insert a value with the cache's default TTL.
    pub async fn put_default(&self, key: K, value: V) {
        self.put(key, value, self.default_ttl).await
    }

    /// Remove a key. Returns whether an entry was removed.
    pub async fn invalidate(&self, key: &K) -> bool {
        match self.backend.invalidate(key).await {
            Ok(removed) => removed,
            Err(e) => {
                self.faults.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(cache = %self.name, key = ?key, error = %e, "Cache invalidate failed");
                false
            }
        }
    }

    /// Drop expired entries. Returns how many were removed.
    pub async fn sweep_expired(&self) -> usize {
        match self.backend.sweep_expired().await {
            Ok(removed) => removed,
            Err(e) => {
                self.faults.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(cache = %self.name, error = %e, "Cache sweep failed");
                0
            }
        }
    }

    pub async fn clear(&self) {
        if let Err(e) = self.backend.clear().await {
            self.faults.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(cache = %self.name, error = %e, "Cache clear failed");
        }
    }

    /// Stored entry count; zero when the backend cannot answer.
    pub async fn len(&self) -> usize {
        self.backend.len().await.unwrap_or(0)
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Backend statistics plus the faults absorbed here.
    pub async fn stats(&self) -> CacheStats {
        let faults = self.faults.load(Ordering::Relaxed);
        match self.backend.stats().await {
            Ok(stats) => CacheStats {
                faults: stats.faults + faults,
                ..stats
            },
            Err(_) => CacheStats {
                faults,
                ..CacheStats::default()
            },
        }
    }
}

impl<K, V> TtlCache<K, V>
where
    K: Hash + Eq + Clone + Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Build a cache over a fresh [`MemoryBackend`] sized by `config`.
    pub fn in_memory(name: impl Into<String>, config: &CacheConfig) -> Self {
        Self::new(
            name,
            Arc::new(MemoryBackend::from_config(config)),
            config.default_ttl,
        )
    }
}
