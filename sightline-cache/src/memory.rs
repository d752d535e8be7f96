//! Sharded in-memory LRU backend.
//!
//! Keys hash onto a fixed set of shards, each an `lru::LruCache` behind its
//! own mutex, so unrelated keys rarely contend. Capacity is enforced over the
//! whole cache: an insert evicts only when the total would exceed capacity,
//! and the victim is the least recently used entry across every shard.

use std::collections::hash_map::RandomState;
use std::hash::{BuildHasher, Hash};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use lru::LruCache;
use sightline_core::{CacheConfig, CacheError};
use tokio::time::Instant;

use crate::traits::{CacheBackend, CacheStats};

/// Lifetime used when `now + ttl` overflows the clock.
const FAR_FUTURE: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

struct CacheEntry<V> {
    value: V,
    expires_at: Instant,
    /// Global access tick; lower is older.
    touched: u64,
}

impl<V> CacheEntry<V> {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

type Shard<K, V> = LruCache<K, CacheEntry<V>>;

/// In-memory TTL + LRU cache backend.
pub struct MemoryBackend<K, V> {
    shards: Vec<Mutex<Shard<K, V>>>,
    hasher: RandomState,
    capacity: usize,
    /// Entries across all shards. Only changed while holding a shard lock.
    entries: AtomicUsize,
    ticks: AtomicU64,
    /// Serializes capacity enforcement so concurrent inserts never evict
    /// below capacity.
    evicting: Mutex<()>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    expirations: AtomicU64,
}

impl<K, V> MemoryBackend<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    /// Create a backend holding at most `capacity` entries over `shards` shards.
    ///
    /// Zero values are raised to one. The shard count never exceeds `capacity`.
    pub fn new(capacity: usize, shards: usize) -> Self {
        let capacity = capacity.max(1);
        let shard_count = shards.clamp(1, capacity);

        Self {
            shards: (0..shard_count)
                .map(|_| Mutex::new(LruCache::unbounded()))
                .collect(),
            hasher: RandomState::new(),
            capacity,
            entries: AtomicUsize::new(0),
            ticks: AtomicU64::new(0),
            evicting: Mutex::new(()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            expirations: AtomicU64::new(0),
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.capacity, config.shards)
    }

    /// Maximum number of entries across all shards.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    fn tick(&self) -> u64 {
        self.ticks.fetch_add(1, Ordering::Relaxed)
    }

    fn lock_shard(&self, index: usize) -> Result<MutexGuard<'_, Shard<K, V>>, CacheError> {
        self.shards[index]
            .lock()
            .map_err(|_| CacheError::LockPoisoned)
    }

    fn shard_for(&self, key: &K) -> Result<MutexGuard<'_, Shard<K, V>>, CacheError> {
        let index = (self.hasher.hash_one(key) % self.shards.len() as u64) as usize;
        self.lock_shard(index)
    }

    fn lookup(&self, key: &K) -> Result<Option<V>, CacheError> {
        let now = Instant::now();
        let mut shard = self.shard_for(key)?;

        let expired = match shard.get_mut(key) {
            Some(entry) if entry.is_live(now) => {
                entry.touched = self.tick();
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Ok(Some(entry.value.clone()));
            }
            Some(_) => true,
            None => false,
        };

        if expired && shard.pop(key).is_some() {
            self.entries.fetch_sub(1, Ordering::Relaxed);
            self.expirations.fetch_add(1, Ordering::Relaxed);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        Ok(None)
    }

    fn insert(&self, key: K, value: V, ttl: Duration) -> Result<(), CacheError> {
        let now = Instant::now();
        let expires_at = now
            .checked_add(ttl)
            .unwrap_or_else(|| now + FAR_FUTURE);

        {
            let mut shard = self.shard_for(&key)?;
            let entry = CacheEntry {
                value,
                expires_at,
                touched: self.tick(),
            };
            if shard.put(key, entry).is_none() {
                self.entries.fetch_add(1, Ordering::Relaxed);
            }
        }

        self.enforce_capacity()
    }

    /// Evict globally least recently used entries until within capacity.
    fn enforce_capacity(&self) -> Result<(), CacheError> {
        if self.entries.load(Ordering::Relaxed) <= self.capacity {
            return Ok(());
        }
        let _evicting = self.evicting.lock().map_err(|_| CacheError::LockPoisoned)?;

        while self.entries.load(Ordering::Relaxed) > self.capacity {
            // Shard locks are taken one at a time, never nested.
            let mut oldest: Option<(usize, u64)> = None;
            for index in 0..self.shards.len() {
                let shard = self.lock_shard(index)?;
                if let Some((_, entry)) = shard.peek_lru() {
                    if oldest.map_or(true, |(_, touched)| entry.touched < touched) {
                        oldest = Some((index, entry.touched));
                    }
                }
            }

            let Some((index, touched)) = oldest else {
                break;
            };
            let mut shard = self.lock_shard(index)?;
            // A concurrent get may have refreshed the tail; rescan if so.
            if shard.peek_lru().is_some_and(|(_, e)| e.touched == touched)
                && shard.pop_lru().is_some()
            {
                self.entries.fetch_sub(1, Ordering::Relaxed);
                self.evictions.fetch_add(1, Ordering::Relaxed);
            }
        }
        Ok(())
    }

    fn remove(&self, key: &K) -> Result<bool, CacheError> {
        let mut shard = self.shard_for(key)?;
        let removed = shard.pop(key).is_some();
        if removed {
            self.entries.fetch_sub(1, Ordering::Relaxed);
        }
        Ok(removed)
    }

    fn sweep(&self) -> Result<usize, CacheError> {
        let now = Instant::now();
        let mut removed = 0;

        for index in 0..self.shards.len() {
            let mut shard = self.lock_shard(index)?;
            let dead: Vec<K> = shard
                .iter()
                .filter(|(_, entry)| !entry.is_live(now))
                .map(|(key, _)| key.clone())
                .collect();
            for key in &dead {
                if shard.pop(key).is_some() {
                    self.entries.fetch_sub(1, Ordering::Relaxed);
                    removed += 1;
                }
            }
        }

        self.expirations.fetch_add(removed as u64, Ordering::Relaxed);
        Ok(removed)
    }

    fn purge(&self) -> Result<(), CacheError> {
        for index in 0..self.shards.len() {
            let mut shard = self.lock_shard(index)?;
            self.entries.fetch_sub(shard.len(), Ordering::Relaxed);
            shard.clear();
        }
        Ok(())
    }

    fn entry_count(&self) -> Result<usize, CacheError> {
        let mut total = 0;
        for index in 0..self.shards.len() {
            total += self.lock_shard(index)?.len();
        }
        Ok(total)
    }
}

#[async_trait]
impl<K, V> CacheBackend<K, V> for MemoryBackend<K, V>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    async fn get(&self, key: &K) -> Result<Option<V>, CacheError> {
        self.lookup(key)
    }

    async fn put(&self, key: K, value: V, ttl: Duration) -> Result<(), CacheError> {
        self.insert(key, value, ttl)
    }

    async fn invalidate(&self, key: &K) -> Result<bool, CacheError> {
        self.remove(key)
    }

    async fn sweep_expired(&self) -> Result<usize, CacheError> {
        self.sweep()
    }

    async fn clear(&self) -> Result<(), CacheError> {
        self.purge()
    }

    async fn len(&self) -> Result<usize, CacheError> {
        self.entry_count()
    }

    async fn stats(&self) -> Result<CacheStats, CacheError> {
        Ok(CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entry_count: self.entry_count()? as u64,
            evictions: self.evictions.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
            faults: 0,
        })
    }
}


#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// The cache never holds more live entries than its capacity.
        #[test]
        fn prop_len_bounded_by_capacity(
            capacity in 1usize..64,
            shards in 1usize..8,
            keys in prop::collection::vec(0u32..512, 0..256)
        ) {
            let backend: MemoryBackend<u32, u32> = MemoryBackend::new(capacity, shards);
            for key in keys {
                backend.insert(key, key, Duration::from_secs(60)).unwrap();
            }
            prop_assert!(backend.entry_count().unwrap() <= capacity);
        }

        /// Nothing is evicted until the cache holds `capacity` entries.
        #[test]
        fn prop_no_eviction_below_capacity(
            capacity in 1usize..64,
            shards in 1usize..16
        ) {
            let backend: MemoryBackend<u32, u32> = MemoryBackend::new(capacity, shards);
            for key in 0..capacity as u32 {
                backend.insert(key, key, Duration::from_secs(60)).unwrap();
            }
            prop_assert_eq!(backend.entry_count().unwrap(), capacity);
            prop_assert_eq!(backend.evictions.load(Ordering::Relaxed), 0);
        }

        /// The most recent insert is always retrievable.
        #[test]
        fn prop_last_insert_survives(
            capacity in 1usize..32,
            shards in 1usize..8,
            keys in prop::collection::vec(0u32..128, 1..128)
        ) {
            let backend: MemoryBackend<u32, u32> = MemoryBackend::new(capacity, shards);
            let last = *keys.last().unwrap();
            for key in keys {
                backend.insert(key, key * 2, Duration::from_secs(60)).unwrap();
            }
            prop_assert_eq!(backend.lookup(&last).unwrap(), Some(last * 2));
        }
    }
}
