//! SIGHTLINE Cache - bounded TTL caches for recognition results
//!
//! Two caches sit in front of the remote dependencies:
//!
//! - [`FingerprintCache`]: image fingerprint to finished identification
//! - [`ResultCache`]: entity id to enrichment payload
//!
//! Both are [`TtlCache`]s over a [`CacheBackend`]. The default backend,
//! [`MemoryBackend`], is a sharded LRU with per-entry deadlines. Cache faults
//! never reach callers: a broken backend reads as an empty cache.
//!
//! [`KeyedCoalescer`] serializes work per key so concurrent misses for the
//! same key do the work once, and [`cache_sweep_task`] clears expired entries
//! in the background.

mod coalesce;
mod memory;
mod sweeper;
mod traits;
mod ttl_cache;

pub use coalesce::{CoalesceGuard, KeyedCoalescer};
pub use memory::MemoryBackend;
pub use sweeper::{cache_sweep_task, SweepMetrics, SweepSnapshot};
pub use traits::{CacheBackend, CacheStats};
pub use ttl_cache::{FingerprintCache, ResultCache, TtlCache};
