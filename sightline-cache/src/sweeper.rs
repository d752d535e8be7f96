//! Background expiry sweep.
//!
//! Expired entries are dropped lazily on access, but keys that are never read
//! again would sit in memory until evicted by capacity. This task removes them
//! on a fixed interval until shutdown.

use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};

use crate::ttl_cache::TtlCache;

// ============================================================================
// METRICS
// ============================================================================

/// Counters for one sweep task.
#[derive(Debug, Default)]
pub struct SweepMetrics {
    /// Sweep cycles completed
    pub sweep_cycles: AtomicU64,

    /// Entries removed across all cycles
    pub entries_expired: AtomicU64,
}

impl SweepMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get current snapshot of all metrics.
    pub fn snapshot(&self) -> SweepSnapshot {
        SweepSnapshot {
            sweep_cycles: self.sweep_cycles.load(Ordering::Relaxed),
            entries_expired: self.entries_expired.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of sweep metrics at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepSnapshot {
    pub sweep_cycles: u64,
    pub entries_expired: u64,
}

// ============================================================================
// BACKGROUND TASK
// ============================================================================

/// Periodically sweep expired entries from `cache` until `shutdown_rx` reads `true`.
///
/// # Example
///
/// ```ignore
/// let (shutdown_tx, shutdown_rx) = watch::channel(false);
/// let handle = tokio::spawn(cache_sweep_task(cache, Duration::from_secs(60), shutdown_rx));
///
/// // Later, trigger shutdown
/// let _ = shutdown_tx.send(true);
/// let metrics = handle.await?;
/// ```
pub async fn cache_sweep_task<K, V>(
    cache: Arc<TtlCache<K, V>>,
    period: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Arc<SweepMetrics>
where
    K: Debug + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    let metrics = Arc::new(SweepMetrics::new());

    let mut sweep_interval = interval(period);
    sweep_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    tracing::info!(
        cache = %cache.name(),
        interval_secs = period.as_secs(),
        "Cache sweep task started"
    );

    loop {
        tokio::select! {
            changed = shutdown_rx.changed() => {
                // A dropped sender also ends the task.
                if changed.is_err() || *shutdown_rx.borrow() {
                    tracing::info!(cache = %cache.name(), "Cache sweep task shutting down");
                    break;
                }
            }

            _ = sweep_interval.tick() => {
                sweep_once(&cache, &metrics).await;
            }
        }
    }

    let snapshot = metrics.snapshot();
    tracing::info!(
        cache = %cache.name(),
        sweep_cycles = snapshot.sweep_cycles,
        entries_expired = snapshot.entries_expired,
        "Cache sweep task completed"
    );

    metrics
}

async fn sweep_once<K, V>(cache: &TtlCache<K, V>, metrics: &SweepMetrics)
where
    K: Debug + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    metrics.sweep_cycles.fetch_add(1, Ordering::Relaxed);
    let removed = cache.sweep_expired().await;
    metrics
        .entries_expired
        .fetch_add(removed as u64, Ordering::Relaxed);

    if removed > 0 {
        tracing::debug!(cache = %cache.name(), removed, "Cache sweep removed expired entries");
    } else {
        tracing::trace!(cache = %cache.name(), "Cache sweep found nothing to remove");
    }
}
