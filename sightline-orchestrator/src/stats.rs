//! Identify counters.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Running counters for one orchestrator.
#[derive(Debug, Default)]
pub struct IdentifyStats {
    requests: AtomicU64,
    cache_hits: AtomicU64,
    classifier_calls: AtomicU64,
    no_match: AtomicU64,
    classifier_unavailable: AtomicU64,
    enrichment_hits: AtomicU64,
    enrichment_fetches: AtomicU64,
    degraded_results: AtomicU64,
    degraded_upgrades: AtomicU64,
}

impl IdentifyStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_request(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_classifier_call(&self) {
        self.classifier_calls.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_no_match(&self) {
        self.no_match.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_classifier_unavailable(&self) {
        self.classifier_unavailable.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_enrichment_hit(&self) {
        self.enrichment_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_enrichment_fetch(&self) {
        self.enrichment_fetches.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_degraded(&self) {
        self.degraded_results.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_degraded_upgrade(&self) {
        self.degraded_upgrades.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> IdentifyStatsSnapshot {
        IdentifyStatsSnapshot {
            requests: self.requests.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            classifier_calls: self.classifier_calls.load(Ordering::Relaxed),
            no_match: self.no_match.load(Ordering::Relaxed),
            classifier_unavailable: self.classifier_unavailable.load(Ordering::Relaxed),
            enrichment_hits: self.enrichment_hits.load(Ordering::Relaxed),
            enrichment_fetches: self.enrichment_fetches.load(Ordering::Relaxed),
            degraded_results: self.degraded_results.load(Ordering::Relaxed),
            degraded_upgrades: self.degraded_upgrades.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`IdentifyStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentifyStatsSnapshot {
    /// Calls to `identify`
    pub requests: u64,
    /// Requests answered from the fingerprint cache
    pub cache_hits: u64,
    /// Classifier invocations (breaker rejections excluded)
    pub classifier_calls: u64,
    pub no_match: u64,
    pub classifier_unavailable: u64,
    /// Enrichments answered from the result cache
    pub enrichment_hits: u64,
    /// Data source call sequences admitted by the breaker
    pub enrichment_fetches: u64,
    /// Results produced without enrichment
    pub degraded_results: u64,
    /// Cached degraded results later filled in from the result cache
    pub degraded_upgrades: u64,
}

impl IdentifyStatsSnapshot {
    /// Fraction of requests answered from the fingerprint cache.
    pub fn cache_hit_rate(&self) -> f64 {
        if self.requests == 0 {
            0.0
        } else {
            self.cache_hits as f64 / self.requests as f64
        }
    }
}
