//! SIGHTLINE Test Utilities
//!
//! Centralized test infrastructure for the SIGHTLINE workspace:
//! - Scripted classifier and data source with call counters
//! - A cache backend that can be switched into a failing state
//! - Proptest generators for the recognition data model
//! - Test fixtures for common scenarios
//! - Custom assertions for identify outcomes

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

// Re-export core types for convenience
pub use sightline_core::{
    BreakerConfig, CacheConfig, CacheError, Candidate, ClassifierError, DataSourceError,
    Degradation, EnrichmentPayload, EntityId, IdentificationResult, IdentifyError,
    IdentifyPolicy, ImageFingerprint, ModelInfo, RetryConfig, SightlineConfig,
};
pub use sightline_cache::{CacheBackend, CacheStats, MemoryBackend};
pub use sightline_providers::{Classifier, DataSource};

// ============================================================================
// SCRIPTED CLASSIFIER
// ============================================================================

type ClassifierReply = Result<Vec<Candidate>, ClassifierError>;

/// Classifier that replays queued replies, then repeats a fallback.
///
/// Every `predict` call is counted, including ones that fail.
#[derive(Debug)]
pub struct ScriptedClassifier {
    script: Mutex<VecDeque<ClassifierReply>>,
    fallback: Mutex<ClassifierReply>,
    latency: Duration,
    calls: AtomicUsize,
}

impl ScriptedClassifier {
    /// Always answer with `candidates`.
    pub fn always(candidates: Vec<Candidate>) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: Mutex::new(Ok(candidates)),
            latency: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    /// Always fail with `error`.
    pub fn failing(error: ClassifierError) -> Self {
        Self {
            fallback: Mutex::new(Err(error)),
            ..Self::always(Vec::new())
        }
    }

    /// Wait `latency` before answering.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Queue a one-off reply ahead of the fallback.
    pub fn push_reply(&self, reply: ClassifierReply) {
        self.script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(reply);
    }

    /// Replace the fallback reply.
    pub fn set_fallback(&self, reply: ClassifierReply) {
        *self.fallback.lock().unwrap_or_else(|e| e.into_inner()) = reply;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Classifier for ScriptedClassifier {
    async fn predict(&self, _image_bytes: &[u8]) -> Result<Vec<Candidate>, ClassifierError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let queued = self
            .script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();
        match queued {
            Some(reply) => reply,
            None => self.fallback.lock().unwrap_or_else(|e| e.into_inner()).clone(),
        }
    }

    fn model_info(&self) -> ModelInfo {
        ModelInfo {
            name: "Scripted Classifier".to_string(),
            version: "scripted-v1".to_string(),
            num_classes: 0,
        }
    }
}

// ============================================================================
// SCRIPTED DATA SOURCE
// ============================================================================

type FetchReply = Result<EnrichmentPayload, DataSourceError>;

/// Data source backed by a map, with injectable failures and latency.
///
/// Reply order: queued replies first, then the persistent failure if one is
/// set, then the entity map (`NotFound` for unknown ids).
#[derive(Debug, Default)]
pub struct ScriptedDataSource {
    entities: HashMap<EntityId, EnrichmentPayload>,
    script: Mutex<VecDeque<FetchReply>>,
    failure: Mutex<Option<DataSourceError>>,
    latency: Duration,
    fetches: AtomicUsize,
}

impl ScriptedDataSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entity(mut self, entity_id: EntityId, payload: EnrichmentPayload) -> Self {
        self.entities.insert(entity_id, payload);
        self
    }

    /// Wait `latency` before every reply. Longer than the enrichment timeout
    /// makes every fetch time out.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Fail every fetch with `error` until [`Self::recover`] is called.
    pub fn fail_with(&self, error: DataSourceError) {
        *self.failure.lock().unwrap_or_else(|e| e.into_inner()) = Some(error);
    }

    pub fn recover(&self) {
        *self.failure.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }

    /// Queue a one-off reply.
    pub fn push_reply(&self, reply: FetchReply) {
        self.script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(reply);
    }

    /// Number of `fetch` calls, retries included.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DataSource for ScriptedDataSource {
    async fn fetch(&self, entity_id: EntityId) -> Result<EnrichmentPayload, DataSourceError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let queued = self
            .script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();
        if let Some(reply) = queued {
            return reply;
        }
        if let Some(error) = self.failure.lock().unwrap_or_else(|e| e.into_inner()).clone() {
            return Err(error);
        }
        self.entities
            .get(&entity_id)
            .cloned()
            .ok_or(DataSourceError::NotFound { entity_id })
    }

    fn source_id(&self) -> &str {
        "scripted"
    }
}

// ============================================================================
// FAULTY CACHE BACKEND
// ============================================================================

/// Memory backend that fails every operation while switched to failing.
pub struct FaultyBackend<K, V> {
    inner: MemoryBackend<K, V>,
    failing: AtomicBool,
}

impl<K, V> FaultyBackend<K, V>
where
    K: std::hash::Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Start in the failing state.
    pub fn broken(capacity: usize) -> Self {
        Self {
            inner: MemoryBackend::new(capacity, 1),
            failing: AtomicBool::new(true),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), CacheError> {
        if self.failing.load(Ordering::SeqCst) {
            Err(CacheError::Backend {
                reason: "injected fault".to_string(),
            })
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl<K, V> CacheBackend<K, V> for FaultyBackend<K, V>
where
    K: std::hash::Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    async fn get(&self, key: &K) -> Result<Option<V>, CacheError> {
        self.check()?;
        self.inner.get(key).await
    }

    async fn put(&self, key: K, value: V, ttl: Duration) -> Result<(), CacheError> {
        self.check()?;
        self.inner.put(key, value, ttl).await
    }

    async fn invalidate(&self, key: &K) -> Result<bool, CacheError> {
        self.check()?;
        self.inner.invalidate(key).await
    }

    async fn sweep_expired(&self) -> Result<usize, CacheError> {
        self.check()?;
        self.inner.sweep_expired().await
    }

    async fn clear(&self) -> Result<(), CacheError> {
        self.check()?;
        self.inner.clear().await
    }

    async fn len(&self) -> Result<usize, CacheError> {
        self.check()?;
        self.inner.len().await
    }

    async fn stats(&self) -> Result<CacheStats, CacheError> {
        self.check()?;
        self.inner.stats().await
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for generating SIGHTLINE data model values.

    use super::*;
    use proptest::prelude::*;

    /// Generate a confidence score in [0, 1].
    pub fn arb_confidence() -> impl Strategy<Value = f32> {
        0.0f32..=1.0
    }

    pub fn arb_candidate() -> impl Strategy<Value = Candidate> {
        (1i64..1000, "[a-z]{3,12}", arb_confidence())
            .prop_map(|(id, label, confidence)| Candidate::new(id, label, confidence))
    }

    /// Generate classifier output: distinct ids, descending confidence.
    pub fn arb_ranked_candidates(max_len: usize) -> impl Strategy<Value = Vec<Candidate>> {
        prop::collection::vec(arb_confidence(), 0..=max_len).prop_map(|mut scores| {
            scores.sort_by(|a, b| b.total_cmp(a));
            scores
                .into_iter()
                .enumerate()
                .map(|(i, score)| Candidate::new(i as EntityId + 1, format!("entity-{}", i + 1), score))
                .collect()
        })
    }

    /// Generate non-empty image bytes.
    pub fn arb_image_bytes() -> impl Strategy<Value = Vec<u8>> {
        prop::collection::vec(any::<u8>(), 1..2048)
    }

    pub fn arb_fingerprint() -> impl Strategy<Value = ImageFingerprint> {
        any::<[u8; 32]>().prop_map(ImageFingerprint::from_bytes)
    }

    pub fn arb_policy() -> impl Strategy<Value = IdentifyPolicy> {
        (arb_confidence(), 0usize..6).prop_map(|(threshold, max)| {
            IdentifyPolicy::default()
                .with_confidence_threshold(threshold)
                .with_max_alternatives(max)
        })
    }

    pub fn arb_breaker_config() -> impl Strategy<Value = BreakerConfig> {
        (1u32..20, 1u64..300).prop_map(|(threshold, reset_secs)| {
            BreakerConfig::new(threshold, Duration::from_secs(reset_secs))
        })
    }

    pub fn arb_retry_config() -> impl Strategy<Value = RetryConfig> {
        (0u32..6, 1u64..1000, 1u64..10, 1.0f32..4.0).prop_map(
            |(max_retries, initial_ms, factor, backoff_multiplier)| RetryConfig {
                max_retries,
                initial_backoff: Duration::from_millis(initial_ms),
                max_backoff: Duration::from_millis(initial_ms * factor),
                backoff_multiplier,
            },
        )
    }

    pub fn arb_cache_config() -> impl Strategy<Value = CacheConfig> {
        (1usize..64, 1usize..10_000, 1u64..7200).prop_map(|(shards, extra, ttl_secs)| {
            CacheConfig::new(shards + extra, Duration::from_secs(ttl_secs)).with_shards(shards)
        })
    }

    /// Generate a SightlineConfig that passes validation.
    pub fn arb_valid_config() -> impl Strategy<Value = SightlineConfig> {
        (
            arb_policy(),
            arb_cache_config(),
            arb_cache_config(),
            arb_breaker_config(),
            arb_breaker_config(),
            arb_retry_config(),
        )
            .prop_map(|(policy, fingerprint_cache, result_cache, cb, eb, retry)| SightlineConfig {
                policy,
                fingerprint_cache,
                result_cache,
                classifier_breaker: cb,
                enrichment_breaker: eb,
                retry,
                ..SightlineConfig::default()
            })
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built test fixtures for common testing scenarios.

    use super::*;

    /// Default configuration with retries and timeouts short enough for
    /// real-clock tests.
    pub fn fast_config() -> SightlineConfig {
        SightlineConfig {
            policy: IdentifyPolicy::default()
                .with_classifier_timeout(Duration::from_millis(500))
                .with_enrichment_timeout(Duration::from_millis(500)),
            retry: RetryConfig {
                max_retries: 2,
                initial_backoff: Duration::from_millis(1),
                max_backoff: Duration::from_millis(4),
                backoff_multiplier: 2.0,
            },
            ..SightlineConfig::default()
        }
    }

    /// Candidates with the given confidences, ids counting up from 1.
    pub fn ranked(confidences: &[f32]) -> Vec<Candidate> {
        confidences
            .iter()
            .enumerate()
            .map(|(i, &c)| Candidate::new(i as EntityId + 1, format!("entity-{}", i + 1), c))
            .collect()
    }

    /// Minimal enrichment payload naming the entity.
    pub fn entity_payload(entity_id: EntityId, name: &str) -> EnrichmentPayload {
        EnrichmentPayload::new(serde_json::json!({
            "id": entity_id,
            "name": name,
        }))
    }

    /// Data source that knows entities 1 through `count`.
    pub fn populated_source(count: i64) -> ScriptedDataSource {
        (1..=count).fold(ScriptedDataSource::new(), |source, id| {
            source.with_entity(id, entity_payload(id, &format!("entity-{}", id)))
        })
    }

    /// A small non-empty image.
    pub fn image(tag: &str) -> Vec<u8> {
        format!("\u{89}PNG fixture {}", tag).into_bytes()
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions over identify outcomes.

    use super::*;

    type IdentifyOutcome = Result<IdentificationResult, IdentifyError>;

    #[track_caller]
    pub fn assert_no_match(outcome: &IdentifyOutcome) {
        match outcome {
            Err(IdentifyError::NoMatch) => {}
            other => panic!("Expected NoMatch, got: {:?}", other),
        }
    }

    #[track_caller]
    pub fn assert_classifier_unavailable(outcome: &IdentifyOutcome) {
        match outcome {
            Err(IdentifyError::ClassifierUnavailable(_)) => {}
            other => panic!("Expected ClassifierUnavailable, got: {:?}", other),
        }
    }

    /// Assert a successful identification, returning it.
    #[track_caller]
    pub fn assert_identified(outcome: IdentifyOutcome) -> IdentificationResult {
        match outcome {
            Ok(result) => result,
            Err(e) => panic!("Expected identification, got: {:?}", e),
        }
    }

    /// Assert success without enrichment for the given reason.
    #[track_caller]
    pub fn assert_degraded(result: &IdentificationResult, expected: &Degradation) {
        assert!(
            result.enriched_data.is_none(),
            "Degraded result must not carry enrichment: {:?}",
            result.enriched_data
        );
        assert_eq!(result.degradation.as_ref(), Some(expected));
    }

    /// Assert the alternatives are in non-increasing confidence order.
    #[track_caller]
    pub fn assert_ranked(result: &IdentificationResult) {
        let scores: Vec<f32> = result.ranked().map(|c| c.confidence).collect();
        for pair in scores.windows(2) {
            assert!(pair[0] >= pair[1], "Candidates out of order: {:?}", scores);
        }
    }
}
