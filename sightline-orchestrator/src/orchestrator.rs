//! Recognition orchestrator: fingerprint, classify, enrich, cache.
//!
//! ```text
//! identify(bytes)
//!   ├─ fingerprint cache hit ──────────────────────────────► cached copy
//!   └─ miss: spawned, one per fingerprint
//!        ├─ classifier breaker + timeout ──── error ───────► ClassifierUnavailable
//!        ├─ confidence policy ─────────────── empty ───────► NoMatch
//!        ├─ result cache, else data source breaker
//!        │    + timeout + retry ───────────── error ───────► degraded result
//!        └─ store in fingerprint cache ────────────────────► result
//! ```

use std::fmt::Debug;
use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use sightline_cache::{
    cache_sweep_task, FingerprintCache, KeyedCoalescer, ResultCache, SweepMetrics, TtlCache,
};
use sightline_core::{
    fingerprint_of, Candidate, ClassifierError, DataSourceError, Degradation, EnrichmentPayload,
    EntityId, HealthCheck, HealthReport, IdentificationResult, IdentifyError, ImageFingerprint,
    ModelInfo, SightlineConfig, SightlineResult,
};
use sightline_providers::{with_retry, BreakerError, CircuitBreaker, Classifier, DataSource};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::Instrument;
use uuid::Uuid;

use crate::policy::{select_candidates, Selection};
use crate::stats::{IdentifyStats, IdentifyStatsSnapshot};

const FINGERPRINT_CACHE: &str = "fingerprint_cache";
const RESULT_CACHE: &str = "result_cache";
const CLASSIFIER_BREAKER: &str = "classifier_breaker";
const ENRICHMENT_BREAKER: &str = "enrichment_breaker";

// ============================================================================
// BUILDER
// ============================================================================

/// Assembles a [`RecognitionOrchestrator`].
///
/// Caches and breakers not injected explicitly are built from the
/// configuration.
pub struct OrchestratorBuilder {
    classifier: Arc<dyn Classifier>,
    data_source: Arc<dyn DataSource>,
    config: SightlineConfig,
    fingerprint_cache: Option<Arc<FingerprintCache>>,
    result_cache: Option<Arc<ResultCache>>,
    classifier_breaker: Option<Arc<CircuitBreaker>>,
    enrichment_breaker: Option<Arc<CircuitBreaker>>,
}

impl OrchestratorBuilder {
    pub fn config(mut self, config: SightlineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn fingerprint_cache(mut self, cache: Arc<FingerprintCache>) -> Self {
        self.fingerprint_cache = Some(cache);
        self
    }

    pub fn result_cache(mut self, cache: Arc<ResultCache>) -> Self {
        self.result_cache = Some(cache);
        self
    }

    pub fn classifier_breaker(mut self, breaker: Arc<CircuitBreaker>) -> Self {
        self.classifier_breaker = Some(breaker);
        self
    }

    pub fn enrichment_breaker(mut self, breaker: Arc<CircuitBreaker>) -> Self {
        self.enrichment_breaker = Some(breaker);
        self
    }

    /// Validate the configuration and build.
    pub fn build(self) -> SightlineResult<RecognitionOrchestrator> {
        self.config.validate()?;

        let fingerprint_cache = self.fingerprint_cache.unwrap_or_else(|| {
            Arc::new(TtlCache::in_memory(
                FINGERPRINT_CACHE,
                &self.config.fingerprint_cache,
            ))
        });
        let result_cache = self
            .result_cache
            .unwrap_or_else(|| Arc::new(TtlCache::in_memory(RESULT_CACHE, &self.config.result_cache)));
        let classifier_breaker = self.classifier_breaker.unwrap_or_else(|| {
            Arc::new(CircuitBreaker::new(
                "classifier",
                self.config.classifier_breaker.clone(),
            ))
        });
        let enrichment_breaker = self.enrichment_breaker.unwrap_or_else(|| {
            Arc::new(CircuitBreaker::new(
                "enrichment",
                self.config.enrichment_breaker.clone(),
            ))
        });

        let model = self.classifier.model_info();
        tracing::info!(
            model = %model.name,
            model_version = %model.version,
            data_source = self.data_source.source_id(),
            confidence_threshold = self.config.policy.confidence_threshold,
            max_alternatives = self.config.policy.max_alternatives,
            "Recognition orchestrator ready"
        );

        Ok(RecognitionOrchestrator {
            pipeline: Arc::new(Pipeline {
                classifier: self.classifier,
                data_source: self.data_source,
                fingerprint_cache,
                result_cache,
                classifier_breaker,
                enrichment_breaker,
                inference_locks: KeyedCoalescer::new(),
                enrichment_locks: KeyedCoalescer::new(),
                config: self.config,
                stats: IdentifyStats::new(),
            }),
        })
    }
}

// ============================================================================
// ORCHESTRATOR
// ============================================================================

/// Turns image bytes into an enriched identification.
///
/// Cloning is cheap and clones share caches, breakers and statistics.
#[derive(Clone)]
pub struct RecognitionOrchestrator {
    pipeline: Arc<Pipeline>,
}

impl RecognitionOrchestrator {
    pub fn builder(
        classifier: Arc<dyn Classifier>,
        data_source: Arc<dyn DataSource>,
    ) -> OrchestratorBuilder {
        OrchestratorBuilder {
            classifier,
            data_source,
            config: SightlineConfig::default(),
            fingerprint_cache: None,
            result_cache: None,
            classifier_breaker: None,
            enrichment_breaker: None,
        }
    }

    /// Identify the subject of an image.
    ///
    /// Identical bytes are answered from the fingerprint cache without any
    /// remote call. On a miss the work runs on its own task, so dropping
    /// this future does not abandon it: the result still lands in the cache.
    /// Concurrent calls for the same image wait for one classification.
    ///
    /// Enrichment problems never fail the call; they show up as
    /// `degradation` on the result.
    pub async fn identify(
        &self,
        image_bytes: &[u8],
    ) -> Result<IdentificationResult, IdentifyError> {
        let fingerprint = fingerprint_of(image_bytes);
        let span = tracing::info_span!(
            "identify",
            %fingerprint,
            request_id = %Uuid::now_v7(),
            image_bytes = image_bytes.len()
        );
        self.identify_in_span(fingerprint, image_bytes)
            .instrument(span)
            .await
    }

    async fn identify_in_span(
        &self,
        fingerprint: ImageFingerprint,
        image_bytes: &[u8],
    ) -> Result<IdentificationResult, IdentifyError> {
        self.pipeline.stats.record_request();

        if let Some(hit) = self.pipeline.cached(fingerprint).await {
            return Ok(hit);
        }

        let pipeline = Arc::clone(&self.pipeline);
        let image = image_bytes.to_vec();
        let task = tokio::spawn(
            async move { pipeline.resolve(fingerprint, image).await }.in_current_span(),
        );

        match task.await {
            Ok(outcome) => outcome,
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(e) => Err(IdentifyError::ClassifierUnavailable(
                ClassifierError::Transient {
                    reason: format!("identification task cancelled: {}", e),
                },
            )),
        }
    }

    /// Health of both breakers and both caches, plus the classifier model.
    pub async fn health(&self) -> HealthReport {
        let p = &self.pipeline;
        let checks = vec![
            HealthCheck::for_breaker(
                CLASSIFIER_BREAKER,
                p.classifier_breaker.state(),
                p.classifier_breaker.failure_record(),
            ),
            HealthCheck::for_breaker(
                ENRICHMENT_BREAKER,
                p.enrichment_breaker.state(),
                p.enrichment_breaker.failure_record(),
            ),
            cache_check(FINGERPRINT_CACHE, &p.fingerprint_cache).await,
            cache_check(RESULT_CACHE, &p.result_cache).await,
        ];
        HealthReport::new(checks, p.classifier.model_info(), Utc::now())
    }

    /// Start a background sweeper for each cache at its configured interval.
    ///
    /// The sweepers stop when `shutdown` flips to true or its sender drops.
    pub fn spawn_cache_sweepers(
        &self,
        shutdown: watch::Receiver<bool>,
    ) -> Vec<JoinHandle<Arc<SweepMetrics>>> {
        let p = &self.pipeline;
        vec![
            tokio::spawn(cache_sweep_task(
                Arc::clone(&p.fingerprint_cache),
                p.config.fingerprint_cache.sweep_interval,
                shutdown.clone(),
            )),
            tokio::spawn(cache_sweep_task(
                Arc::clone(&p.result_cache),
                p.config.result_cache.sweep_interval,
                shutdown,
            )),
        ]
    }

    pub fn stats(&self) -> IdentifyStatsSnapshot {
        self.pipeline.stats.snapshot()
    }

    pub fn config(&self) -> &SightlineConfig {
        &self.pipeline.config
    }

    pub fn model_info(&self) -> ModelInfo {
        self.pipeline.classifier.model_info()
    }

    pub fn fingerprint_cache(&self) -> &Arc<FingerprintCache> {
        &self.pipeline.fingerprint_cache
    }

    pub fn result_cache(&self) -> &Arc<ResultCache> {
        &self.pipeline.result_cache
    }

    pub fn classifier_breaker(&self) -> &Arc<CircuitBreaker> {
        &self.pipeline.classifier_breaker
    }

    pub fn enrichment_breaker(&self) -> &Arc<CircuitBreaker> {
        &self.pipeline.enrichment_breaker
    }
}

impl std::fmt::Debug for RecognitionOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let p = &self.pipeline;
        f.debug_struct("RecognitionOrchestrator")
            .field("data_source", &p.data_source.source_id())
            .field("classifier_breaker", &p.classifier_breaker)
            .field("enrichment_breaker", &p.enrichment_breaker)
            .field("policy", &p.config.policy)
            .finish()
    }
}

async fn cache_check<K, V>(component: &str, cache: &TtlCache<K, V>) -> HealthCheck
where
    K: Debug + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    let stats = cache.stats().await;
    HealthCheck::healthy(component)
        .with_metadata("entries", json!(stats.entry_count))
        .with_metadata("hits", json!(stats.hits))
        .with_metadata("misses", json!(stats.misses))
        .with_metadata("hit_rate", json!(stats.hit_rate()))
        .with_metadata("evictions", json!(stats.evictions))
        .with_metadata("faults", json!(stats.faults))
}

// ============================================================================
// PIPELINE
// ============================================================================

/// Shared state behind every clone of an orchestrator.
struct Pipeline {
    classifier: Arc<dyn Classifier>,
    data_source: Arc<dyn DataSource>,
    fingerprint_cache: Arc<FingerprintCache>,
    result_cache: Arc<ResultCache>,
    classifier_breaker: Arc<CircuitBreaker>,
    enrichment_breaker: Arc<CircuitBreaker>,
    inference_locks: KeyedCoalescer<ImageFingerprint>,
    enrichment_locks: KeyedCoalescer<EntityId>,
    config: SightlineConfig,
    stats: IdentifyStats,
}

impl Pipeline {
    /// Fingerprint cache lookup, returning a copy marked as a cache hit.
    async fn cached(&self, fingerprint: ImageFingerprint) -> Option<IdentificationResult> {
        let stored = self.fingerprint_cache.get(&fingerprint).await?;
        self.stats.record_cache_hit();
        tracing::debug!(entity_id = stored.primary.entity_id, "Fingerprint cache hit");

        let stored = self.refresh_degraded(fingerprint, stored).await;
        Some(stored.as_cache_hit())
    }

    /// Fill in a degraded cached result from the result cache, if the entity
    /// has since been enriched. Never calls the data source.
    async fn refresh_degraded(
        &self,
        fingerprint: ImageFingerprint,
        stored: IdentificationResult,
    ) -> IdentificationResult {
        let refreshable = stored
            .degradation
            .as_ref()
            .is_some_and(Degradation::is_dependency_failure);
        if !refreshable {
            return stored;
        }

        let Some(payload) = self.result_cache.get(&stored.primary.entity_id).await else {
            return stored;
        };

        let upgraded = stored.with_enrichment(payload);
        self.fingerprint_cache
            .put_default(fingerprint, upgraded.clone())
            .await;
        self.stats.record_degraded_upgrade();
        tracing::info!(
            entity_id = upgraded.primary.entity_id,
            "Degraded cached result upgraded with enrichment"
        );
        upgraded
    }

    /// Miss path. Holds the fingerprint's lock throughout, so concurrent
    /// callers for the same image find the result in the cache.
    async fn resolve(
        &self,
        fingerprint: ImageFingerprint,
        image: Vec<u8>,
    ) -> Result<IdentificationResult, IdentifyError> {
        let _inference = self.inference_locks.acquire(fingerprint).await;
        if let Some(hit) = self.cached(fingerprint).await {
            return Ok(hit);
        }

        let started = Instant::now();
        let candidates = self.classify(&image).await?;

        let Some(Selection {
            primary,
            alternatives,
        }) = select_candidates(candidates, &self.config.policy)
        else {
            self.stats.record_no_match();
            tracing::debug!("No identifiable subject");
            return Err(IdentifyError::NoMatch);
        };

        let (enriched_data, degradation) = match self.enrich(primary.entity_id).await {
            Ok(payload) => (Some(payload), None),
            Err(degradation) => {
                self.stats.record_degraded();
                (None, Some(degradation))
            }
        };

        let result = IdentificationResult {
            primary,
            alternatives,
            enriched_data,
            degradation,
            served_from_cache: false,
            fingerprint,
            model_version: self.classifier.model_info().version,
            processing_time_ms: started.elapsed().as_millis() as u64,
            identified_at: Utc::now(),
        };
        self.fingerprint_cache
            .put_default(fingerprint, result.clone())
            .await;

        tracing::info!(
            entity_id = result.primary.entity_id,
            label = %result.primary.label,
            confidence = result.primary.confidence,
            alternatives = result.alternatives.len(),
            degraded = result.is_degraded(),
            processing_time_ms = result.processing_time_ms,
            "Identification complete"
        );
        Ok(result)
    }

    /// Classifier call through its breaker, bounded by the classifier
    /// timeout. A timeout counts as a breaker failure.
    async fn classify(&self, image: &[u8]) -> Result<Vec<Candidate>, IdentifyError> {
        let timeout = self.config.policy.classifier_timeout;

        let outcome = self
            .classifier_breaker
            .call(|| async move {
                self.stats.record_classifier_call();
                match tokio::time::timeout(timeout, self.classifier.predict(image)).await {
                    Ok(reply) => reply,
                    Err(_) => Err(ClassifierError::Timeout {
                        timeout_ms: timeout.as_millis() as u64,
                    }),
                }
            })
            .await;

        outcome.map_err(|e| {
            let cause = match e {
                BreakerError::Open { .. } => ClassifierError::CircuitOpen,
                BreakerError::Inner(cause) => cause,
            };
            self.stats.record_classifier_unavailable();
            tracing::warn!(
                error = %cause,
                breaker_state = %self.classifier_breaker.state(),
                "Classifier unavailable"
            );
            IdentifyError::ClassifierUnavailable(cause)
        })
    }

    /// Enrichment for one entity: result cache first, then the data source
    /// under the entity's lock. Failures come back as the degradation to
    /// report.
    async fn enrich(&self, entity_id: EntityId) -> Result<EnrichmentPayload, Degradation> {
        if let Some(payload) = self.result_cache.get(&entity_id).await {
            self.stats.record_enrichment_hit();
            return Ok(payload);
        }

        let _enrichment = self.enrichment_locks.acquire(entity_id).await;
        if let Some(payload) = self.result_cache.get(&entity_id).await {
            self.stats.record_enrichment_hit();
            return Ok(payload);
        }

        let timeout = self.config.policy.enrichment_timeout;
        let retry = &self.config.retry;
        let outcome = self
            .enrichment_breaker
            .call_classified(
                || async move {
                    self.stats.record_enrichment_fetch();
                    let attempts = with_retry(retry, "data_source.fetch", || {
                        self.data_source.fetch(entity_id)
                    });
                    match tokio::time::timeout(timeout, attempts).await {
                        Ok(reply) => reply,
                        Err(_) => Err(DataSourceError::Timeout {
                            timeout_ms: timeout.as_millis() as u64,
                        }),
                    }
                },
                DataSourceError::counts_as_failure,
            )
            .await;

        let source = self.data_source.source_id();
        match outcome {
            Ok(payload) => {
                self.result_cache.put_default(entity_id, payload.clone()).await;
                tracing::debug!(entity_id, source, "Enrichment fetched");
                Ok(payload)
            }
            Err(BreakerError::Open { .. }) => {
                tracing::warn!(entity_id, source, "Enrichment circuit open, skipping enrichment");
                Err(Degradation::EnrichmentCircuitOpen)
            }
            Err(BreakerError::Inner(DataSourceError::NotFound { .. })) => {
                tracing::info!(
                    entity_id,
                    source,
                    "Classifier label has no entry in the data source"
                );
                Err(Degradation::EntityNotFound)
            }
            Err(BreakerError::Inner(DataSourceError::Timeout { timeout_ms })) => {
                tracing::warn!(entity_id, source, timeout_ms, "Enrichment timed out");
                Err(Degradation::EnrichmentTimedOut)
            }
            Err(BreakerError::Inner(e)) => {
                tracing::warn!(entity_id, source, error = %e, "Enrichment failed");
                Err(Degradation::EnrichmentUnavailable {
                    reason: e.to_string(),
                })
            }
        }
    }
}
