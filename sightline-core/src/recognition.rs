//! Recognition data model: candidates, results and enrichment payloads.

use crate::{EntityId, ImageFingerprint, Timestamp};
use serde::{Deserialize, Serialize};

// ============================================================================
// CANDIDATE
// ============================================================================

/// One classifier guess with its confidence score.
///
/// Produced only by a classifier and never modified afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    /// Entity identifier in the classifier's label space
    pub entity_id: EntityId,
    /// Human-readable label (e.g. "pikachu")
    pub label: String,
    /// Confidence score in [0.0, 1.0]
    pub confidence: f32,
}

impl Candidate {
    /// Create a candidate. Confidence is clamped into [0.0, 1.0]; NaN becomes 0.0.
    pub fn new(entity_id: EntityId, label: impl Into<String>, confidence: f32) -> Self {
        let confidence = if confidence.is_nan() {
            0.0
        } else {
            confidence.clamp(0.0, 1.0)
        };
        Self {
            entity_id,
            label: label.into(),
            confidence,
        }
    }
}

// ============================================================================
// ENRICHMENT
// ============================================================================

/// Opaque enrichment document returned by a data source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EnrichmentPayload(pub serde_json::Value);

impl EnrichmentPayload {
    pub fn new(value: serde_json::Value) -> Self {
        Self(value)
    }

    pub fn as_json(&self) -> &serde_json::Value {
        &self.0
    }

    pub fn into_json(self) -> serde_json::Value {
        self.0
    }
}

impl From<serde_json::Value> for EnrichmentPayload {
    fn from(value: serde_json::Value) -> Self {
        Self(value)
    }
}

/// Why a successful identification carries no enrichment data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Degradation {
    /// The data source failed with a transient error
    EnrichmentUnavailable { reason: String },
    /// The enrichment breaker rejected the call without trying
    EnrichmentCircuitOpen,
    /// The data source did not answer within the enrichment timeout
    EnrichmentTimedOut,
    /// The data source does not know the entity the classifier reported
    EntityNotFound,
}

impl Degradation {
    /// True when the degradation reflects dependency health rather than data.
    ///
    /// Only these results are worth upgrading once the dependency recovers;
    /// a missing entity stays missing.
    pub fn is_dependency_failure(&self) -> bool {
        !matches!(self, Degradation::EntityNotFound)
    }
}

// ============================================================================
// MODEL INFO
// ============================================================================

/// Metadata describing the classifier behind an orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    pub version: String,
    pub num_classes: usize,
}

// ============================================================================
// IDENTIFICATION RESULT
// ============================================================================

/// Outcome of one successful identification.
///
/// Built once per orchestration call and cached by image fingerprint. Cache
/// hits hand out clones, never a handle into the cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentificationResult {
    /// Highest-confidence candidate
    pub primary: Candidate,
    /// Runner-up candidates, only populated when the primary is below threshold
    pub alternatives: Vec<Candidate>,
    /// Enrichment document for the primary candidate, if enrichment succeeded
    pub enriched_data: Option<EnrichmentPayload>,
    /// Set when enrichment did not complete
    pub degradation: Option<Degradation>,
    /// True when this result was served from the fingerprint cache
    pub served_from_cache: bool,
    /// Fingerprint of the image this result describes
    pub fingerprint: ImageFingerprint,
    /// Version of the classifier that produced the candidates
    pub model_version: String,
    /// Wall time spent producing the result on the miss path
    pub processing_time_ms: u64,
    /// When the result was first produced
    pub identified_at: Timestamp,
}

impl IdentificationResult {
    /// Whether enrichment was skipped or failed.
    pub fn is_degraded(&self) -> bool {
        self.degradation.is_some()
    }

    /// Copy of this result marked as served from cache.
    pub fn as_cache_hit(&self) -> Self {
        Self {
            served_from_cache: true,
            ..self.clone()
        }
    }

    /// Copy of this result with enrichment filled in and degradation cleared.
    pub fn with_enrichment(&self, payload: EnrichmentPayload) -> Self {
        Self {
            enriched_data: Some(payload),
            degradation: None,
            ..self.clone()
        }
    }

    /// Every candidate in rank order, primary first.
    pub fn ranked(&self) -> impl Iterator<Item = &Candidate> {
        std::iter::once(&self.primary).chain(self.alternatives.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn sample_result() -> IdentificationResult {
        IdentificationResult {
            primary: Candidate::new(25, "pikachu", 0.4),
            alternatives: vec![Candidate::new(26, "raichu", 0.3)],
            enriched_data: None,
            degradation: Some(Degradation::EnrichmentCircuitOpen),
            served_from_cache: false,
            fingerprint: ImageFingerprint::of(b"img"),
            model_version: "mock-v1.0.0".to_string(),
            processing_time_ms: 12,
            identified_at: Utc::now(),
        }
    }

    #[test]
    fn test_candidate_confidence_clamped() {
        assert_eq!(Candidate::new(1, "a", 1.5).confidence, 1.0);
        assert_eq!(Candidate::new(1, "a", -0.2).confidence, 0.0);
        assert_eq!(Candidate::new(1, "a", f32::NAN).confidence, 0.0);
        assert_eq!(Candidate::new(1, "a", 0.42).confidence, 0.42);
    }

    #[test]
    fn test_as_cache_hit_leaves_original_untouched() {
        let result = sample_result();
        let hit = result.as_cache_hit();
        assert!(hit.served_from_cache);
        assert!(!result.served_from_cache);
        assert_eq!(hit.primary, result.primary);
        assert_eq!(hit.alternatives, result.alternatives);
    }

    #[test]
    fn test_with_enrichment_clears_degradation() {
        let result = sample_result();
        assert!(result.is_degraded());
        let upgraded = result.with_enrichment(EnrichmentPayload::new(serde_json::json!({"id": 25})));
        assert!(!upgraded.is_degraded());
        assert_eq!(upgraded.enriched_data.unwrap().as_json()["id"], 25);
    }

    #[test]
    fn test_ranked_order() {
        let result = sample_result();
        let ids: Vec<_> = result.ranked().map(|c| c.entity_id).collect();
        assert_eq!(ids, vec![25, 26]);
    }

    #[test]
    fn test_degradation_dependency_failure() {
        assert!(Degradation::EnrichmentTimedOut.is_dependency_failure());
        assert!(Degradation::EnrichmentCircuitOpen.is_dependency_failure());
        assert!(Degradation::EnrichmentUnavailable {
            reason: "503".to_string()
        }
        .is_dependency_failure());
        assert!(!Degradation::EntityNotFound.is_dependency_failure());
    }

    #[test]
    fn test_degradation_serde_tagged() {
        let json = serde_json::to_value(Degradation::EntityNotFound).unwrap();
        assert_eq!(json["kind"], "entity_not_found");
    }
}
