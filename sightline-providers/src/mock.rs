//! Deterministic mock classifier for development and demos.
//!
//! Predictions are derived from the image's SHA-256 digest, so the same bytes
//! always produce the same candidates and different bytes spread across the
//! catalogue.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use sightline_core::constants::DEFAULT_CONFIDENCE_THRESHOLD;
use sightline_core::{fingerprint_of, Candidate, ClassifierError, EntityId, ModelInfo};

use crate::Classifier;

/// Entities the mock classifier can recognise.
pub const MOCK_CATALOGUE: [(EntityId, &str); 20] = [
    (25, "pikachu"),
    (1, "bulbasaur"),
    (4, "charmander"),
    (7, "squirtle"),
    (150, "mewtwo"),
    (6, "charizard"),
    (9, "blastoise"),
    (3, "venusaur"),
    (144, "articuno"),
    (145, "zapdos"),
    (146, "moltres"),
    (151, "mew"),
    (39, "jigglypuff"),
    (104, "cubone"),
    (143, "snorlax"),
    (94, "gengar"),
    (130, "gyarados"),
    (149, "dragonite"),
    (59, "arcanine"),
    (65, "alakazam"),
];

const MODEL_NAME: &str = "Mock Pokemon Classifier";
const MODEL_VERSION: &str = "mock-v1.0.0";

/// Map a byte onto `[low, high]`.
fn scale(byte: u8, low: f32, high: f32) -> f32 {
    low + (byte as f32 / u8::MAX as f32) * (high - low)
}

/// Classifier that needs no model files.
///
/// A primary candidate is always produced for non-empty input, with
/// confidence in [0.30, 0.95]. When that falls below the configured threshold,
/// two to four lower-confidence alternatives follow. Empty input yields no
/// candidates.
pub struct MockClassifier {
    confidence_threshold: f32,
    latency: Duration,
    loaded: AtomicBool,
}

impl Default for MockClassifier {
    fn default() -> Self {
        Self::new(DEFAULT_CONFIDENCE_THRESHOLD)
    }
}

impl MockClassifier {
    pub fn new(confidence_threshold: f32) -> Self {
        Self {
            confidence_threshold,
            latency: Duration::ZERO,
            loaded: AtomicBool::new(true),
        }
    }

    /// Simulate inference time.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Toggle model availability; an unloaded model fails every prediction.
    pub fn set_loaded(&self, loaded: bool) {
        self.loaded.store(loaded, Ordering::SeqCst);
    }

    /// The candidates `predict` returns for `image_bytes`.
    pub fn candidates_for(&self, image_bytes: &[u8]) -> Vec<Candidate> {
        if image_bytes.is_empty() {
            return Vec::new();
        }

        let digest = fingerprint_of(image_bytes);
        let bytes = digest.as_bytes();
        let catalogue_len = MOCK_CATALOGUE.len();

        let primary_index = bytes[0] as usize % catalogue_len;
        let (id, label) = MOCK_CATALOGUE[primary_index];
        let base_confidence = scale(bytes[1], 0.30, 0.95);

        let mut candidates = vec![Candidate::new(id, label, base_confidence)];

        if base_confidence < self.confidence_threshold {
            let wanted = 2 + bytes[2] as usize % 3;
            let mut used = vec![primary_index];

            for i in 0..wanted {
                let mut index = bytes[3 + i] as usize % catalogue_len;
                while used.contains(&index) {
                    index = (index + 1) % catalogue_len;
                }
                used.push(index);

                let (alt_id, alt_label) = MOCK_CATALOGUE[index];
                let confidence = scale(bytes[8 + i], 0.10, base_confidence - 0.05);
                candidates.push(Candidate::new(alt_id, alt_label, confidence));
            }
        }

        candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        candidates
    }
}

#[async_trait]
impl Classifier for MockClassifier {
    async fn predict(&self, image_bytes: &[u8]) -> Result<Vec<Candidate>, ClassifierError> {
        if !self.loaded.load(Ordering::SeqCst) {
            return Err(ClassifierError::ModelNotLoaded);
        }
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        Ok(self.candidates_for(image_bytes))
    }

    fn model_info(&self) -> ModelInfo {
        ModelInfo {
            name: MODEL_NAME.to_string(),
            version: MODEL_VERSION.to_string(),
            num_classes: MOCK_CATALOGUE.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_same_bytes_same_candidates() {
        let classifier = MockClassifier::default();
        let a = classifier.predict(b"pikachu.png").await.unwrap();
        let b = classifier.predict(b"pikachu.png").await.unwrap();
        assert_eq!(a, b);
        assert!(!a.is_empty());
    }

    #[tokio::test]
    async fn test_empty_input_has_no_candidates() {
        let classifier = MockClassifier::default();
        assert!(classifier.predict(b"").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unloaded_model_fails() {
        let classifier = MockClassifier::default();
        classifier.set_loaded(false);
        assert_eq!(
            classifier.predict(b"img").await.unwrap_err(),
            ClassifierError::ModelNotLoaded
        );
        classifier.set_loaded(true);
        assert!(classifier.predict(b"img").await.is_ok());
    }

    #[test]
    fn test_model_info() {
        let info = MockClassifier::default().model_info();
        assert_eq!(info.version, "mock-v1.0.0");
        assert_eq!(info.num_classes, 20);
    }
}

#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashSet;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Output is sorted, distinct, in range and shaped by the threshold.
        #[test]
        fn prop_candidates_well_formed(
            bytes in prop::collection::vec(any::<u8>(), 1..512),
            threshold in 0.0f32..=1.0
        ) {
            let candidates = MockClassifier::new(threshold).candidates_for(&bytes);
            prop_assert!(!candidates.is_empty());

            for pair in candidates.windows(2) {
                prop_assert!(pair[0].confidence >= pair[1].confidence);
            }
            let ids: HashSet<_> = candidates.iter().map(|c| c.entity_id).collect();
            prop_assert_eq!(ids.len(), candidates.len());
            for c in &candidates {
                prop_assert!((0.0..=1.0).contains(&c.confidence));
            }

            let top = candidates[0].confidence;
            if top >= threshold {
                prop_assert_eq!(candidates.len(), 1);
            } else {
                prop_assert!((3..=5).contains(&candidates.len()));
            }
        }
    }
}
