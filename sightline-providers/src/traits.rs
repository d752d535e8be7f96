//! Collaborator traits the orchestrator calls.

use async_trait::async_trait;
use sightline_core::{
    Candidate, ClassifierError, DataSourceError, EnrichmentPayload, EntityId, ModelInfo,
};

/// Opaque image classifier.
///
/// Implementations must be thread-safe (Send + Sync).
///
/// # Example
/// ```ignore
/// struct OnnxClassifier { /* ... */ }
///
/// #[async_trait]
/// impl Classifier for OnnxClassifier {
///     async fn predict(&self, image_bytes: &[u8]) -> Result<Vec<Candidate>, ClassifierError> {
///         // Run inference
///     }
///     // ...
/// }
/// ```
#[async_trait]
pub trait Classifier: Send + Sync {
    /// Classify an image.
    ///
    /// # Returns
    /// * `Ok(candidates)` - Candidates in descending confidence order; empty
    ///   when nothing in the image is recognisable
    /// * `Err(ClassifierError)` - Inference could not run
    async fn predict(&self, image_bytes: &[u8]) -> Result<Vec<Candidate>, ClassifierError>;

    /// Describe the model behind this classifier.
    fn model_info(&self) -> ModelInfo;
}

/// Remote source of enrichment data keyed by entity id.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Fetch the enrichment document for one entity.
    ///
    /// # Returns
    /// * `Err(DataSourceError::NotFound)` - The source answered and does not
    ///   know the entity. This is not a health signal.
    /// * Any other error - The source is unreachable or misbehaving.
    async fn fetch(&self, entity_id: EntityId) -> Result<EnrichmentPayload, DataSourceError>;

    /// Short name used in logs.
    fn source_id(&self) -> &str;
}
