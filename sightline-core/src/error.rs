//! Error types for SIGHTLINE operations

use crate::EntityId;
use thiserror::Error;

/// Classifier (inference) errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ClassifierError {
    #[error("Classifier failed: {reason}")]
    Transient { reason: String },

    #[error("Classifier did not respond within {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Classifier model is not loaded")]
    ModelNotLoaded,

    #[error("Classifier circuit is open")]
    CircuitOpen,
}

/// Enrichment data source errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DataSourceError {
    #[error("Entity {entity_id} not found in data source")]
    NotFound { entity_id: EntityId },

    #[error("Request to data source failed with status {status}: {message}")]
    RequestFailed { status: u16, message: String },

    #[error("Data source unreachable: {reason}")]
    Transient { reason: String },

    #[error("Data source did not respond within {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Invalid response from data source: {reason}")]
    InvalidResponse { reason: String },
}

impl DataSourceError {
    /// Whether this outcome is evidence that the data source is unhealthy.
    ///
    /// A missing entity means the source answered correctly; it must not
    /// move the breaker.
    pub fn counts_as_failure(&self) -> bool {
        !matches!(self, DataSourceError::NotFound { .. })
    }

    /// Whether another attempt could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            DataSourceError::Transient { .. } | DataSourceError::Timeout { .. } => true,
            DataSourceError::RequestFailed { status, .. } => *status == 429 || *status >= 500,
            DataSourceError::NotFound { .. } | DataSourceError::InvalidResponse { .. } => false,
        }
    }
}

/// Cache layer errors.
///
/// These never escape a `TtlCache`; they are logged and turned into misses.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("Cache backend failure: {reason}")]
    Backend { reason: String },

    #[error("Cache lock poisoned")]
    LockPoisoned,
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Caller-visible outcomes of `identify` other than success.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum IdentifyError {
    /// The classifier found nothing identifiable. An expected outcome.
    #[error("No identifiable subject in image")]
    NoMatch,

    /// Inference could not be performed; retry later.
    #[error("Classifier unavailable: {0}")]
    ClassifierUnavailable(#[source] ClassifierError),
}

impl IdentifyError {
    pub fn is_no_match(&self) -> bool {
        matches!(self, IdentifyError::NoMatch)
    }

    /// Whether the caller should retry later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, IdentifyError::ClassifierUnavailable(_))
    }
}

/// Master error type for all SIGHTLINE errors.
#[derive(Debug, Clone, Error)]
pub enum SightlineError {
    #[error("Identify error: {0}")]
    Identify(#[from] IdentifyError),

    #[error("Classifier error: {0}")]
    Classifier(#[from] ClassifierError),

    #[error("Data source error: {0}")]
    DataSource(#[from] DataSourceError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type alias for SIGHTLINE operations.
pub type SightlineResult<T> = Result<T, SightlineError>;

// =============================================================================
// TESTS
// =============================================================================
