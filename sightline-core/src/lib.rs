//! SIGHTLINE Core - Recognition Types
//!
//! Pure data structures shared by every other crate: image fingerprints,
//! candidates and identification results, breaker state, configuration,
//! health and the error taxonomy. This crate performs no I/O.

mod circuit;
mod config;
pub mod constants;
mod error;
mod fingerprint;
mod health;
mod recognition;

pub use circuit::{CircuitState, CircuitStateParseError, FailureRecord};
pub use config::{BreakerConfig, CacheConfig, IdentifyPolicy, RetryConfig, SightlineConfig};
pub use error::{
    CacheError, ClassifierError, ConfigError, DataSourceError, IdentifyError, SightlineError,
    SightlineResult,
};
pub use fingerprint::{
    fingerprint_of, EntityId, FingerprintParseError, ImageFingerprint, Timestamp, FINGERPRINT_LEN,
};
pub use health::{HealthCheck, HealthReport, HealthStatus};
pub use recognition::{Candidate, Degradation, EnrichmentPayload, IdentificationResult, ModelInfo};
