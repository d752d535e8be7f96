//! SIGHTLINE Orchestrator - resilient image recognition
//!
//! [`RecognitionOrchestrator`] composes a classifier and an enrichment data
//! source with the caches and breakers that keep it answering while those
//! dependencies misbehave:
//!
//! - Identical images are answered from the fingerprint cache.
//! - Concurrent uploads of one image share a single classification.
//! - The classifier and the data source each sit behind their own circuit
//!   breaker and timeout.
//! - Enrichment failures produce a degraded result, never an error.
//!
//! ```ignore
//! let orchestrator = RecognitionOrchestrator::builder(classifier, data_source)
//!     .config(SightlineConfig::from_env())
//!     .build()?;
//!
//! match orchestrator.identify(&image_bytes).await {
//!     Ok(result) => println!("{} ({:.2})", result.primary.label, result.primary.confidence),
//!     Err(e) if e.is_no_match() => println!("nothing recognised"),
//!     Err(e) => eprintln!("try again later: {}", e),
//! }
//! ```

mod orchestrator;
mod policy;
mod stats;
pub mod telemetry;

pub use orchestrator::{OrchestratorBuilder, RecognitionOrchestrator};
pub use policy::{select_candidates, Selection};
pub use stats::{IdentifyStats, IdentifyStatsSnapshot};
