//! SIGHTLINE Providers - remote collaborators and their protection
//!
//! Defines the two collaborator traits the orchestrator depends on,
//! [`Classifier`] and [`DataSource`], along with the machinery that keeps a
//! failing collaborator from taking the orchestrator down with it:
//!
//! - [`CircuitBreaker`]: generic three-state breaker, one per dependency
//! - [`with_retry`]: exponential backoff for transient data source errors
//!
//! Bundled implementations:
//!
//! - [`HttpEntitySource`]: PokeAPI-compatible REST data source
//! - [`MockClassifier`]: deterministic classifier over a fixed catalogue
//! - [`StaticDataSource`]: in-memory data source

mod breaker;
mod mock;
pub mod pokeapi;
mod retry;
mod static_source;
mod traits;

pub use breaker::{BreakerError, CircuitBreaker};
pub use mock::{MockClassifier, MOCK_CATALOGUE};
pub use pokeapi::{EntitySummary, HttpEntitySource};
pub use retry::with_retry;
pub use static_source::StaticDataSource;
pub use traits::{Classifier, DataSource};
