//! PokeAPI-compatible enrichment source.

mod client;
pub mod types;

pub use client::HttpEntitySource;
pub use types::EntitySummary;
