//! Default values for SIGHTLINE configuration.
//!
//! Every tunable in `SightlineConfig` falls back to one of these.

// ============================================================================
// CONFIDENCE POLICY
// ============================================================================

/// Minimum confidence for a candidate to be reported without alternatives
pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.7;

/// Maximum number of runner-up candidates reported below threshold
pub const DEFAULT_MAX_ALTERNATIVES: usize = 2;

// ============================================================================
// TIMEOUTS
// ============================================================================

/// Upper bound on a single classifier call, in seconds
pub const DEFAULT_CLASSIFIER_TIMEOUT_SECS: u64 = 30;

/// Upper bound on a single data source call, in seconds
pub const DEFAULT_ENRICHMENT_TIMEOUT_SECS: u64 = 10;

// ============================================================================
// CACHES
// ============================================================================

/// Fingerprint cache capacity (entries)
pub const DEFAULT_FINGERPRINT_CACHE_CAPACITY: usize = 10_000;

/// Fingerprint cache entry lifetime, in seconds (1 hour)
pub const DEFAULT_FINGERPRINT_CACHE_TTL_SECS: u64 = 3600;

/// Enrichment result cache capacity (entries)
pub const DEFAULT_RESULT_CACHE_CAPACITY: usize = 2_000;

/// Enrichment result cache entry lifetime, in seconds (1 hour)
pub const DEFAULT_RESULT_CACHE_TTL_SECS: u64 = 3600;

/// Number of independently locked shards per cache
pub const DEFAULT_CACHE_SHARDS: usize = 16;

/// Interval between background sweeps of expired entries, in seconds
pub const DEFAULT_CACHE_SWEEP_INTERVAL_SECS: u64 = 60;

// ============================================================================
// CIRCUIT BREAKERS
// ============================================================================

/// Consecutive failures that open a breaker
pub const DEFAULT_BREAKER_FAILURE_THRESHOLD: u32 = 5;

/// Time an open breaker waits before admitting a trial call, in seconds
pub const DEFAULT_BREAKER_RESET_TIMEOUT_SECS: u64 = 30;

// ============================================================================
// DATA SOURCE RETRIES
// ============================================================================

/// Retries after the first attempt for transient data source failures
pub const DEFAULT_DATA_SOURCE_MAX_RETRIES: u32 = 3;

/// First backoff delay, in milliseconds
pub const DEFAULT_RETRY_INITIAL_BACKOFF_MS: u64 = 1000;

/// Backoff ceiling, in milliseconds
pub const DEFAULT_RETRY_MAX_BACKOFF_MS: u64 = 8000;

/// Backoff growth factor per attempt
pub const DEFAULT_RETRY_BACKOFF_MULTIPLIER: f32 = 2.0;

// ============================================================================
// DATA SOURCE
// ============================================================================

/// Base URL of the PokeAPI-compatible entity API
pub const DEFAULT_DATA_SOURCE_BASE_URL: &str = "https://pokeapi.co/api/v2";

/// User agent sent with data source requests
pub const DATA_SOURCE_USER_AGENT: &str = concat!("sightline/", env!("CARGO_PKG_VERSION"));
