//! Configuration types

use crate::constants::*;
use crate::{ConfigError, SightlineError, SightlineResult};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

// ============================================================================
// IDENTIFY POLICY
// ============================================================================

/// Confidence policy and call timeouts for `identify`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentifyPolicy {
    /// A top candidate at or above this confidence is reported alone
    pub confidence_threshold: f32,
    /// Runner-ups reported when the top candidate is below threshold
    pub max_alternatives: usize,
    pub classifier_timeout: Duration,
    pub enrichment_timeout: Duration,
}

impl Default for IdentifyPolicy {
    fn default() -> Self {
        Self {
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            max_alternatives: DEFAULT_MAX_ALTERNATIVES,
            classifier_timeout: Duration::from_secs(DEFAULT_CLASSIFIER_TIMEOUT_SECS),
            enrichment_timeout: Duration::from_secs(DEFAULT_ENRICHMENT_TIMEOUT_SECS),
        }
    }
}

impl IdentifyPolicy {
    pub fn with_confidence_threshold(mut self, threshold: f32) -> Self {
        self.confidence_threshold = threshold;
        self
    }

    pub fn with_max_alternatives(mut self, max: usize) -> Self {
        self.max_alternatives = max;
        self
    }

    pub fn with_classifier_timeout(mut self, timeout: Duration) -> Self {
        self.classifier_timeout = timeout;
        self
    }

    pub fn with_enrichment_timeout(mut self, timeout: Duration) -> Self {
        self.enrichment_timeout = timeout;
        self
    }

    pub fn validate(&self) -> SightlineResult<()> {
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(invalid(
                "policy.confidence_threshold",
                self.confidence_threshold,
                "confidence_threshold must be between 0.0 and 1.0",
            ));
        }
        if self.classifier_timeout.is_zero() {
            return Err(invalid(
                "policy.classifier_timeout",
                format!("{:?}", self.classifier_timeout),
                "classifier_timeout must be positive",
            ));
        }
        if self.enrichment_timeout.is_zero() {
            return Err(invalid(
                "policy.enrichment_timeout",
                format!("{:?}", self.enrichment_timeout),
                "enrichment_timeout must be positive",
            ));
        }
        Ok(())
    }
}

// ============================================================================
// CACHE CONFIG
// ============================================================================

/// Sizing and expiry for one TTL cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Maximum number of live entries across all shards
    pub capacity: usize,
    /// Lifetime applied by the orchestrator when it writes an entry
    pub default_ttl: Duration,
    /// Number of independently locked shards
    pub shards: usize,
    /// Period of the background expiry sweep
    pub sweep_interval: Duration,
}

impl CacheConfig {
    pub fn new(capacity: usize, default_ttl: Duration) -> Self {
        Self {
            capacity,
            default_ttl,
            shards: DEFAULT_CACHE_SHARDS,
            sweep_interval: Duration::from_secs(DEFAULT_CACHE_SWEEP_INTERVAL_SECS),
        }
    }

    /// Defaults for the fingerprint cache.
    pub fn fingerprint_default() -> Self {
        Self::new(
            DEFAULT_FINGERPRINT_CACHE_CAPACITY,
            Duration::from_secs(DEFAULT_FINGERPRINT_CACHE_TTL_SECS),
        )
    }

    /// Defaults for the enrichment result cache.
    pub fn result_default() -> Self {
        Self::new(
            DEFAULT_RESULT_CACHE_CAPACITY,
            Duration::from_secs(DEFAULT_RESULT_CACHE_TTL_SECS),
        )
    }

    pub fn with_shards(mut self, shards: usize) -> Self {
        self.shards = shards;
        self
    }

    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// Validate, prefixing field names with `section`.
    pub fn validate(&self, section: &str) -> SightlineResult<()> {
        if self.capacity == 0 {
            return Err(invalid(
                format!("{}.capacity", section),
                self.capacity,
                "capacity must be greater than 0",
            ));
        }
        if self.shards == 0 {
            return Err(invalid(
                format!("{}.shards", section),
                self.shards,
                "shards must be greater than 0",
            ));
        }
        if self.shards > self.capacity {
            return Err(invalid(
                format!("{}.shards", section),
                self.shards,
                "shards must not exceed capacity",
            ));
        }
        if self.default_ttl.is_zero() {
            return Err(invalid(
                format!("{}.default_ttl", section),
                format!("{:?}", self.default_ttl),
                "default_ttl must be positive",
            ));
        }
        if self.sweep_interval.is_zero() {
            return Err(invalid(
                format!("{}.sweep_interval", section),
                format!("{:?}", self.sweep_interval),
                "sweep_interval must be positive",
            ));
        }
        Ok(())
    }
}

// ============================================================================
// BREAKER CONFIG
// ============================================================================

/// Circuit breaker tuning for one dependency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakerConfig {
    /// Consecutive failures that open the breaker (>= 1)
    pub failure_threshold: u32,
    /// How long the breaker stays open before admitting a trial call
    pub reset_timeout: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: DEFAULT_BREAKER_FAILURE_THRESHOLD,
            reset_timeout: Duration::from_secs(DEFAULT_BREAKER_RESET_TIMEOUT_SECS),
        }
    }
}

impl BreakerConfig {
    pub fn new(failure_threshold: u32, reset_timeout: Duration) -> Self {
        Self {
            failure_threshold,
            reset_timeout,
        }
    }

    pub fn validate(&self, section: &str) -> SightlineResult<()> {
        if self.failure_threshold == 0 {
            return Err(invalid(
                format!("{}.failure_threshold", section),
                self.failure_threshold,
                "failure_threshold must be at least 1",
            ));
        }
        if self.reset_timeout.is_zero() {
            return Err(invalid(
                format!("{}.reset_timeout", section),
                format!("{:?}", self.reset_timeout),
                "reset_timeout must be positive",
            ));
        }
        Ok(())
    }
}

// ============================================================================
// RETRY CONFIG
// ============================================================================

/// Exponential backoff for transient data source failures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Retries after the first attempt; zero disables retrying
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub backoff_multiplier: f32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_DATA_SOURCE_MAX_RETRIES,
            initial_backoff: Duration::from_millis(DEFAULT_RETRY_INITIAL_BACKOFF_MS),
            max_backoff: Duration::from_millis(DEFAULT_RETRY_MAX_BACKOFF_MS),
            backoff_multiplier: DEFAULT_RETRY_BACKOFF_MULTIPLIER,
        }
    }
}

impl RetryConfig {
    /// No retries at all.
    pub fn disabled() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Delay before retry number `attempt` (0-based), capped at `max_backoff`.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = (self.backoff_multiplier as f64).powi(attempt as i32);
        let millis = self.initial_backoff.as_millis() as f64 * factor;
        let capped = millis.min(self.max_backoff.as_millis() as f64);
        Duration::from_millis(capped as u64)
    }

    pub fn validate(&self) -> SightlineResult<()> {
        if self.backoff_multiplier < 1.0 || !self.backoff_multiplier.is_finite() {
            return Err(invalid(
                "retry.backoff_multiplier",
                self.backoff_multiplier,
                "backoff_multiplier must be a finite value of at least 1.0",
            ));
        }
        if self.max_backoff < self.initial_backoff {
            return Err(invalid(
                "retry.max_backoff",
                format!("{:?}", self.max_backoff),
                "max_backoff must not be shorter than initial_backoff",
            ));
        }
        Ok(())
    }
}

// ============================================================================
// MASTER CONFIG
// ============================================================================

/// Everything an orchestrator needs at construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SightlineConfig {
    pub policy: IdentifyPolicy,
    pub fingerprint_cache: CacheConfig,
    pub result_cache: CacheConfig,
    pub classifier_breaker: BreakerConfig,
    pub enrichment_breaker: BreakerConfig,
    pub retry: RetryConfig,
    pub data_source_base_url: String,
}

impl Default for SightlineConfig {
    fn default() -> Self {
        Self {
            policy: IdentifyPolicy::default(),
            fingerprint_cache: CacheConfig::fingerprint_default(),
            result_cache: CacheConfig::result_default(),
            classifier_breaker: BreakerConfig::default(),
            enrichment_breaker: BreakerConfig::default(),
            retry: RetryConfig::default(),
            data_source_base_url: DEFAULT_DATA_SOURCE_BASE_URL.to_string(),
        }
    }
}

impl SightlineConfig {
    /// Create from environment variables with fallback to defaults.
    ///
    /// Environment variables:
    /// - `SIGHTLINE_CONFIDENCE_THRESHOLD` (default: 0.7)
    /// - `SIGHTLINE_MAX_ALTERNATIVES` (default: 2)
    /// - `SIGHTLINE_CLASSIFIER_TIMEOUT_SECS` (default: 30)
    /// - `SIGHTLINE_ENRICHMENT_TIMEOUT_SECS` (default: 10)
    /// - `SIGHTLINE_FINGERPRINT_CACHE_CAPACITY` (default: 10000)
    /// - `SIGHTLINE_FINGERPRINT_CACHE_TTL_SECS` (default: 3600)
    /// - `SIGHTLINE_RESULT_CACHE_CAPACITY` (default: 2000)
    /// - `SIGHTLINE_RESULT_CACHE_TTL_SECS` (default: 3600)
    /// - `SIGHTLINE_CACHE_SHARDS` (default: 16)
    /// - `SIGHTLINE_BREAKER_FAILURE_THRESHOLD` (default: 5, both breakers)
    /// - `SIGHTLINE_BREAKER_RESET_TIMEOUT_SECS` (default: 30, both breakers)
    /// - `SIGHTLINE_DATA_SOURCE_MAX_RETRIES` (default: 3)
    /// - `SIGHTLINE_DATA_SOURCE_URL` (default: https://pokeapi.co/api/v2)
    ///
    /// Unparseable values fall back to the default. Call `validate()` on the
    /// result before use.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Per-request timeout for the data source client.
    ///
    /// `enrichment_timeout` bounds the whole retry sequence, so each attempt
    /// gets an equal share of it.
    pub fn data_source_request_timeout(&self) -> Duration {
        self.policy.enrichment_timeout / self.retry.max_retries.saturating_add(1)
    }

    /// Same as `from_env`, reading variables through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let parsed = |key: &str| -> Option<u64> { parse_var(&lookup, key) };
        let defaults = Self::default();

        let shards = parse_var(&lookup, "SIGHTLINE_CACHE_SHARDS").unwrap_or(DEFAULT_CACHE_SHARDS);
        let failure_threshold = parse_var(&lookup, "SIGHTLINE_BREAKER_FAILURE_THRESHOLD")
            .unwrap_or(DEFAULT_BREAKER_FAILURE_THRESHOLD);
        let reset_timeout = Duration::from_secs(
            parsed("SIGHTLINE_BREAKER_RESET_TIMEOUT_SECS")
                .unwrap_or(DEFAULT_BREAKER_RESET_TIMEOUT_SECS),
        );
        let breaker = BreakerConfig::new(failure_threshold, reset_timeout);

        Self {
            policy: IdentifyPolicy {
                confidence_threshold: parse_var(&lookup, "SIGHTLINE_CONFIDENCE_THRESHOLD")
                    .unwrap_or(defaults.policy.confidence_threshold),
                max_alternatives: parse_var(&lookup, "SIGHTLINE_MAX_ALTERNATIVES")
                    .unwrap_or(defaults.policy.max_alternatives),
                classifier_timeout: parsed("SIGHTLINE_CLASSIFIER_TIMEOUT_SECS")
                    .map(Duration::from_secs)
                    .unwrap_or(defaults.policy.classifier_timeout),
                enrichment_timeout: parsed("SIGHTLINE_ENRICHMENT_TIMEOUT_SECS")
                    .map(Duration::from_secs)
                    .unwrap_or(defaults.policy.enrichment_timeout),
            },
            fingerprint_cache: CacheConfig::new(
                parse_var(&lookup, "SIGHTLINE_FINGERPRINT_CACHE_CAPACITY")
                    .unwrap_or(DEFAULT_FINGERPRINT_CACHE_CAPACITY),
                Duration::from_secs(
                    parsed("SIGHTLINE_FINGERPRINT_CACHE_TTL_SECS")
                        .unwrap_or(DEFAULT_FINGERPRINT_CACHE_TTL_SECS),
                ),
            )
            .with_shards(shards),
            result_cache: CacheConfig::new(
                parse_var(&lookup, "SIGHTLINE_RESULT_CACHE_CAPACITY")
                    .unwrap_or(DEFAULT_RESULT_CACHE_CAPACITY),
                Duration::from_secs(
                    parsed("SIGHTLINE_RESULT_CACHE_TTL_SECS")
                        .unwrap_or(DEFAULT_RESULT_CACHE_TTL_SECS),
                ),
            )
            .with_shards(shards),
            classifier_breaker: breaker.clone(),
            enrichment_breaker: breaker,
            retry: RetryConfig {
                max_retries: parse_var(&lookup, "SIGHTLINE_DATA_SOURCE_MAX_RETRIES")
                    .unwrap_or(defaults.retry.max_retries),
                ..defaults.retry
            },
            data_source_base_url: lookup("SIGHTLINE_DATA_SOURCE_URL")
                .filter(|s| !s.trim().is_empty())
                .unwrap_or(defaults.data_source_base_url),
        }
    }

    /// Validate the configuration.
    ///
    /// Returns the first invalid field as `ConfigError::InvalidValue`.
    pub fn validate(&self) -> SightlineResult<()> {
        self.policy.validate()?;
        self.fingerprint_cache.validate("fingerprint_cache")?;
        self.result_cache.validate("result_cache")?;
        self.classifier_breaker.validate("classifier_breaker")?;
        self.enrichment_breaker.validate("enrichment_breaker")?;
        self.retry.validate()?;

        if !(self.data_source_base_url.starts_with("http://")
            || self.data_source_base_url.starts_with("https://"))
        {
            return Err(invalid(
                "data_source_base_url",
                &self.data_source_base_url,
                "data_source_base_url must be an http(s) URL",
            ));
        }
        Ok(())
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Option<T>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    lookup(key).and_then(|s| s.trim().parse().ok())
}

fn invalid(
    field: impl Into<String>,
    value: impl ToString,
    reason: impl Into<String>,
) -> SightlineError {
    SightlineError::Config(ConfigError::InvalidValue {
        field: field.into(),
        value: value.to_string(),
        reason: reason.into(),
    })
}

// =============================================================================
// TESTS
// =============================================================================
