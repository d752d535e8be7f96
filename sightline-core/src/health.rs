//! Health check types
//!
//! An orchestrator reports one check per protected dependency and per cache,
//! rolled up into a single `HealthReport`.

use crate::{CircuitState, FailureRecord, ModelInfo, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Health status for a service or component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Component is fully operational
    Healthy,
    /// Component is operational but degraded
    Degraded,
    /// Component is not operational
    Unhealthy,
}

impl From<CircuitState> for HealthStatus {
    fn from(state: CircuitState) -> Self {
        match state {
            CircuitState::Closed => HealthStatus::Healthy,
            CircuitState::HalfOpen => HealthStatus::Degraded,
            CircuitState::Open => HealthStatus::Unhealthy,
        }
    }
}

/// Detailed health check result for a component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthCheck {
    /// Overall health status
    pub status: HealthStatus,
    /// Component name
    pub component: String,
    /// Detailed status message
    pub message: Option<String>,
    /// Additional metadata
    pub metadata: Option<HashMap<String, serde_json::Value>>,
}

impl HealthCheck {
    /// Create a healthy check result.
    pub fn healthy(component: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Healthy,
            component: component.into(),
            message: None,
            metadata: None,
        }
    }

    /// Create a degraded check result.
    pub fn degraded(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Degraded,
            component: component.into(),
            message: Some(message.into()),
            metadata: None,
        }
    }

    /// Create an unhealthy check result.
    pub fn unhealthy(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Unhealthy,
            component: component.into(),
            message: Some(message.into()),
            metadata: None,
        }
    }

    /// Check derived from a circuit breaker's state.
    pub fn for_breaker(
        component: impl Into<String>,
        state: CircuitState,
        failures: FailureRecord,
    ) -> Self {
        let component = component.into();
        let check = match state {
            CircuitState::Closed => Self::healthy(component),
            CircuitState::HalfOpen => Self::degraded(component, "circuit half-open, probing"),
            CircuitState::Open => Self::unhealthy(component, "circuit open, failing fast"),
        };
        check
            .with_metadata("circuit_state", serde_json::json!(state.as_str()))
            .with_metadata("consecutive_failures", serde_json::json!(failures.count))
    }

    /// Add metadata.
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata
            .get_or_insert_with(HashMap::new)
            .insert(key.into(), value);
        self
    }
}

/// Aggregate health of an orchestrator and its dependencies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    /// Worst status among `checks`
    pub status: HealthStatus,
    pub checks: Vec<HealthCheck>,
    pub model: ModelInfo,
    pub checked_at: Timestamp,
}

impl HealthReport {
    pub fn new(checks: Vec<HealthCheck>, model: ModelInfo, checked_at: Timestamp) -> Self {
        let status = checks
            .iter()
            .map(|c| c.status)
            .max()
            .unwrap_or(HealthStatus::Healthy);
        Self {
            status,
            checks,
            model,
            checked_at,
        }
    }

    /// Look up a check by component name.
    pub fn check(&self, component: &str) -> Option<&HealthCheck> {
        self.checks.iter().find(|c| c.component == component)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn model() -> ModelInfo {
        ModelInfo {
            name: "mock".to_string(),
            version: "1.0.0".to_string(),
            num_classes: 20,
        }
    }

    #[test]
    fn test_breaker_state_maps_to_status() {
        assert_eq!(HealthStatus::from(CircuitState::Closed), HealthStatus::Healthy);
        assert_eq!(HealthStatus::from(CircuitState::HalfOpen), HealthStatus::Degraded);
        assert_eq!(HealthStatus::from(CircuitState::Open), HealthStatus::Unhealthy);
    }

    #[test]
    fn test_for_breaker_metadata() {
        let check = HealthCheck::for_breaker(
            "classifier",
            CircuitState::Open,
            FailureRecord {
                count: 5,
                last_failure_ago_ms: Some(10),
            },
        );
        assert_eq!(check.status, HealthStatus::Unhealthy);
        let meta = check.metadata.unwrap();
        assert_eq!(meta["circuit_state"], "open");
        assert_eq!(meta["consecutive_failures"], 5);
    }

    #[test]
    fn test_report_takes_worst_status() {
        let report = HealthReport::new(
            vec![
                HealthCheck::healthy("fingerprint_cache"),
                HealthCheck::degraded("data_source", "probing"),
                HealthCheck::healthy("classifier"),
            ],
            model(),
            Utc::now(),
        );
        assert_eq!(report.status, HealthStatus::Degraded);
        assert!(report.check("data_source").is_some());
        assert!(report.check("nope").is_none());

        let empty = HealthReport::new(vec![], model(), Utc::now());
        assert_eq!(empty.status, HealthStatus::Healthy);
    }

    #[test]
    fn test_status_serializes_lowercase() {
        let json = serde_json::to_string(&HealthStatus::Unhealthy).unwrap();
        assert_eq!(json, "\"unhealthy\"");
    }
}
