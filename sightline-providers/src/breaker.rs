//! Generic circuit breaker.
//!
//! One breaker guards one remote dependency. It only distinguishes success
//! from failure; payload types pass through untouched. Timeouts are the
//! caller's job: wrap the operation in `tokio::time::timeout` and map the
//! elapsed case to an error.
//!
//! State transitions:
//!
//! - Closed: calls pass. Failures accumulate; a success resets the count.
//!   Reaching `failure_threshold` opens the breaker.
//! - Open: calls fail fast. Once `reset_timeout` has elapsed since opening,
//!   the next call becomes the single trial and the breaker is HalfOpen.
//! - HalfOpen: other calls fail fast. Trial success closes, trial failure
//!   reopens. A trial dropped before completion also reopens.

use std::future::Future;
use std::sync::{Mutex, MutexGuard};

use sightline_core::{BreakerConfig, CircuitState, FailureRecord};
use thiserror::Error;
use tokio::time::Instant;

/// Outcome of a call made through a [`CircuitBreaker`].
#[derive(Debug, Error)]
pub enum BreakerError<E> {
    /// The breaker rejected the call without running it.
    #[error("circuit breaker '{name}' is open")]
    Open { name: String },

    /// The operation ran and failed.
    #[error(transparent)]
    Inner(E),
}

impl<E> BreakerError<E> {
    pub fn is_open(&self) -> bool {
        matches!(self, BreakerError::Open { .. })
    }

    /// The operation's own error, if it ran.
    pub fn into_inner(self) -> Option<E> {
        match self {
            BreakerError::Inner(e) => Some(e),
            BreakerError::Open { .. } => None,
        }
    }
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    failures: u32,
    last_failure_at: Option<Instant>,
    opened_at: Option<Instant>,
    trial_in_flight: bool,
}

/// Three-state circuit breaker for one dependency.
pub struct CircuitBreaker {
    name: String,
    config: BreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: BreakerConfig) -> Self {
        Self {
            name: name.into(),
            config: BreakerConfig {
                failure_threshold: config.failure_threshold.max(1),
                ..config
            },
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                failures: 0,
                last_failure_at: None,
                opened_at: None,
                trial_in_flight: false,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &BreakerConfig {
        &self.config
    }

    /// Current state. An Open breaker past its reset timeout still reports
    /// Open until a call arrives to probe it.
    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    pub fn failure_record(&self) -> FailureRecord {
        let inner = self.lock();
        FailureRecord {
            count: inner.failures,
            last_failure_ago_ms: inner
                .last_failure_at
                .map(|at| at.elapsed().as_millis() as u64),
        }
    }

    /// Force the breaker closed and forget all failures.
    pub fn reset(&self) {
        let mut inner = self.lock();
        inner.state = CircuitState::Closed;
        inner.failures = 0;
        inner.last_failure_at = None;
        inner.opened_at = None;
        inner.trial_in_flight = false;
        tracing::info!(breaker = %self.name, "Circuit breaker reset");
    }

    /// Run `op` through the breaker, counting every `Err` as a failure.
    pub async fn call<F, Fut, T, E>(&self, op: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.call_classified(op, |_| true).await
    }

    /// Run `op` through the breaker, counting only errors for which
    /// `counts_as_failure` returns true. Other errors are passed through and
    /// treated as a healthy response.
    pub async fn call_classified<F, Fut, T, E, C>(
        &self,
        op: F,
        counts_as_failure: C,
    ) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        C: FnOnce(&E) -> bool,
    {
        let permit = self.admit::<E>()?;
        let outcome = op().await;

        let failed = match &outcome {
            Ok(_) => false,
            Err(e) => counts_as_failure(e),
        };
        if failed {
            permit.failure();
        } else {
            permit.success();
        }

        outcome.map_err(BreakerError::Inner)
    }

    fn lock(&self) -> MutexGuard<'_, BreakerInner> {
        // Every update leaves the state consistent, so a poisoned lock is usable.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn admit<E>(&self) -> Result<Permit<'_>, BreakerError<E>> {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed => Ok(Permit::new(self, false)),
            CircuitState::Open => {
                let ready = inner
                    .opened_at
                    .map_or(true, |at| at.elapsed() >= self.config.reset_timeout);
                if ready {
                    inner.state = CircuitState::HalfOpen;
                    inner.trial_in_flight = true;
                    tracing::info!(breaker = %self.name, "Circuit breaker half-open, admitting trial call");
                    Ok(Permit::new(self, true))
                } else {
                    Err(self.rejected())
                }
            }
            CircuitState::HalfOpen => {
                if inner.trial_in_flight {
                    Err(self.rejected())
                } else {
                    inner.trial_in_flight = true;
                    Ok(Permit::new(self, true))
                }
            }
        }
    }

    fn rejected<E>(&self) -> BreakerError<E> {
        tracing::debug!(breaker = %self.name, "Circuit breaker rejected call");
        BreakerError::Open {
            name: self.name.clone(),
        }
    }

    fn record_success(&self, trial: bool) {
        let mut inner = self.lock();
        if trial {
            inner.state = CircuitState::Closed;
            inner.failures = 0;
            inner.opened_at = None;
            inner.trial_in_flight = false;
            tracing::info!(breaker = %self.name, "Circuit breaker closed after successful trial");
        } else if inner.state == CircuitState::Closed {
            inner.failures = 0;
        }
    }

    fn record_failure(&self, trial: bool) {
        let mut inner = self.lock();
        let now = Instant::now();
        if trial {
            inner.failures = inner.failures.saturating_add(1);
            inner.last_failure_at = Some(now);
            self.open(&mut inner, now);
        } else if inner.state == CircuitState::Closed {
            inner.failures = inner.failures.saturating_add(1);
            inner.last_failure_at = Some(now);
            if inner.failures >= self.config.failure_threshold {
                self.open(&mut inner, now);
            }
        }
        // Stragglers admitted before the breaker opened do not extend it.
    }

    fn abandon_trial(&self) {
        let mut inner = self.lock();
        tracing::warn!(breaker = %self.name, "Circuit breaker trial call abandoned");
        self.open(&mut inner, Instant::now());
    }

    fn open(&self, inner: &mut BreakerInner, now: Instant) {
        inner.state = CircuitState::Open;
        inner.opened_at = Some(now);
        inner.trial_in_flight = false;
        tracing::warn!(
            breaker = %self.name,
            failures = inner.failures,
            reset_timeout_ms = self.config.reset_timeout.as_millis() as u64,
            "Circuit breaker opened"
        );
    }
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.lock();
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("state", &inner.state)
            .field("failures", &inner.failures)
            .field("trial_in_flight", &inner.trial_in_flight)
            .finish()
    }
}

/// Admission ticket for one call. Reports the outcome exactly once.
struct Permit<'a> {
    breaker: &'a CircuitBreaker,
    trial: bool,
    settled: bool,
}

impl<'a> Permit<'a> {
    fn new(breaker: &'a CircuitBreaker, trial: bool) -> Self {
        Self {
            breaker,
            trial,
            settled: false,
        }
    }

    fn success(mut self) {
        self.settled = true;
        self.breaker.record_success(self.trial);
    }

    fn failure(mut self) {
        self.settled = true;
        self.breaker.record_failure(self.trial);
    }
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        if !self.settled && self.trial {
            self.breaker.abandon_trial();
        }
    }
}


#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;
    use std::time::Duration;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Closed breakers open exactly when the run of trailing failures
        /// reaches the threshold.
        #[test]
        fn prop_opens_on_consecutive_failures(
            threshold in 1u32..8,
            outcomes in prop::collection::vec(any::<bool>(), 0..40)
        ) {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .build()
                .unwrap();
            rt.block_on(async {
                let b = CircuitBreaker::new(
                    "prop",
                    BreakerConfig::new(threshold, Duration::from_secs(3600)),
                );
                let mut run = 0u32;
                let mut opened = false;
                for ok in outcomes {
                    let result = b
                        .call(|| async move { if ok { Ok(()) } else { Err("x") } })
                        .await;
                    if opened {
                        prop_assert!(result.unwrap_err().is_open());
                        continue;
                    }
                    run = if ok { 0 } else { run + 1 };
                    if run >= threshold {
                        opened = true;
                    }
                    prop_assert_eq!(b.state() == CircuitState::Open, opened);
                }
                Ok(())
            })?;
        }
    }
}
