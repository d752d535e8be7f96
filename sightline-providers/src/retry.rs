//! Exponential backoff for transient data source failures.

use std::future::Future;

use sightline_core::{DataSourceError, RetryConfig};

/// Run `op` until it succeeds, fails with a non-retryable error, or runs out
/// of retries. Sleeps `config.backoff_for(attempt)` between attempts.
///
/// The whole sequence counts as one call to whoever wraps it, so a breaker
/// around this sees at most one failure per exhausted sequence.
pub async fn with_retry<F, Fut, T>(
    config: &RetryConfig,
    operation: &str,
    mut op: F,
) -> Result<T, DataSourceError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, DataSourceError>>,
{
    let mut attempt = 0u32;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < config.max_retries => {
                let delay = config.backoff_for(attempt);
                tracing::warn!(
                    operation,
                    attempt = attempt + 1,
                    max_attempts = config.max_retries + 1,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Transient failure, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                if attempt > 0 {
                    tracing::warn!(
                        operation,
                        attempts = attempt + 1,
                        error = %e,
                        "Giving up after retries"
                    );
                }
                return Err(e);
            }
        }
    }
}
