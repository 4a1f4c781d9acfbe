use crate::config::RetryConfig;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

/// Redelivery delay after the given number of failed attempts:
/// `min(base * 2^(attempts-1), max) + random(0..base)`
pub fn backoff_delay(config: &RetryConfig, attempts: u32) -> Duration {
    let base = config.backoff_base_ms.max(1);
    let exponent = attempts.saturating_sub(1).min(32);
    let backoff_ms = base
        .saturating_mul(1u64 << exponent)
        .min(config.backoff_max_ms.max(base));
    let jitter = rand::random::<u64>() % base;
    Duration::from_millis(backoff_ms + jitter)
}

/// Execute an async operation with jittered exponential backoff.
/// Errors rejected by `should_retry` are returned at once.
pub async fn retry_with_backoff<F, Fut, T, E, P>(
    config: &RetryConfig,
    should_retry: P,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    P: Fn(&E) -> bool,
{
    let mut attempts = 0;

    loop {
        attempts += 1;

        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) if !should_retry(&e) => return Err(e),
            Err(e) if attempts >= config.max_attempts => {
                warn!("All {} attempts failed: {}", attempts, e);
                return Err(e);
            }
            Err(e) => {
                let delay = backoff_delay(config, attempts);

                warn!(
                    "Attempt {} failed: {}. Retrying in {:?}...",
                    attempts, e, delay
                );

                sleep(delay).await;
            }
        }
    }
}
