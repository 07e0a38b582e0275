//! Retry with exponential backoff and jitter
//!
//! Sleeps between attempts are interrupted by shutdown, in which case the
//! last error is returned.

use std::time::Duration;

use rand::Rng;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

use crate::config::RetryConfig;

/// Delay before retry number `attempt` (1-based), without jitter
pub fn backoff_delay(config: &RetryConfig, attempt: u32) -> Duration {
    let factor = config
        .backoff_multiplier
        .max(1.0)
        .powi(attempt.saturating_sub(1) as i32);
    let delay = config.initial_delay.as_secs_f64() * factor;
    Duration::try_from_secs_f64(delay.min(config.max_delay.as_secs_f64()))
        .unwrap_or(config.max_delay)
}

/// Run `operation` until it succeeds, fails with an error `should_retry`
/// rejects, exhausts `max_attempts` (0 = infinite) or `cancel` fires.
pub async fn retry_with_backoff<F, Fut, T, E>(
    config: &RetryConfig,
    operation_name: &str,
    cancel: &CancellationToken,
    should_retry: impl Fn(&E) -> bool,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempt = 0u32;

    loop {
        attempt += 1;

        let e = match operation().await {
            Ok(result) => return Ok(result),
            Err(e) => e,
        };

        if !should_retry(&e) {
            return Err(e);
        }
        if config.max_attempts > 0 && attempt >= config.max_attempts {
            error!(
                operation = %operation_name,
                attempt = attempt,
                error = %e,
                "Operation failed after max retries"
            );
            return Err(e);
        }
        if cancel.is_cancelled() {
            return Err(e);
        }

        // Add jitter: 0.5x to 1.5x of the delay
        let jitter = rand::rng().random_range(0.5..1.5);
        let base = backoff_delay(config, attempt);
        let delay = Duration::try_from_secs_f64(base.as_secs_f64() * jitter).unwrap_or(base);

        warn!(
            operation = %operation_name,
            attempt = attempt,
            error = %e,
            delay_ms = delay.as_millis(),
            "Operation failed, retrying"
        );

        tokio::select! {
            _ = cancel.cancelled() => return Err(e),
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast(max_attempts: u32) -> RetryConfig {
        RetryConfig {
            max_attempts,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            backoff_multiplier: 2.0,
        }
    }

    #[test]
    fn test_backoff_delay_grows_and_caps() {
        let config = RetryConfig {
            max_attempts: 0,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(1),
            backoff_multiplier: 2.0,
        };

        assert_eq!(backoff_delay(&config, 1), Duration::from_millis(100));
        assert_eq!(backoff_delay(&config, 2), Duration::from_millis(200));
        assert_eq!(backoff_delay(&config, 3), Duration::from_millis(400));
        assert_eq!(backoff_delay(&config, 10), Duration::from_secs(1));
    }

    #[test]
    fn test_backoff_delay_saturates_on_huge_durations() {
        let config = RetryConfig {
            max_attempts: 0,
            initial_delay: Duration::MAX,
            max_delay: Duration::MAX,
            backoff_multiplier: 1e300,
        };

        assert_eq!(backoff_delay(&config, 1), Duration::MAX);
        assert_eq!(backoff_delay(&config, 40), Duration::MAX);
    }

    #[tokio::test]
    async fn test_retries_until_success() {
        let calls = AtomicU32::new(0);

        let result: Result<u32, String> = retry_with_backoff(
            &fast(5),
            "flaky",
            &CancellationToken::new(),
            |_| true,
            || async {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 3 {
                    Err(format!("attempt {n}"))
                } else {
                    Ok(n)
                }
            },
        )
        .await;

        assert_eq!(result, Ok(3));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_stops_at_max_attempts() {
        let calls = AtomicU32::new(0);

        let result: Result<(), String> = retry_with_backoff(
            &fast(2),
            "broken",
            &CancellationToken::new(),
            |_| true,
            || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err("nope".to_string())
            },
        )
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_non_retryable_fails_immediately() {
        let calls = AtomicU32::new(0);

        let result: Result<(), String> = retry_with_backoff(
            &fast(5),
            "fatal",
            &CancellationToken::new(),
            |_| false,
            || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err("fatal".to_string())
            },
        )
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancel_interrupts_backoff() {
        let cancel = CancellationToken::new();
        let config = RetryConfig {
            max_attempts: 0,
            initial_delay: Duration::from_secs(3600),
            max_delay: Duration::from_secs(3600),
            backoff_multiplier: 1.0,
        };

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let result: Result<(), String> = tokio::time::timeout(
            Duration::from_secs(5),
            retry_with_backoff(&config, "slow", &cancel, |_| true, || async {
                Err("down".to_string())
            }),
        )
        .await
        .expect("retry should return once cancelled");

        assert!(result.is_err());
    }
}
