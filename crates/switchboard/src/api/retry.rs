//! Retry with exponential backoff.
//!
//! An operation is attempted up to `max_retries + 1` times. The delay before
//! attempt `k + 1` is `base_delay * 2^k`; there is no delay after the final
//! attempt and no jitter. Attempts are strictly sequential. When every
//! attempt fails, the error from the last attempt is returned unchanged.
//!
//! [`with_retry`] treats every failure as retryable. [`with_retry_config`]
//! honours a [`RetryPolicy`], so callers can stop early on errors that will
//! not go away by themselves (bad input, missing credentials, rate limits).

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::Retryable;

/// Which failures are worth another attempt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RetryPolicy {
    /// Retry every failure.
    #[default]
    Always,
    /// Retry only errors whose [`Retryable::is_transient`] is true.
    TransientOnly,
}

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retries (0 = a single attempt).
    pub max_retries: u32,
    /// Delay before the first retry. Doubles for every further retry.
    pub base_delay: Duration,
    pub policy: RetryPolicy,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(1000),
            policy: RetryPolicy::Always,
        }
    }
}

impl RetryConfig {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            ..Default::default()
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Delay to wait after failed attempt `attempt` (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }
}

/// Run `operation` with up to `max_retries` retries, retrying every failure.
pub async fn with_retry<F, Fut, T, E>(
    operation: F,
    max_retries: u32,
    base_delay: Duration,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let config = RetryConfig::new(max_retries, base_delay);
    retry_loop(&config, operation, |_| true).await
}

/// Run `operation` under `config`, consulting its [`RetryPolicy`].
pub async fn with_retry_config<F, Fut, T, E>(config: &RetryConfig, operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable + std::fmt::Display,
{
    let policy = config.policy;
    retry_loop(config, operation, move |err: &E| match policy {
        RetryPolicy::Always => true,
        RetryPolicy::TransientOnly => err.is_transient(),
    })
    .await
}

async fn retry_loop<F, Fut, T, E>(
    config: &RetryConfig,
    mut operation: F,
    should_retry: impl Fn(&E) -> bool,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempt = 0u32;
    loop {
        match operation().await {
            Ok(value) => {
                if attempt > 0 {
                    debug!("Succeeded on attempt {}", attempt + 1);
                }
                return Ok(value);
            }
            Err(err) => {
                if attempt >= config.max_retries {
                    if config.max_retries > 0 {
                        warn!(
                            "Giving up after {} attempts: {err}",
                            config.max_retries + 1
                        );
                    }
                    return Err(err);
                }
                if !should_retry(&err) {
                    debug!("Not retrying non-transient error: {err}");
                    return Err(err);
                }
                let delay = config.delay_for_attempt(attempt);
                warn!(
                    "Attempt {}/{} failed: {err}; retrying in {:?}",
                    attempt + 1,
                    config.max_retries + 1,
                    delay
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::sync::Arc;
    use std::sync::Mutex;
    use tokio::time::Instant;

    #[test]
    fn delay_doubles_per_attempt() {
        let config = RetryConfig::new(5, Duration::from_millis(1000));
        assert_eq!(config.delay_for_attempt(0), Duration::from_millis(1000));
        assert_eq!(config.delay_for_attempt(1), Duration::from_millis(2000));
        assert_eq!(config.delay_for_attempt(2), Duration::from_millis(4000));
    }

    #[test]
    fn delay_saturates() {
        let config = RetryConfig::new(100, Duration::from_secs(1));
        assert_eq!(config.delay_for_attempt(64), Duration::from_secs(u64::from(u32::MAX)));
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_on_fourth_attempt_with_backoff() {
        let start = Instant::now();
        let calls = Arc::new(Mutex::new(Vec::new()));
        let log = calls.clone();

        let result: Result<&str, Error> = with_retry(
            move || {
                let log = log.clone();
                async move {
                    let mut log = log.lock().unwrap();
                    log.push(start.elapsed());
                    if log.len() < 4 {
                        Err(Error::provider(format!("fail {}", log.len())))
                    } else {
                        Ok("done")
                    }
                }
            },
            3,
            Duration::from_millis(1000),
        )
        .await;

        assert_eq!(result.unwrap(), "done");
        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 4);
        let gaps: Vec<Duration> = calls.windows(2).map(|w| w[1] - w[0]).collect();
        assert_eq!(
            gaps,
            vec![
                Duration::from_millis(1000),
                Duration::from_millis(2000),
                Duration::from_millis(4000)
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_return_last_error() {
        let start = Instant::now();
        let attempts = Arc::new(Mutex::new(0u32));
        let counter = attempts.clone();

        let result: Result<(), Error> = with_retry(
            move || {
                let counter = counter.clone();
                async move {
                    let mut n = counter.lock().unwrap();
                    let this = *n;
                    *n += 1;
                    Err(Error::provider(format!("attempt {this}")))
                }
            },
            3,
            Duration::from_millis(1000),
        )
        .await;

        assert_eq!(*attempts.lock().unwrap(), 4);
        match result {
            Err(Error::Provider { message, .. }) => assert_eq!(message, "attempt 3"),
            other => panic!("unexpected {other:?}"),
        }
        // No delay after the final attempt: 1s + 2s + 4s.
        assert_eq!(start.elapsed(), Duration::from_millis(7000));
    }

    #[tokio::test(start_paused = true)]
    async fn zero_retries_is_a_single_attempt() {
        let attempts = Arc::new(Mutex::new(0u32));
        let counter = attempts.clone();
        let result: Result<(), String> = with_retry(
            move || {
                let counter = counter.clone();
                async move {
                    *counter.lock().unwrap() += 1;
                    Err("nope".to_string())
                }
            },
            0,
            Duration::from_millis(10),
        )
        .await;
        assert_eq!(result.unwrap_err(), "nope");
        assert_eq!(*attempts.lock().unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_only_stops_on_validation_error() {
        let attempts = Arc::new(Mutex::new(0u32));
        let counter = attempts.clone();
        let config = RetryConfig::new(3, Duration::from_millis(100))
            .with_policy(RetryPolicy::TransientOnly);

        let result: Result<(), Error> = with_retry_config(&config, move || {
            let counter = counter.clone();
            async move {
                *counter.lock().unwrap() += 1;
                Err(Error::validation("empty message"))
            }
        })
        .await;

        assert!(matches!(result, Err(Error::Validation(_))));
        assert_eq!(*attempts.lock().unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_only_retries_provider_errors() {
        let attempts = Arc::new(Mutex::new(0u32));
        let counter = attempts.clone();
        let config = RetryConfig::new(2, Duration::from_millis(100))
            .with_policy(RetryPolicy::TransientOnly);

        let result: Result<u32, Error> = with_retry_config(&config, move || {
            let counter = counter.clone();
            async move {
                let mut n = counter.lock().unwrap();
                *n += 1;
                if *n < 3 {
                    Err(Error::from_status(502, "bad gateway", None))
                } else {
                    Ok(*n)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 3);
    }
}
