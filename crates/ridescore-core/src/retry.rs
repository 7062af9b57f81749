//! Retry logic with exponential backoff
//!
//! Online lookups are not retried unless a deployment opts in. When enabled,
//! only transient failures are retried:
//! - Network timeouts and refused connections
//! - Temporary store unavailability
//! - Lookups cut off by the configured lookup timeout
//!
//! # Example
//!
//! ```rust,ignore
//! use ridescore_core::retry::{is_retryable, retry_async_if, RetryPolicy};
//!
//! let policy = RetryPolicy::default();
//! let result = retry_async_if(&policy, || async {
//!     provider.get_online_features(&refs, &rows).await
//! }, is_retryable).await?;
//! ```

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// Retry policy configuration
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of retry attempts (0 = single attempt)
    pub max_retries: usize,

    /// Initial backoff delay
    pub initial_delay: Duration,

    /// Maximum backoff delay (caps exponential growth)
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (typically 2.0)
    pub backoff_multiplier: f64,

    /// Add random jitter to prevent thundering herd (0.0-1.0)
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            backoff_multiplier: 2.0,
            jitter_factor: 0.1,
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no backoff
    pub fn disabled() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.max_retries > 0
    }

    /// Calculate backoff delay for a given attempt
    pub fn backoff_delay(&self, attempt: usize) -> Duration {
        let base_delay =
            self.initial_delay.as_millis() as f64 * self.backoff_multiplier.powi(attempt as i32);

        let capped_delay = base_delay.min(self.max_delay.as_millis() as f64);

        // Jitter: random value between (1 - jitter) and (1 + jitter)
        let jitter = 1.0 + (rand::random::<f64>() * 2.0 - 1.0) * self.jitter_factor;
        let final_delay = (capped_delay * jitter) as u64;

        Duration::from_millis(final_delay)
    }
}

/// Serializable retry settings, as found in configuration files
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetryConfig {
    #[serde(default)]
    pub max_retries: usize,

    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 0,
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

fn default_initial_delay_ms() -> u64 {
    100
}

fn default_max_delay_ms() -> u64 {
    5_000
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            initial_delay: Duration::from_millis(config.initial_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms.max(config.initial_delay_ms)),
            ..Self::default()
        }
    }
}

/// Determine if an error is transient
pub fn is_retryable(error: &crate::Error) -> bool {
    match error {
        crate::Error::Provider(e) => {
            let error_str = e.to_string().to_lowercase();
            error_str.contains("network")
                || error_str.contains("connection")
                || error_str.contains("timeout")
                || error_str.contains("timed out")
                || error_str.contains("temporary")
                || error_str.contains("unavailable")
                || error_str.contains("broken pipe")
        }
        crate::Error::Connection(_) | crate::Error::Timeout(_) => true,
        _ => false,
    }
}

/// Retry an async operation with exponential backoff while `retryable` holds
///
/// Returns the last error once retries are exhausted or as soon as an error is
/// not retryable.
pub async fn retry_async_if<F, Fut, T, E, P>(
    policy: &RetryPolicy,
    mut operation: F,
    retryable: P,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    P: Fn(&E) -> bool,
{
    let mut attempts = 0;
    let mut total_delay = Duration::from_secs(0);

    loop {
        attempts += 1;

        match operation().await {
            Ok(result) => {
                if attempts > 1 {
                    debug!(
                        attempts,
                        total_delay_ms = total_delay.as_millis() as u64,
                        "Operation succeeded after retry"
                    );
                }
                return Ok(result);
            }
            Err(error) => {
                if attempts > policy.max_retries || !retryable(&error) {
                    if attempts > 1 {
                        warn!(
                            attempts,
                            total_delay_ms = total_delay.as_millis() as u64,
                            error = %error,
                            "Operation failed after retries"
                        );
                    }
                    return Err(error);
                }

                let delay = policy.backoff_delay(attempts - 1);
                total_delay += delay;

                debug!(
                    attempt = attempts,
                    max_attempts = policy.max_retries + 1,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "Operation failed, retrying"
                );

                tokio::time::sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn fast_policy(max_retries: usize) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(10),
            backoff_multiplier: 2.0,
            jitter_factor: 0.0,
        }
    }

    #[test]
    fn test_retry_policy_disabled() {
        let policy = RetryPolicy::disabled();
        assert_eq!(policy.max_retries, 0);
        assert!(!policy.is_enabled());
    }

    #[test]
    fn test_backoff_delay_exponential_and_capped() {
        let policy = RetryPolicy {
            max_retries: 10,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(500),
            backoff_multiplier: 2.0,
            jitter_factor: 0.0,
        };

        assert_eq!(policy.backoff_delay(0), Duration::from_millis(100));
        assert_eq!(policy.backoff_delay(1), Duration::from_millis(200));
        assert_eq!(policy.backoff_delay(2), Duration::from_millis(400));
        assert_eq!(policy.backoff_delay(5), Duration::from_millis(500));
    }

    #[test]
    fn test_policy_from_config() {
        let config = RetryConfig {
            max_retries: 2,
            initial_delay_ms: 50,
            max_delay_ms: 20,
        };
        let policy = RetryPolicy::from(&config);
        assert_eq!(policy.max_retries, 2);
        assert_eq!(policy.initial_delay, Duration::from_millis(50));
        // max_delay never drops below the initial delay
        assert_eq!(policy.max_delay, Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_retry_succeeds_after_transient_failures() {
        let counter = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&counter);

        let result = retry_async_if(
            &fast_policy(3),
            || {
                let c = Arc::clone(&c);
                async move {
                    let attempt = c.fetch_add(1, Ordering::SeqCst) + 1;
                    if attempt < 3 {
                        Err(crate::Error::provider("connection reset"))
                    } else {
                        Ok(42)
                    }
                }
            },
            is_retryable,
        )
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_disabled_policy_makes_single_attempt() {
        let counter = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&counter);

        let result: Result<i32, crate::Error> = retry_async_if(
            &RetryPolicy::disabled(),
            || {
                let c = Arc::clone(&c);
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Err(crate::Error::provider("connection refused"))
                }
            },
            is_retryable,
        )
        .await;

        assert!(result.is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_non_retryable_error_stops_immediately() {
        let counter = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&counter);

        let result: Result<i32, crate::Error> = retry_async_if(
            &fast_policy(5),
            || {
                let c = Arc::clone(&c);
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Err(crate::Error::invalid_input("missing join key"))
                }
            },
            is_retryable,
        )
        .await;

        assert!(matches!(result, Err(crate::Error::InvalidInput(_))));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_is_retryable() {
        assert!(is_retryable(&crate::Error::provider("Network timeout")));
        assert!(is_retryable(&crate::Error::provider("Connection refused")));
        assert!(is_retryable(&crate::Error::Timeout(100)));
        assert!(!is_retryable(&crate::Error::provider("WRONGTYPE Operation")));
        assert!(!is_retryable(&crate::Error::invalid_input("bad request")));
        assert!(!is_retryable(&crate::Error::model_load("corrupt")));
    }
}
