//! Retry manager with exponential backoff
//!
//! Bounded retry for single-shot provider requests:
//! - Max attempts: configurable (default 3)
//! - Strategy: binary exponential with ±25% jitter, capped
//! - Only transient errors (transport, timeouts, 5xx/429) are retried

use crate::errors::{AgentError, Result};
use std::time::Duration;
use tokio::time::sleep;

/// Default number of attempts (first try included)
pub const MAX_ATTEMPTS: u32 = 3;

/// Base delay for exponential backoff
const BASE_DELAY_MS: u64 = 250;

/// Maximum delay cap
const MAX_DELAY_MS: u64 = 4000;

/// Retry manager with exponential backoff
#[derive(Debug, Clone)]
pub struct RetryManager {
    /// Maximum attempts, first try included
    max_attempts: u32,

    /// Base delay in milliseconds
    base_delay_ms: u64,

    /// Maximum delay cap in milliseconds
    max_delay_ms: u64,

    /// Enable jitter
    enable_jitter: bool,
}

impl Default for RetryManager {
    fn default() -> Self {
        Self::new()
    }
}

impl RetryManager {
    /// Create new retry manager with default settings
    pub fn new() -> Self {
        Self {
            max_attempts: MAX_ATTEMPTS,
            base_delay_ms: BASE_DELAY_MS,
            max_delay_ms: MAX_DELAY_MS,
            enable_jitter: true,
        }
    }

    /// Create retry manager with custom settings
    pub fn with_config(max_attempts: u32, base_delay_ms: u64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay_ms,
            max_delay_ms: MAX_DELAY_MS,
            enable_jitter: true,
        }
    }

    /// Execute operation with retry logic. The last error is returned as-is.
    pub async fn execute_with_retry<F, Fut, T>(&self, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let mut attempt = 0;

        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) => {
                    attempt += 1;

                    if !e.is_transient() || attempt >= self.max_attempts {
                        return Err(e);
                    }

                    let delay = self.calculate_delay(attempt - 1);
                    tracing::debug!(attempt, delay_ms = delay.as_millis() as u64, error = %e, "retrying provider request");
                    sleep(delay).await;
                }
            }
        }
    }

    /// Calculate delay for given retry number (0-based)
    fn calculate_delay(&self, retry: u32) -> Duration {
        let exponential_delay = self.base_delay_ms.saturating_mul(2u64.saturating_pow(retry));
        let delay_ms = exponential_delay.min(self.max_delay_ms);

        let final_delay = if self.enable_jitter {
            let jitter = (delay_ms / 4) as f64;
            let random_jitter = (rand::random::<f64>() * 2.0 - 1.0) * jitter;
            ((delay_ms as f64) + random_jitter).max(0.0) as u64
        } else {
            delay_ms
        };

        Duration::from_millis(final_delay)
    }

    /// Get max attempts
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[tokio::test]
    async fn test_retry_success_first_attempt() {
        let retry_manager = RetryManager::new();

        let attempt_count = Arc::new(Mutex::new(0));
        let count_clone = attempt_count.clone();

        let result = retry_manager
            .execute_with_retry(move || {
                let count = count_clone.clone();
                async move {
                    *count.lock().unwrap() += 1;
                    Ok::<i32, AgentError>(42)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(*attempt_count.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_retry_success_after_failures() {
        let retry_manager = RetryManager::with_config(3, 1);

        let attempt_count = Arc::new(Mutex::new(0));
        let count_clone = attempt_count.clone();

        let result = retry_manager
            .execute_with_retry(move || {
                let count = count_clone.clone();
                async move {
                    let current = {
                        let mut attempts = count.lock().unwrap();
                        *attempts += 1;
                        *attempts
                    };

                    if current < 3 {
                        Err(AgentError::ProviderStatus {
                            status: 503,
                            body: String::new(),
                        })
                    } else {
                        Ok(42)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(*attempt_count.lock().unwrap(), 3);
    }

    #[tokio::test]
    async fn test_retry_max_attempts_exceeded() {
        let retry_manager = RetryManager::with_config(3, 1);

        let attempt_count = Arc::new(Mutex::new(0));
        let count_clone = attempt_count.clone();

        let result = retry_manager
            .execute_with_retry(move || {
                let count = count_clone.clone();
                async move {
                    *count.lock().unwrap() += 1;
                    Err::<i32, _>(AgentError::Timeout { duration_ms: 10 })
                }
            })
            .await;

        assert!(matches!(result, Err(AgentError::Timeout { .. })));
        assert_eq!(*attempt_count.lock().unwrap(), 3);
    }

    #[tokio::test]
    async fn test_non_retryable_error() {
        let retry_manager = RetryManager::new();

        let attempt_count = Arc::new(Mutex::new(0));
        let count_clone = attempt_count.clone();

        let result = retry_manager
            .execute_with_retry(move || {
                let count = count_clone.clone();
                async move {
                    *count.lock().unwrap() += 1;
                    Err::<i32, _>(AgentError::ConfigError("Permanent error".to_string()))
                }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(*attempt_count.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_rejected_request_is_attempted_once() {
        let retry_manager = RetryManager::with_config(3, 1);
        let attempt_count = Arc::new(Mutex::new(0));

        for error in [
            AgentError::ProviderStatus {
                status: 400,
                body: "invalid options".to_string(),
            },
            AgentError::LlmError("Failed to parse response".to_string()),
        ] {
            *attempt_count.lock().unwrap() = 0;
            let count_clone = attempt_count.clone();
            let error = Arc::new(Mutex::new(Some(error)));

            let result = retry_manager
                .execute_with_retry(move || {
                    let count = count_clone.clone();
                    let error = error.clone();
                    async move {
                        *count.lock().unwrap() += 1;
                        let err = error
                            .lock()
                            .unwrap()
                            .take()
                            .unwrap_or_else(|| AgentError::Generic("called twice".to_string()));
                        Err::<i32, _>(err)
                    }
                })
                .await;

            assert!(result.is_err());
            assert_eq!(*attempt_count.lock().unwrap(), 1);
        }
    }

    #[test]
    fn test_calculate_delay() {
        let retry_manager = RetryManager {
            max_attempts: 5,
            base_delay_ms: 250,
            max_delay_ms: 4000,
            enable_jitter: false,
        };

        assert_eq!(retry_manager.calculate_delay(0), Duration::from_millis(250));
        assert_eq!(retry_manager.calculate_delay(1), Duration::from_millis(500));
        assert_eq!(retry_manager.calculate_delay(2), Duration::from_millis(1000));
        assert_eq!(retry_manager.calculate_delay(10), Duration::from_millis(4000));
    }
}
