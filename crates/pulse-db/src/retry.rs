//! Transaction retry with exponential backoff and jitter.
//!
//! Wallet rows are locked in a fixed order, so deadlocks should not happen,
//! but serialization failures and pool timeouts still can. Those are
//! retried here; domain errors are returned immediately.

use std::time::{Duration, Instant};

use tracing::{info_span, warn, Instrument};

use crate::error::{DbError, DbResult};
use crate::metrics::{record_retry, record_transaction};

// =============================================================================
// Configuration
// =============================================================================

/// Retry policy configuration.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts.
    pub max_retries: u32,
    /// Base delay for exponential backoff (in milliseconds).
    pub base_delay_ms: u64,
    /// Maximum delay cap (in milliseconds).
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 25,
            max_delay_ms: 1000,
        }
    }
}

impl RetryConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let base_delay_ms: u64 = std::env::var("DB_RETRY_BASE_MS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(25);

        let max_delay_ms: u64 = std::env::var("DB_RETRY_MAX_MS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(1000);

        Self {
            max_retries: 3,
            base_delay_ms,
            max_delay_ms,
        }
    }
}

// =============================================================================
// Retry Policy
// =============================================================================

/// Run `op` (usually one whole transaction) with retry.
///
/// Retries on serialization failure (40001), deadlock (40P01) and pool
/// timeouts. Once retries are exhausted on a retryable error, returns
/// [`DbError::RetryLimitExceeded`].
pub async fn with_retry<T, F, Fut>(config: &RetryConfig, operation: &str, op: F) -> DbResult<T>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = DbResult<T>>,
{
    let started = Instant::now();

    for attempt in 0..=config.max_retries {
        let span = info_span!("db_tx", operation = %operation, attempt = attempt + 1);

        match op().instrument(span).await {
            Ok(value) => {
                record_transaction(operation, true, started.elapsed().as_secs_f64() * 1000.0);
                return Ok(value);
            }
            Err(e) if e.is_retryable() && attempt < config.max_retries => {
                let delay = calculate_delay(config, attempt);

                warn!(
                    operation = %operation,
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    "Transaction failed, retrying: {}",
                    e
                );

                record_retry(operation);
                tokio::time::sleep(delay).await;
            }
            Err(e) if e.is_retryable() => {
                record_transaction(operation, false, started.elapsed().as_secs_f64() * 1000.0);
                warn!(operation = %operation, error = %e, "Retry limit exceeded");
                return Err(DbError::RetryLimitExceeded {
                    attempts: config.max_retries + 1,
                });
            }
            Err(e) => {
                record_transaction(operation, false, started.elapsed().as_secs_f64() * 1000.0);
                return Err(e);
            }
        }
    }

    Err(DbError::RetryLimitExceeded {
        attempts: config.max_retries + 1,
    })
}

/// Calculate retry delay with exponential backoff and full jitter.
fn calculate_delay(config: &RetryConfig, attempt: u32) -> Duration {
    // base * 2^attempt, capped
    let exp_delay = config
        .base_delay_ms
        .saturating_mul(2u64.saturating_pow(attempt));
    let capped_delay = exp_delay.min(config.max_delay_ms);

    // Full jitter from the clock's sub-second nanos
    let jittered = if capped_delay > 0 {
        use std::time::SystemTime;
        let nanos = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .map(|d| d.subsec_nanos())
            .unwrap_or(0);
        let random_factor = (nanos % 1000) as f64 / 1000.0;
        ((capped_delay as f64) * random_factor) as u64
    } else {
        0
    };

    Duration::from_millis(jittered.max(config.base_delay_ms))
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast() -> RetryConfig {
        RetryConfig {
            max_retries: 2,
            base_delay_ms: 1,
            max_delay_ms: 2,
        }
    }

    #[test]
    fn test_retry_config_default() {
        let config = RetryConfig::default();
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.base_delay_ms, 25);
        assert_eq!(config.max_delay_ms, 1000);
    }

    #[test]
    fn test_calculate_delay_respects_max() {
        let config = RetryConfig {
            max_retries: 3,
            base_delay_ms: 100,
            max_delay_ms: 400,
        };
        let delay = calculate_delay(&config, 10);
        assert!(delay.as_millis() <= 400);
    }

    #[test]
    fn test_calculate_delay_minimum() {
        let config = RetryConfig::default();
        let delay = calculate_delay(&config, 0);
        assert!(delay.as_millis() >= config.base_delay_ms as u128);
    }

    #[tokio::test]
    async fn test_retries_transient_errors_until_success() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result = with_retry(&fast(), "test", move || async move {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(DbError::Query(sqlx::Error::PoolTimedOut))
            } else {
                Ok(7)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_domain_errors_are_returned_immediately() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: DbResult<()> = with_retry(&fast(), "test", move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(DbError::conflict("nope"))
        })
        .await;

        assert!(matches!(result, Err(DbError::Conflict(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retry_limit_exceeded() {
        let result: DbResult<()> = with_retry(&fast(), "test", || async {
            Err(DbError::Query(sqlx::Error::PoolTimedOut))
        })
        .await;

        assert!(matches!(
            result,
            Err(DbError::RetryLimitExceeded { attempts: 3 })
        ));
    }
}
