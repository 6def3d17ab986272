// Retry of transient client failures with exponential backoff

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::RetryIf;
use tracing::{debug, warn};

use crate::project::ClientError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts including the first one
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 200,
            max_delay_ms: 5_000,
            jitter: true,
        }
    }
}

/// Retries an operation while it fails with a transient [`ClientError`]
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Single attempt, no retries
    pub fn none() -> Self {
        Self::new(RetryConfig {
            max_attempts: 1,
            ..RetryConfig::default()
        })
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Delays between attempts: base, 2*base, 4*base ... capped at max_delay
    fn delays(&self) -> Vec<Duration> {
        let retries = self.config.max_attempts.saturating_sub(1) as usize;
        // from_millis(2) yields 2, 4, 8 ... times the factor; halving afterwards
        // keeps odd base delays exact
        let backoff = ExponentialBackoff::from_millis(2)
            .factor(self.config.base_delay_ms)
            .max_delay(Duration::from_millis(self.config.max_delay_ms.saturating_mul(2)))
            .map(|delay| delay / 2)
            .take(retries);

        if self.config.jitter {
            backoff.map(jitter).collect()
        } else {
            backoff.collect()
        }
    }

    pub async fn run<T, F, Fut>(&self, operation: &str, mut action: F) -> Result<T, ClientError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ClientError>>,
    {
        let mut attempt = 0u32;
        let result = RetryIf::spawn(
            self.delays(),
            || {
                attempt += 1;
                debug!(operation, attempt, "Attempting client operation");
                action()
            },
            |error: &ClientError| {
                if error.is_transient() {
                    warn!(operation, error = %error, "Transient client failure, retrying");
                    true
                } else {
                    false
                }
            },
        )
        .await;

        if let Err(error) = &result {
            warn!(operation, error = %error, class = %error.class(), "Client operation failed");
        }
        result
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(RetryConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(RetryConfig {
            max_attempts,
            base_delay_ms: 1,
            max_delay_ms: 2,
            jitter: false,
        })
    }

    #[tokio::test]
    async fn test_transient_failure_is_retried_until_success() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();

        let result = fast(3)
            .run("create", || {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(ClientError::transient("connection reset"))
                    } else {
                        Ok("created")
                    }
                }
            })
            .await;

        assert_eq!(result, Ok("created"));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_failure_is_not_retried() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();

        let result: Result<(), _> = fast(5)
            .run("create", || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Err(ClientError::permanent("name already registered")) }
            })
            .await;

        assert!(matches!(result, Err(ClientError::Permanent { .. })));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();

        let result: Result<(), _> = fast(3)
            .run("delete", || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Err(ClientError::Timeout { timeout_ms: 10 }) }
            })
            .await;

        assert!(matches!(result, Err(ClientError::Timeout { .. })));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_delays_double_and_cap() {
        let policy = RetryPolicy::new(RetryConfig {
            max_attempts: 5,
            base_delay_ms: 100,
            max_delay_ms: 300,
            jitter: false,
        });

        let delays: Vec<u64> = policy.delays().iter().map(|d| d.as_millis() as u64).collect();
        assert_eq!(delays, vec![100, 200, 300, 300]);
        assert!(RetryPolicy::none().delays().is_empty());
    }

    #[test]
    fn test_odd_base_delay_is_kept_exact() {
        let delays = |base_delay_ms| {
            RetryPolicy::new(RetryConfig {
                max_attempts: 4,
                base_delay_ms,
                max_delay_ms: 10_000,
                jitter: false,
            })
            .delays()
            .iter()
            .map(|d| d.as_millis() as u64)
            .collect::<Vec<_>>()
        };

        assert_eq!(delays(1), vec![1, 2, 4]);
        assert_eq!(delays(201), vec![201, 402, 804]);
    }
}
