use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::config::RetryConfig;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_retries: usize,
    initial_backoff: Duration,
    max_backoff: Duration,
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self::new(config.max_retries, config.initial_backoff_ms, config.max_backoff_ms)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl RetryPolicy {
    pub fn new(max_retries: usize, initial_backoff_ms: u64, max_backoff_ms: u64) -> Self {
        Self {
            max_retries,
            initial_backoff: Duration::from_millis(initial_backoff_ms),
            max_backoff: Duration::from_millis(max_backoff_ms),
        }
    }

    pub fn none() -> Self {
        Self::new(0, 0, 0)
    }

    /// Delay before retry number `retry` (1-based): doubles each time, capped.
    pub fn backoff_for(&self, retry: usize) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1).min(31) as u32);
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }

    /// Run `f` until it succeeds, fails with an error `retryable` rejects,
    /// or the retry budget is spent.
    pub async fn retry<F, Fut, T, E>(
        &self,
        operation_name: &str,
        mut f: F,
        retryable: impl Fn(&E) -> bool,
    ) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let mut retries = 0;

        loop {
            let err = match f().await {
                Ok(result) => {
                    if retries > 0 {
                        info!(
                            operation = operation_name,
                            attempts = retries + 1,
                            "Operation succeeded after retries"
                        );
                    }
                    return Ok(result);
                }
                Err(e) => e,
            };

            if !retryable(&err) {
                return Err(err);
            }
            if retries == self.max_retries {
                warn!(
                    operation = operation_name,
                    attempts = retries + 1,
                    error = %err,
                    "Giving up after max retries"
                );
                return Err(err);
            }

            retries += 1;
            let backoff = self.backoff_for(retries);
            warn!(
                operation = operation_name,
                retry = retries,
                max_retries = self.max_retries,
                backoff_ms = backoff.as_millis() as u64,
                error = %err,
                "Transient failure, backing off"
            );
            sleep(backoff).await;
        }
    }
}
