//! Bounded retry with exponential backoff for backend calls.

use anyhow::Result;
use std::future::Future;
use tokio::time::{sleep, Duration};

#[derive(Clone, Debug)]
pub struct RetryConfig {
    /// Additional attempts after the first one.
    pub max_retries: u32,
    /// Wait before the first retry; doubled for each retry after it.
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryConfig {
    /// Wait before retry number `retry` (1-based).
    fn backoff(&self, retry: u32) -> Duration {
        let factor = 1u32.checked_shl(retry.saturating_sub(1)).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Run `op` until it succeeds or `max_retries` retries have failed, returning
/// the last error.
pub async fn retry_async<F, Fut, T>(config: &RetryConfig, what: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut retries = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if retries >= config.max_retries => return Err(e),
            Err(e) => {
                retries += 1;
                let wait = config.backoff(retries);
                tracing::warn!(
                    what,
                    retry = retries,
                    of = config.max_retries,
                    error = %format!("{e:#}"),
                    ?wait,
                    "call failed; retrying"
                );
                sleep(wait).await;
            }
        }
    }
}
