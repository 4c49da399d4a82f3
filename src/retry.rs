// Bounded retry with exponential backoff and jitter for storage access.
// Only transient ledger failures are retried; conflicts never reach this layer.

use std::{future::Future, time::Duration};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::ledger::LedgerError;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub backoff_multiplier: f64,
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff_ms: 50,
            max_backoff_ms: 2000,
            backoff_multiplier: 2.0,
            jitter_factor: 0.1,
        }
    }
}

impl RetryConfig {
    pub fn no_delay(max_retries: u32) -> Self {
        Self {
            max_retries,
            initial_backoff_ms: 0,
            max_backoff_ms: 0,
            backoff_multiplier: 1.0,
            jitter_factor: 0.0,
        }
    }

    // Exponential backoff capped at max_backoff_ms, spread by +/- jitter_factor/2
    pub fn backoff(&self, retry_attempt: u32) -> Duration {
        let base_backoff_ms = (self.initial_backoff_ms as f64
            * self.backoff_multiplier.powf(retry_attempt as f64))
        .min(self.max_backoff_ms as f64);

        let jitter = rand::random::<f64>() * self.jitter_factor * base_backoff_ms;
        let backoff_ms = base_backoff_ms * (1.0 - self.jitter_factor / 2.0) + jitter;

        Duration::from_millis(backoff_ms.max(0.0) as u64)
    }
}

/// Runs `op` until it succeeds, fails with a non-transient error, or the
/// retry budget is spent. The last error is returned as is.
pub async fn with_retry<T, F, Fut>(
    config: &RetryConfig,
    operation: &'static str,
    mut op: F,
) -> Result<T, LedgerError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, LedgerError>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt < config.max_retries => {
                let delay = config.backoff(attempt);
                warn!(operation, attempt, ?delay, error = %err, "retrying ledger access");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
