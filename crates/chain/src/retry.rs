//! Bounded-backoff retry for transient chain failures.

use std::{future::Future, time::Duration};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{
    constants::{DEFAULT_BACKOFF_PERIOD, DEFAULT_MAX_RETRY_COUNT},
    error::{ChainError, ChainResult},
};

/// Retry budget for transient chain failures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    max_retry_count: usize,
    backoff_period: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retry_count: DEFAULT_MAX_RETRY_COUNT,
            backoff_period: DEFAULT_BACKOFF_PERIOD,
        }
    }
}

impl RetryConfig {
    /// Sets the maximum number of retries.
    pub fn with_max_retry_count(self, count: usize) -> Self {
        Self {
            max_retry_count: count,
            ..self
        }
    }

    /// Sets the pause between retries.
    pub fn with_backoff_period(self, period: Duration) -> Self {
        Self {
            backoff_period: period,
            ..self
        }
    }

    /// Returns the maximum number of retries.
    pub fn max_retry_count(&self) -> usize {
        self.max_retry_count
    }

    /// Returns the pause between retries.
    pub fn backoff_period(&self) -> Duration {
        self.backoff_period
    }
}

/// Runs `op`, retrying transient failures up to the configured budget.
///
/// Fatal failures and budget exhaustion surface immediately; the caller
/// never sees a transient error unless the budget ran dry.
pub async fn with_retry<T, F, Fut>(cfg: &RetryConfig, label: &str, mut op: F) -> ChainResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ChainResult<T>>,
{
    let mut attempt = 0usize;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(ChainError::Transient(msg)) if attempt < cfg.max_retry_count() => {
                attempt += 1;
                warn!(label, attempt, "transient chain failure, backing off: {msg}");
                tokio::time::sleep(cfg.backoff_period()).await;
            }
            Err(err) => return Err(err),
        }
    }
}
