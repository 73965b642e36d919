//! Retry with bounded attempts and jittered exponential backoff.
//!
//! Only retryable errors consume an attempt; non-retryable errors abort
//! immediately and surface to the caller unchanged. Jitter spreads
//! concurrent callers so they do not form synchronized retry storms.

use std::time::Duration;

use futures::future::BoxFuture;
use rand::Rng as _;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::RetryConfig;
use crate::error::DbError;
use crate::metrics::metrics;

#[derive(Debug, thiserror::Error)]
pub enum RetryError {
    /// Non-retryable error, surfaced unchanged.
    #[error(transparent)]
    Fatal(DbError),

    /// The retry budget is spent; carries the last underlying error.
    #[error("retries exhausted after {attempts} attempts")]
    Exhausted {
        attempts: u32,
        #[source]
        source: DbError,
    },
}

pub struct RetryPolicy {
    config: RetryConfig,
    shutdown: CancellationToken,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig, shutdown: CancellationToken) -> Self {
        Self { config, shutdown }
    }

    /// Run `op` until it succeeds, fails fatally, or the budget is spent.
    ///
    /// `op` receives the 1-based attempt number. The backoff sleep between
    /// attempts is cancellable through the shutdown token; cancellation
    /// surfaces as [`DbError::Cancelled`].
    pub async fn run<'a, T, F>(&self, mut op: F) -> Result<T, RetryError>
    where
        F: FnMut(u32) -> BoxFuture<'a, Result<T, DbError>>,
    {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 1u32;

        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) if !e.is_retryable() => return Err(RetryError::Fatal(e)),
                Err(e) => {
                    if attempt >= max_attempts {
                        return Err(RetryError::Exhausted {
                            attempts: max_attempts,
                            source: e,
                        });
                    }

                    let delay = self.backoff_delay(attempt);
                    metrics().retries_total.inc();
                    debug!(
                        attempt = attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Retrying after backoff"
                    );

                    tokio::select! {
                        _ = self.shutdown.cancelled() => {
                            return Err(RetryError::Fatal(DbError::Cancelled));
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                    attempt += 1;
                }
            }
        }
    }

    /// `min(initial * 2^(attempt-1), max)` with full jitter: the final
    /// delay is uniform in `[0, 2 * computed)`.
    fn backoff_delay(&self, attempt: u32) -> Duration {
        let initial = self.config.initial_backoff_ms.max(1);
        let exp = initial.saturating_mul(2u64.saturating_pow(attempt.saturating_sub(1).min(32)));
        let capped = exp.min(self.config.max_backoff_ms.max(initial));
        let jitter = rand::thread_rng().gen_range(0.0..2.0);
        Duration::from_millis((capped as f64 * jitter) as u64)
    }
}
