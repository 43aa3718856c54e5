//! Contention retry for writes against a single-writer storage engine.
//!
//! [`RetryExecutor::run`] repeats a unit of work while it fails with a
//! transient busy/locked error, sleeping `base * 2^n` between attempts.
//! Non-transient errors return immediately. When attempts run out the caller
//! gets [`StoreError::ResourceBusy`], never the last busy error.
//!
//! On a [`DatabaseBackend::Concurrent`] backend the executor is a pass-through.

use std::future::Future;

use metrics::counter;
use rym_core::retry::RetryPolicy;
use rym_settings::DatabaseBackend;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::errors::{Result, StoreError};

/// Busy errors that were retried (counter).
pub const STORE_RETRIES_TOTAL: &str = "store_retries_total";
/// Operations that stayed busy through every attempt (counter).
pub const STORE_BUSY_EXHAUSTED_TOTAL: &str = "store_busy_exhausted_total";

/// Runs storage work with contention-aware retry.
#[derive(Clone, Copy, Debug)]
pub struct RetryExecutor {
    backend: DatabaseBackend,
    policy: RetryPolicy,
}

impl RetryExecutor {
    /// Executor for `backend` using `policy`.
    pub fn new(backend: DatabaseBackend, policy: RetryPolicy) -> Self {
        Self { backend, policy }
    }

    /// Storage backend this executor was built for.
    pub fn backend(&self) -> DatabaseBackend {
        self.backend
    }

    /// Retry policy in use.
    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Run `op`, retrying transient failures.
    ///
    /// `cancel` is checked before every attempt and during every backoff
    /// sleep; firing it yields [`StoreError::Cancelled`].
    pub async fn run<T, F, Fut>(&self, cancel: &CancellationToken, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if self.backend == DatabaseBackend::Concurrent {
            return op().await;
        }

        let mut attempt = 0;
        loop {
            if cancel.is_cancelled() {
                return Err(StoreError::Cancelled);
            }
            attempt += 1;

            let err = match op().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() => err,
                Err(err) => return Err(err),
            };

            if !self.policy.has_attempts_left(attempt) {
                counter!(STORE_BUSY_EXHAUSTED_TOTAL).increment(1);
                warn!(attempts = attempt, error = %err, "storage still busy, giving up");
                return Err(StoreError::ResourceBusy { attempts: attempt });
            }

            let delay = self.policy.backoff_delay(attempt - 1);
            counter!(STORE_RETRIES_TOTAL).increment(1);
            debug!(attempt, ?delay, error = %err, "storage busy, backing off");

            tokio::select! {
                () = cancel.cancelled() => return Err(StoreError::Cancelled),
                () = tokio::time::sleep(delay) => {}
            }
        }
    }
}

impl Default for RetryExecutor {
    fn default() -> Self {
        Self::new(DatabaseBackend::Sqlite, RetryPolicy::default())
    }
}
