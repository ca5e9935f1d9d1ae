//! Log service — writes execution logs with retry and purges old ones.

use std::time::Duration;

use cadence_domain::error::CadenceError;
use cadence_domain::execution::ExecutionLog;
use cadence_domain::time::Timestamp;

use crate::ports::LogStore;

const DEFAULT_ATTEMPTS: u32 = 3;
const DEFAULT_BACKOFF: Duration = Duration::from_millis(200);

/// Application service around a [`LogStore`].
pub struct LogService<L> {
    store: L,
    attempts: u32,
    backoff: Duration,
}

impl<L: LogStore> LogService<L> {
    /// Create a service that tries each upsert three times.
    pub fn new(store: L) -> Self {
        Self {
            store,
            attempts: DEFAULT_ATTEMPTS,
            backoff: DEFAULT_BACKOFF,
        }
    }

    /// Override the retry policy. `attempts` is clamped to at least one.
    #[must_use]
    pub fn with_retry(mut self, attempts: u32, backoff: Duration) -> Self {
        self.attempts = attempts.max(1);
        self.backoff = backoff;
        self
    }

    /// Upsert `log`, retrying with a linear backoff.
    ///
    /// # Errors
    ///
    /// Returns the last storage error once every attempt has failed.
    #[tracing::instrument(skip(self, log), fields(log_id = %log.log_id, status = %log.status))]
    pub async fn record(&self, log: &ExecutionLog) -> Result<(), CadenceError> {
        let mut attempt = 1;
        loop {
            match self.store.upsert(log).await {
                Ok(()) => return Ok(()),
                Err(err) if attempt < self.attempts => {
                    tracing::warn!(attempt, error = %err, "failed to write execution log, retrying");
                    tokio::time::sleep(self.backoff * attempt).await;
                    attempt += 1;
                }
                Err(err) => {
                    tracing::error!(attempt, error = %err, "giving up on execution log");
                    return Err(err);
                }
            }
        }
    }

    /// Delete logs triggered before `before`.
    ///
    /// # Errors
    ///
    /// Returns a storage error propagated from the store.
    #[tracing::instrument(skip(self))]
    pub async fn purge_before(&self, before: Timestamp) -> Result<u64, CadenceError> {
        let removed = self.store.delete_before(before).await?;
        if removed > 0 {
            tracing::info!(removed, "purged old execution logs");
        }
        Ok(removed)
    }
}
