//! Lock reconciler — returns long-LOCKED automations to PENDING.
//!
//! A task stays LOCKED when its trigger could not be published or its
//! commit failed. Without this sweep such rows need manual intervention.
//! A released row whose due time has passed is re-armed at the sweep
//! instant, so the next claim window always covers it.

use std::time::Duration;

use cadence_domain::automation::AutomationStatus;
use cadence_domain::error::CadenceError;
use cadence_domain::time::Timestamp;

use crate::ports::ClaimStore;

/// Upper bound of rows released per sweep.
const SWEEP_LIMIT: usize = 500;

/// Releases automations that have been LOCKED for too long.
pub struct LockReconciler<S> {
    store: S,
    lock_timeout: Duration,
}

impl<S: ClaimStore> LockReconciler<S> {
    pub fn new(store: S, lock_timeout: Duration) -> Self {
        Self {
            store,
            lock_timeout,
        }
    }

    /// Flip every automation LOCKED since before `now - lock_timeout` back to
    /// PENDING, moving an overdue `next_run_time` up to `now`.
    ///
    /// # Errors
    ///
    /// Returns a storage error propagated from the store.
    #[tracing::instrument(skip(self))]
    pub async fn sweep(&self, now: Timestamp) -> Result<usize, CadenceError> {
        let timeout = chrono::Duration::from_std(self.lock_timeout).unwrap_or_default();
        let stale = self
            .store
            .list_stale_locked(now - timeout, SWEEP_LIMIT)
            .await?;
        if stale.is_empty() {
            return Ok(0);
        }

        let released: Vec<_> = stale
            .into_iter()
            .map(|mut task| {
                task.status = AutomationStatus::Pending;
                task.next_run_time = task.next_run_time.map(|due| due.max(now));
                task.last_upd = now;
                task
            })
            .collect();
        self.store.commit_next_run(&released).await?;
        tracing::warn!(count = released.len(), "released stale locked automations");
        Ok(released.len())
    }
}
