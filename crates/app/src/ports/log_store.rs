//! Log store port — idempotent persistence of execution logs.

use std::future::Future;

use cadence_domain::error::CadenceError;
use cadence_domain::execution::{ExecutionLog, LogId};
use cadence_domain::time::Timestamp;

/// Sink for [`ExecutionLog`] records keyed by [`LogId`].
pub trait LogStore {
    /// Insert the log, or overwrite every column of the row with the same `log_id`.
    fn upsert(&self, log: &ExecutionLog) -> impl Future<Output = Result<(), CadenceError>> + Send;

    fn get_by_id(
        &self,
        log_id: &LogId,
    ) -> impl Future<Output = Result<Option<ExecutionLog>, CadenceError>> + Send;

    /// Remove logs triggered strictly before `before`, returning how many went.
    fn delete_before(
        &self,
        before: Timestamp,
    ) -> impl Future<Output = Result<u64, CadenceError>> + Send;
}
