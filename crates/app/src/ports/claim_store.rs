//! Claim store port — exclusive claiming and rescheduling of due automations.

use std::future::Future;

use cadence_domain::automation::{Automation, AutomationStatus};
use cadence_domain::error::CadenceError;
use cadence_domain::id::AutomationId;
use cadence_domain::time::Timestamp;

/// Bounds of a claim: which `next_run_time` values count as due.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClaimWindow {
    /// Written to `last_upd` on every claimed row.
    pub claimed_at: Timestamp,
    /// Inclusive upper bound (the claim instant plus any lookahead).
    pub due_until: Timestamp,
    /// Inclusive lower bound; rows older than this are never resurrected.
    pub not_before: Option<Timestamp>,
}

impl ClaimWindow {
    /// Whether `next_run_time` falls inside the window.
    #[must_use]
    pub fn contains(&self, next_run_time: Timestamp) -> bool {
        next_run_time <= self.due_until && self.not_before.is_none_or(|lower| next_run_time >= lower)
    }
}

/// Persistence for automation claim state.
///
/// Implementations must guarantee that concurrent [`claim_due`](Self::claim_due)
/// calls never return the same automation twice.
pub trait ClaimStore {
    /// Atomically select up to `limit` PENDING, active automations whose
    /// `next_run_time` lies in `window` (earliest first) and flip them to
    /// LOCKED before returning them.
    ///
    /// An empty result means nothing is due.
    fn claim_due(
        &self,
        window: ClaimWindow,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<Automation>, CadenceError>> + Send;

    /// Write `status`, `next_run_time` and `last_upd` of every given task,
    /// all or nothing.
    fn commit_next_run(
        &self,
        tasks: &[Automation],
    ) -> impl Future<Output = Result<(), CadenceError>> + Send;

    /// Move every listed automation to `status`, stamping `last_upd`.
    fn update_status_batch(
        &self,
        ids: &[AutomationId],
        status: AutomationStatus,
        at: Timestamp,
    ) -> impl Future<Output = Result<u64, CadenceError>> + Send;

    /// Get an automation by its unique identifier.
    fn get_by_id(
        &self,
        id: AutomationId,
    ) -> impl Future<Output = Result<Option<Automation>, CadenceError>> + Send;

    /// Persist `automation` only if the stored version still equals
    /// `automation.version`; the returned copy carries the bumped version.
    ///
    /// Fails with [`CadenceError::Conflict`] when another writer got there first.
    fn update(
        &self,
        automation: Automation,
    ) -> impl Future<Output = Result<Automation, CadenceError>> + Send;

    /// LOCKED automations whose `last_upd` is older than `older_than`.
    fn list_stale_locked(
        &self,
        older_than: Timestamp,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<Automation>, CadenceError>> + Send;
}
