//! Scheduler cycle — claim due automations, publish triggers, commit next runs.
//!
//! One cycle drains everything that is currently due:
//!
//! ```text
//! loop {
//!     claim batch (PENDING → LOCKED)     ── empty? → done
//!     for each task:
//!         compute next run               ── bad schedule? → skip, stays LOCKED
//!         publish trigger                ── failed? → drop, stays LOCKED
//!         add to commit set (PENDING + next run, or COMPLETE for `once`)
//!     commit the set in one write
//! }
//! ```
//!
//! The claim transaction is finished before anything is published, so no
//! row lock is ever held across a broker call.
//!
//! [`SchedulerCycle::run_ticks`] starts one cycle per tick. A cycle still
//! draining a backlog does not hold back the next tick; claims are disjoint,
//! so overlapping cycles never dispatch the same automation twice.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono_tz::Tz;
use tokio::task::JoinSet;
use tokio::time::Interval;
use tokio_util::sync::CancellationToken;

use cadence_domain::automation::{Automation, AutomationStatus};
use cadence_domain::error::CadenceError;
use cadence_domain::message::TriggerMessage;
use cadence_domain::time::Timestamp;

use crate::ports::{ClaimStore, ClaimWindow, MessageSender};

/// Tuning knobs of a [`SchedulerCycle`].
#[derive(Debug, Clone)]
pub struct CycleSettings {
    /// Maximum number of automations claimed per batch.
    pub batch_size: usize,
    /// Due rows older than this are left alone. `None` disables the bound.
    pub stale_window: Option<Duration>,
    /// Claim rows due up to this far ahead and publish them deferred.
    pub lookahead: Duration,
    /// Zone in which schedules are evaluated.
    pub timezone: Tz,
}

impl Default for CycleSettings {
    fn default() -> Self {
        Self {
            batch_size: 100,
            stale_window: Some(Duration::from_secs(600)),
            lookahead: Duration::ZERO,
            timezone: Tz::UTC,
        }
    }
}

/// Counters of one [`SchedulerCycle::run`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub batches: usize,
    pub claimed: usize,
    pub dispatched: usize,
    /// Tasks whose schedule could not produce a next run.
    pub skipped: usize,
    /// Tasks whose publish failed.
    pub failed: usize,
    pub committed: usize,
}

/// Failures that abort a cycle. The next tick starts over.
#[derive(Debug, thiserror::Error)]
pub enum CycleError {
    #[error("failed to claim due automations")]
    Claim(#[source] CadenceError),

    #[error("failed to commit next run of {count} automations")]
    Commit {
        count: usize,
        #[source]
        source: CadenceError,
    },
}

/// Drives one sweep of due automations.
pub struct SchedulerCycle<S, M> {
    store: S,
    sender: M,
    settings: CycleSettings,
}

impl<S, M> SchedulerCycle<S, M>
where
    S: ClaimStore,
    M: MessageSender,
{
    /// Create a cycle over the given store and broker.
    pub fn new(store: S, sender: M, settings: CycleSettings) -> Self {
        Self {
            store,
            sender,
            settings,
        }
    }

    /// Claim window for a cycle started at `now`.
    #[must_use]
    pub fn window(&self, now: Timestamp) -> ClaimWindow {
        let lookahead = chrono::Duration::from_std(self.settings.lookahead).unwrap_or_default();
        let not_before = self
            .settings
            .stale_window
            .and_then(|window| chrono::Duration::from_std(window).ok())
            .map(|window| now - window);
        ClaimWindow {
            claimed_at: now,
            due_until: now + lookahead,
            not_before,
        }
    }

    /// Drain every automation due at `now`.
    ///
    /// # Errors
    ///
    /// Returns [`CycleError::Claim`] when a claim fails and
    /// [`CycleError::Commit`] when persisting a batch fails. Rows claimed by
    /// the failing batch stay LOCKED.
    #[tracing::instrument(skip(self), fields(batch_size = self.settings.batch_size))]
    pub async fn run(&self, now: Timestamp) -> Result<CycleReport, CycleError> {
        let window = self.window(now);
        let mut report = CycleReport::default();

        loop {
            let tasks = self
                .store
                .claim_due(window, self.settings.batch_size)
                .await
                .map_err(CycleError::Claim)?;
            if tasks.is_empty() {
                break;
            }

            report.batches += 1;
            report.claimed += tasks.len();
            tracing::info!(count = tasks.len(), "claimed due automations");

            let mut commit_set = Vec::with_capacity(tasks.len());
            for task in tasks {
                match self.dispatch(task, now).await {
                    Dispatched::Committed(task) => commit_set.push(*task),
                    Dispatched::Skipped => report.skipped += 1,
                    Dispatched::Failed => report.failed += 1,
                }
            }

            if commit_set.is_empty() {
                continue;
            }

            report.dispatched += commit_set.len();
            self.store
                .commit_next_run(&commit_set)
                .await
                .map_err(|source| {
                    tracing::error!(count = commit_set.len(), error = %source, "failed to commit next run");
                    CycleError::Commit {
                        count: commit_set.len(),
                        source,
                    }
                })?;
            report.committed += commit_set.len();
            tracing::debug!(count = commit_set.len(), "committed next run");
        }

        tracing::info!(
            batches = report.batches,
            claimed = report.claimed,
            dispatched = report.dispatched,
            skipped = report.skipped,
            failed = report.failed,
            "scheduler cycle finished"
        );
        Ok(report)
    }

    async fn dispatch(&self, mut task: Automation, now: Timestamp) -> Dispatched {
        let due_at = task.next_run_time.unwrap_or(now);
        // Never compute relative to an instant before the due time, or a
        // deferred task would get its own due time back.
        let reference = due_at.max(now);

        let next_run = match task.next_run(reference, self.settings.timezone) {
            Ok(next_run) => next_run,
            Err(err) => {
                tracing::warn!(automation_id = %task.id, error = %err, "skipping automation with invalid schedule");
                return Dispatched::Skipped;
            }
        };

        let message = TriggerMessage::new(task.id, due_at);
        let body = match message.encode() {
            Ok(body) => body,
            Err(err) => {
                tracing::error!(automation_id = %task.id, error = %err, "failed to encode trigger");
                return Dispatched::Failed;
            }
        };

        let published = if due_at > now {
            self.sender.schedule_at(&task.channel_id, body, due_at).await
        } else {
            self.sender.send(&task.channel_id, body).await
        };
        if let Err(err) = published {
            tracing::warn!(automation_id = %task.id, error = %err, "failed to dispatch trigger, automation stays locked");
            return Dispatched::Failed;
        }

        tracing::info!(automation_id = %task.id, log_id = %message.log_id, "dispatched trigger");

        task.status = match next_run {
            Some(_) => AutomationStatus::Pending,
            None => AutomationStatus::Complete,
        };
        task.next_run_time = next_run;
        task.last_upd = cadence_domain::time::now();
        Dispatched::Committed(Box::new(task))
    }
}

impl<S, M> SchedulerCycle<S, M>
where
    S: ClaimStore + Send + Sync + 'static,
    M: MessageSender + Send + Sync + 'static,
{
    /// Start a cycle on every tick of `ticker` until `cancel` fires, then wait
    /// for the cycles still running.
    ///
    /// `before_cycle` runs inline on each tick, before that tick's cycle is
    /// spawned. Each cycle is bounded by `cycle_timeout`.
    pub async fn run_ticks<F, Fut>(
        self: Arc<Self>,
        mut ticker: Interval,
        cycle_timeout: Duration,
        cancel: CancellationToken,
        mut before_cycle: F,
    ) where
        F: FnMut(Timestamp) -> Fut,
        Fut: Future<Output = ()>,
    {
        let mut cycles = JoinSet::new();

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                Some(joined) = cycles.join_next(), if !cycles.is_empty() => {
                    if let Err(err) = joined {
                        tracing::error!(error = %err, "scheduler cycle task failed");
                    }
                    continue;
                }
                _ = ticker.tick() => {}
            }

            let now = cadence_domain::time::now();
            before_cycle(now).await;

            let cycle = Arc::clone(&self);
            cycles.spawn(async move {
                match tokio::time::timeout(cycle_timeout, cycle.run(now)).await {
                    Ok(Ok(_)) => {}
                    Ok(Err(err)) => tracing::error!(error = %err, "scheduler cycle aborted"),
                    Err(_) => tracing::warn!(timeout = ?cycle_timeout, "scheduler cycle timed out"),
                }
            });
            tracing::debug!(running = cycles.len(), "scheduler cycle started");
        }

        while let Some(joined) = cycles.join_next().await {
            if let Err(err) = joined {
                tracing::error!(error = %err, "scheduler cycle task failed");
            }
        }
    }
}

enum Dispatched {
    Committed(Box<Automation>),
    Skipped,
    Failed,
}
