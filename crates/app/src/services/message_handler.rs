//! Message handler — turns one trigger message into action invocations.
//!
//! ```text
//! decode ── malformed ─────────────────────────────▶ Complete (dropped)
//! load automation ── missing / inactive / not due ─▶ Complete (no log)
//!                 └─ storage error ── FAILED log ──▶ Abandon
//! build snapshot ── error ─────────── FAILED log ──▶ Abandon
//! PENDING log
//! POST snapshot to each action in order ── first failure ── FAILED log ─▶ Abandon
//! SUCCESS log ─────────────────────────────────────▶ Complete
//! ```
//!
//! Every write for one message targets the same `log_id`, so a redelivered
//! message overwrites its earlier record instead of adding a second one.

use cadence_domain::execution::ExecutionLog;
use cadence_domain::message::TriggerMessage;
use cadence_domain::time;

use crate::dispatcher::{Disposition, MessageProcessor};
use crate::ports::{ActionInvoker, ClaimStore, DefinitionReader, LogStore, ReceivedMessage};
use crate::services::log_service::LogService;
use crate::services::snapshot_loader::SnapshotLoader;

/// Business logic run for every received trigger message.
pub struct MessageHandler<S, D, L, I> {
    loader: SnapshotLoader<S, D>,
    logs: LogService<L>,
    invoker: I,
}

impl<S, D, L, I> MessageHandler<S, D, L, I>
where
    S: ClaimStore,
    D: DefinitionReader,
    L: LogStore,
    I: ActionInvoker,
{
    pub fn new(loader: SnapshotLoader<S, D>, logs: LogService<L>, invoker: I) -> Self {
        Self {
            loader,
            logs,
            invoker,
        }
    }

    /// Process a raw message body and decide its acknowledgement.
    pub async fn handle(&self, body: &[u8]) -> Disposition {
        let message = match TriggerMessage::decode(body) {
            Ok(message) => message,
            Err(err) => {
                tracing::warn!(error = %err, "dropping malformed message");
                return Disposition::Complete;
            }
        };
        self.handle_trigger(message).await
    }

    #[tracing::instrument(
        skip(self, message),
        fields(automation_id = %message.automation_id, log_id = %message.log_id)
    )]
    async fn handle_trigger(&self, message: TriggerMessage) -> Disposition {
        let mut log = ExecutionLog::pending(
            message.log_id.clone(),
            message.automation_id,
            message.triggered_at,
        );

        let automation = match self.loader.automation(message.automation_id).await {
            Ok(Some(automation)) => automation,
            Ok(None) => {
                tracing::info!("automation no longer exists, skipping");
                return Disposition::Complete;
            }
            Err(err) => return self.fail(log, error_chain(&err)).await,
        };

        if !automation.is_active {
            tracing::info!("automation is inactive, skipping");
            return Disposition::Complete;
        }
        if message.triggered_at > time::now() {
            tracing::info!(triggered_at = %message.triggered_at, "trigger is not due yet, skipping");
            return Disposition::Complete;
        }

        let snapshot = match self.loader.snapshot(automation).await {
            Ok(snapshot) => snapshot,
            Err(err) => return self.fail(log, error_chain(&err)).await,
        };
        let body = match snapshot.to_json() {
            Ok(body) => body,
            Err(err) => return self.fail(log, error_chain(&err)).await,
        };

        log = log.with_snapshot(body.clone());
        // Best effort: the final write below carries the same data.
        let _ = self.logs.record(&log).await;

        for action in &snapshot.actions {
            if let Err(err) = self.invoker.invoke(&action.invoke_url, &body).await {
                tracing::warn!(action = %action.name, url = %action.invoke_url, "action failed, stopping");
                return self.fail(log, error_chain(&err)).await;
            }
            tracing::debug!(action = %action.name, "action succeeded");
        }

        log.succeed(time::now());
        let _ = self.logs.record(&log).await;
        tracing::info!(actions = snapshot.actions.len(), "execution succeeded");
        Disposition::Complete
    }

    async fn fail(&self, mut log: ExecutionLog, reason: String) -> Disposition {
        tracing::warn!(error = %reason, "execution failed");
        log.fail(time::now(), reason);
        let _ = self.logs.record(&log).await;
        Disposition::Abandon
    }
}

/// `outer: inner: root` rendering of an error and its sources.
fn error_chain(err: &dyn std::error::Error) -> String {
    let mut text = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        text.push_str(": ");
        text.push_str(&cause.to_string());
        source = cause.source();
    }
    text
}

impl<S, D, L, I> MessageProcessor for MessageHandler<S, D, L, I>
where
    S: ClaimStore + Send + Sync,
    D: DefinitionReader + Send + Sync,
    L: LogStore + Send + Sync,
    I: ActionInvoker + Send + Sync,
{
    async fn process(&self, message: &ReceivedMessage) -> Disposition {
        if message.delivery_count > 1 {
            tracing::debug!(
                message_id = %message.message_id,
                delivery_count = message.delivery_count,
                "processing redelivered message"
            );
        }
        self.handle(&message.body).await
    }
}
