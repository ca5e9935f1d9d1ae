//! Long-running loops of the daemon.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use cadence_adapter_http_reqwest::ReqwestActionInvoker;
use cadence_adapter_storage_sqlite_sqlx::automation_repo::SqliteAutomationRepository;
use cadence_adapter_storage_sqlite_sqlx::definition_repo::SqliteDefinitionRepository;
use cadence_adapter_storage_sqlite_sqlx::execution_log_repo::SqliteExecutionLogRepository;
use cadence_adapter_storage_sqlite_sqlx::session_queue::SqliteSessionQueue;
use cadence_app::dispatcher::SessionDispatcher;
use cadence_app::services::lock_reconciler::LockReconciler;
use cadence_app::services::log_service::LogService;
use cadence_app::services::message_handler::MessageHandler;
use cadence_app::services::scheduler_cycle::SchedulerCycle;
use cadence_app::services::snapshot_loader::SnapshotLoader;

use crate::config::Config;

/// Every adapter the loops need, sharing one connection pool.
#[derive(Debug, Clone)]
pub struct Components {
    pub automations: SqliteAutomationRepository,
    pub definitions: SqliteDefinitionRepository,
    pub logs: SqliteExecutionLogRepository,
    pub queue: SqliteSessionQueue,
    pub invoker: ReqwestActionInvoker,
}

impl Components {
    /// Open the database, run migrations and build the adapters.
    ///
    /// # Errors
    ///
    /// Fails when the database is unreachable, a migration fails or the HTTP
    /// client cannot be built.
    pub async fn connect(config: &Config) -> anyhow::Result<Self> {
        let db = config.storage_config().build().await?;
        let pool = db.pool().clone();

        Ok(Self {
            automations: SqliteAutomationRepository::new(pool.clone()),
            definitions: SqliteDefinitionRepository::new(pool.clone()),
            logs: SqliteExecutionLogRepository::new(pool.clone()),
            queue: SqliteSessionQueue::new(pool, config.queue_settings()),
            invoker: config.invoker_config().build()?,
        })
    }
}

/// Run scheduler ticks until `cancel` fires.
///
/// Each tick starts its own cycle, so a slow cycle never delays the next
/// one. Cycles in progress are allowed to finish.
///
/// # Errors
///
/// Fails only on invalid configuration; cycle errors are logged and retried
/// on the next tick.
pub async fn run_scheduler(config: &Config, components: &Components, cancel: CancellationToken) -> anyhow::Result<()> {
    let cycle = Arc::new(SchedulerCycle::new(
        components.automations.clone(),
        components.queue.clone(),
        config.cycle_settings()?,
    ));
    let reconciler = config
        .lock_timeout()
        .map(|timeout| LockReconciler::new(components.automations.clone(), timeout));
    let retention = config
        .log_retention()
        .map(|keep| (keep, LogService::new(components.logs.clone())));

    let mut ticker = tokio::time::interval(config.tick_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    tracing::info!(
        tick_interval = ?config.tick_interval(),
        reconcile = reconciler.is_some(),
        purge = retention.is_some(),
        "scheduler started"
    );

    let reconciler = &reconciler;
    let retention = &retention;
    cycle
        .run_ticks(ticker, config.cycle_timeout(), cancel, move |now| async move {
            if let Some(reconciler) = reconciler
                && let Err(err) = reconciler.sweep(now).await
            {
                tracing::error!(error = %err, "lock reconciliation failed");
            }

            if let Some((keep, logs)) = retention
                && let Err(err) = logs.purge_before(now - *keep).await
            {
                tracing::error!(error = %err, "execution log purge failed");
            }
        })
        .await;

    tracing::info!("scheduler stopped");
    Ok(())
}

/// Consume trigger messages until `cancel` fires and in-flight sessions end.
pub async fn run_worker(config: &Config, components: &Components, cancel: CancellationToken) {
    let handler = MessageHandler::new(
        SnapshotLoader::new(components.automations.clone(), components.definitions.clone()),
        LogService::new(components.logs.clone()),
        components.invoker.clone(),
    );
    let dispatcher = SessionDispatcher::new(components.queue.clone(), handler, config.dispatcher_settings());
    dispatcher.run(cancel).await;
}

/// Cancel `token` on Ctrl-C.
pub async fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::select! {
        () = token.cancelled() => {}
        result = tokio::signal::ctrl_c() => {
            match result {
                Ok(()) => tracing::info!("shutdown requested"),
                Err(err) => tracing::error!(error = %err, "failed to listen for ctrl-c"),
            }
            token.cancel();
        }
    }
}

/// Grace period granted to the loops after cancellation before exiting anyway.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(60);
