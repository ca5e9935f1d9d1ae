//! `SQLite` implementation of [`LogStore`].

use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row, SqlitePool};

use cadence_app::ports::LogStore;
use cadence_domain::error::CadenceError;
use cadence_domain::execution::{ExecutionLog, LogId};
use cadence_domain::time::Timestamp;

use crate::codec;
use crate::error::StorageError;

// A redelivered trigger reuses its log id, so writes converge on one row.
const UPSERT: &str = r"
INSERT INTO execution_logs (
    log_id, automation_id, triggered_at, finished_at, status, error_message, config_snapshot
) VALUES (?, ?, ?, ?, ?, ?, ?)
ON CONFLICT(log_id) DO UPDATE SET
    finished_at = excluded.finished_at,
    status = excluded.status,
    error_message = excluded.error_message,
    config_snapshot = COALESCE(excluded.config_snapshot, execution_logs.config_snapshot)";

struct Wrapper(ExecutionLog);

impl<'r> FromRow<'r, SqliteRow> for Wrapper {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let log_id: String = row.try_get("log_id")?;
        let automation_id: String = row.try_get("automation_id")?;
        let triggered_at: String = row.try_get("triggered_at")?;
        let finished_at: Option<String> = row.try_get("finished_at")?;
        let status: String = row.try_get("status")?;

        Ok(Self(ExecutionLog {
            log_id: LogId::from(log_id),
            automation_id: codec::parse(&automation_id)?,
            triggered_at: codec::parse_timestamp(&triggered_at)?,
            finished_at: codec::parse_optional_timestamp(finished_at.as_deref())?,
            status: codec::parse(&status)?,
            error_message: row.try_get("error_message")?,
            config_snapshot: row.try_get("config_snapshot")?,
        }))
    }
}

/// `SQLite`-backed execution log store.
#[derive(Debug, Clone)]
pub struct SqliteExecutionLogRepository {
    pool: SqlitePool,
}

impl SqliteExecutionLogRepository {
    /// Create a new repository backed by the given connection pool.
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

impl LogStore for SqliteExecutionLogRepository {
    async fn upsert(&self, log: &ExecutionLog) -> Result<(), CadenceError> {
        sqlx::query(UPSERT)
            .bind(log.log_id.as_str())
            .bind(log.automation_id.to_string())
            .bind(codec::timestamp(log.triggered_at))
            .bind(codec::optional_timestamp(log.finished_at))
            .bind(log.status.as_str())
            .bind(log.error_message.as_deref())
            .bind(log.config_snapshot.as_deref())
            .execute(&self.pool)
            .await
            .map_err(StorageError::from)?;
        Ok(())
    }

    async fn get_by_id(&self, log_id: &LogId) -> Result<Option<ExecutionLog>, CadenceError> {
        let row: Option<Wrapper> = sqlx::query_as("SELECT * FROM execution_logs WHERE log_id = ?")
            .bind(log_id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(StorageError::from)?;
        Ok(row.map(|w| w.0))
    }

    async fn delete_before(&self, before: Timestamp) -> Result<u64, CadenceError> {
        let result = sqlx::query("DELETE FROM execution_logs WHERE triggered_at < ?")
            .bind(codec::timestamp(before))
            .execute(&self.pool)
            .await
            .map_err(StorageError::from)?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::Config;
    use cadence_domain::execution::ExecutionStatus;
    use cadence_domain::id::AutomationId;
    use chrono::{Duration, TimeZone, Utc};

    async fn setup() -> SqliteExecutionLogRepository {
        let db = Config::new("sqlite::memory:").build().await.unwrap();
        SqliteExecutionLogRepository::new(db.pool().clone())
    }

    fn at(hour: u32) -> Timestamp {
        Utc.with_ymd_and_hms(2024, 1, 1, hour, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn should_insert_and_read_back_log() {
        let repo = setup().await;
        let log = ExecutionLog::pending(LogId::generate(), AutomationId::new(), at(9))
            .with_snapshot("{\"automation\":{}}".to_string());

        repo.upsert(&log).await.unwrap();
        let fetched = repo.get_by_id(&log.log_id).await.unwrap().unwrap();

        assert_eq!(fetched, log);
    }

    #[tokio::test]
    async fn should_keep_one_row_when_same_log_is_written_twice() {
        let repo = setup().await;
        let mut log = ExecutionLog::pending(LogId::generate(), AutomationId::new(), at(9))
            .with_snapshot("{}".to_string());
        repo.upsert(&log).await.unwrap();

        log.fail(at(9) + Duration::seconds(2), "endpoint returned 500");
        log.config_snapshot = None;
        repo.upsert(&log).await.unwrap();

        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM execution_logs")
            .fetch_one(&repo.pool)
            .await
            .unwrap();
        assert_eq!(count.0, 1);
        let fetched = repo.get_by_id(&log.log_id).await.unwrap().unwrap();
        assert_eq!(fetched.status, ExecutionStatus::Failed);
        assert_eq!(fetched.error_message.as_deref(), Some("endpoint returned 500"));
        assert_eq!(fetched.config_snapshot.as_deref(), Some("{}"));
    }

    #[tokio::test]
    async fn should_clear_error_when_retry_succeeds() {
        let repo = setup().await;
        let mut log = ExecutionLog::pending(LogId::generate(), AutomationId::new(), at(9));
        log.fail(at(9), "boom");
        repo.upsert(&log).await.unwrap();

        log.succeed(at(10));
        repo.upsert(&log).await.unwrap();

        let fetched = repo.get_by_id(&log.log_id).await.unwrap().unwrap();
        assert_eq!(fetched.status, ExecutionStatus::Success);
        assert!(fetched.error_message.is_none());
        assert_eq!(fetched.finished_at, Some(at(10)));
    }

    #[tokio::test]
    async fn should_return_none_when_log_not_found() {
        let repo = setup().await;
        assert!(repo.get_by_id(&LogId::generate()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn should_delete_only_logs_triggered_before_cutoff() {
        let repo = setup().await;
        let old = ExecutionLog::pending(LogId::generate(), AutomationId::new(), at(1));
        let recent = ExecutionLog::pending(LogId::generate(), AutomationId::new(), at(12));
        repo.upsert(&old).await.unwrap();
        repo.upsert(&recent).await.unwrap();

        let deleted = repo.delete_before(at(6)).await.unwrap();

        assert_eq!(deleted, 1);
        assert!(repo.get_by_id(&old.log_id).await.unwrap().is_none());
        assert!(repo.get_by_id(&recent.log_id).await.unwrap().is_some());
    }
}
