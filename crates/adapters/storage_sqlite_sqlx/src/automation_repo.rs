//! `SQLite` implementation of [`ClaimStore`].
//!
//! Claiming is a single `UPDATE … RETURNING` statement. `SQLite` takes the
//! write lock before evaluating the inner `SELECT`, so two schedulers sharing
//! one database file can never claim the same row.

use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, QueryBuilder, Row, Sqlite, SqlitePool};

use cadence_app::ports::{ClaimStore, ClaimWindow};
use cadence_domain::automation::{Automation, AutomationStatus, Schedule};
use cadence_domain::error::{CadenceError, ConflictError, NotFoundError};
use cadence_domain::id::AutomationId;
use cadence_domain::time::Timestamp;

use crate::codec;
use crate::error::StorageError;

const CLAIM_DUE: &str = r"
UPDATE automations
SET status = 'LOCKED', last_upd = ?
WHERE automation_id IN (
    SELECT automation_id FROM automations
    WHERE status = 'PENDING'
      AND is_active = 1
      AND next_run_time IS NOT NULL
      AND next_run_time <= ?
      AND (? IS NULL OR next_run_time >= ?)
    ORDER BY next_run_time
    LIMIT ?
)
RETURNING *";

const INSERT: &str = r"
INSERT INTO automations (
    automation_id, name, frequency, time_of_day, day_of_week, day_of_month, month_of_year,
    status, next_run_time, is_active, version, last_upd, channel_id
) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)";

const COMMIT_NEXT_RUN: &str =
    "UPDATE automations SET status = ?, next_run_time = ?, last_upd = ? WHERE automation_id = ?";

const UPDATE_VERSIONED: &str = r"
UPDATE automations
SET name = ?, frequency = ?, time_of_day = ?, day_of_week = ?, day_of_month = ?,
    month_of_year = ?, status = ?, next_run_time = ?, is_active = ?, last_upd = ?,
    channel_id = ?, version = version + 1
WHERE automation_id = ? AND version = ?";

const LIST_STALE_LOCKED: &str = r"
SELECT * FROM automations
WHERE status = 'LOCKED' AND last_upd < ?
ORDER BY last_upd
LIMIT ?";

struct Wrapper(Automation);

impl Wrapper {
    fn maybe(value: Option<Self>) -> Option<Automation> {
        value.map(|w| w.0)
    }

    fn all(values: Vec<Self>) -> Vec<Automation> {
        values.into_iter().map(|w| w.0).collect()
    }
}

impl<'r> FromRow<'r, SqliteRow> for Wrapper {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let id: String = row.try_get("automation_id")?;
        let frequency: String = row.try_get("frequency")?;
        let time_of_day: String = row.try_get("time_of_day")?;
        let day_of_month: Option<i64> = row.try_get("day_of_month")?;
        let month_of_year: Option<i64> = row.try_get("month_of_year")?;
        let status: String = row.try_get("status")?;
        let next_run_time: Option<String> = row.try_get("next_run_time")?;
        let last_upd: String = row.try_get("last_upd")?;

        let schedule = Schedule {
            frequency: codec::parse(&frequency)?,
            time_of_day: codec::parse(&time_of_day)?,
            day_of_week: row.try_get("day_of_week")?,
            day_of_month: codec::decode(day_of_month.map(u32::try_from).transpose())?,
            month_of_year: codec::decode(month_of_year.map(u32::try_from).transpose())?,
        };

        Ok(Self(Automation {
            id: codec::parse(&id)?,
            name: row.try_get("name")?,
            schedule,
            status: codec::parse(&status)?,
            next_run_time: codec::parse_optional_timestamp(next_run_time.as_deref())?,
            is_active: row.try_get("is_active")?,
            version: row.try_get("version")?,
            last_upd: codec::parse_timestamp(&last_upd)?,
            channel_id: row.try_get("channel_id")?,
        }))
    }
}

/// `SQLite`-backed automation repository.
#[derive(Debug, Clone)]
pub struct SqliteAutomationRepository {
    pool: SqlitePool,
}

impl SqliteAutomationRepository {
    /// Create a new repository backed by the given connection pool.
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a new automation.
    ///
    /// Automations are normally authored elsewhere; this is used for seeding.
    ///
    /// # Errors
    ///
    /// Returns [`CadenceError::Validation`] for an invalid automation and
    /// [`CadenceError::Storage`] if the insert fails.
    pub async fn create(&self, automation: Automation) -> Result<Automation, CadenceError> {
        automation.validate()?;
        let schedule = &automation.schedule;

        sqlx::query(INSERT)
            .bind(automation.id.to_string())
            .bind(&automation.name)
            .bind(schedule.frequency.as_str())
            .bind(schedule.time_of_day.to_string())
            .bind(schedule.day_of_week.as_deref())
            .bind(schedule.day_of_month.map(i64::from))
            .bind(schedule.month_of_year.map(i64::from))
            .bind(automation.status.as_str())
            .bind(codec::optional_timestamp(automation.next_run_time))
            .bind(automation.is_active)
            .bind(automation.version)
            .bind(codec::timestamp(automation.last_upd))
            .bind(&automation.channel_id)
            .execute(&self.pool)
            .await
            .map_err(StorageError::from)?;

        Ok(automation)
    }
}

impl ClaimStore for SqliteAutomationRepository {
    async fn claim_due(&self, window: ClaimWindow, limit: usize) -> Result<Vec<Automation>, CadenceError> {
        let not_before = codec::optional_timestamp(window.not_before);
        let rows: Vec<Wrapper> = sqlx::query_as(CLAIM_DUE)
            .bind(codec::timestamp(window.claimed_at))
            .bind(codec::timestamp(window.due_until))
            .bind(not_before.as_deref())
            .bind(not_before.as_deref())
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await
            .map_err(StorageError::from)?;

        // RETURNING order is unspecified.
        let mut claimed = Wrapper::all(rows);
        claimed.sort_by_key(|a| a.next_run_time);
        Ok(claimed)
    }

    async fn commit_next_run(&self, tasks: &[Automation]) -> Result<(), CadenceError> {
        if tasks.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await.map_err(StorageError::from)?;
        for task in tasks {
            sqlx::query(COMMIT_NEXT_RUN)
                .bind(task.status.as_str())
                .bind(codec::optional_timestamp(task.next_run_time))
                .bind(codec::timestamp(task.last_upd))
                .bind(task.id.to_string())
                .execute(&mut *tx)
                .await
                .map_err(StorageError::from)?;
        }
        tx.commit().await.map_err(StorageError::from)?;

        Ok(())
    }

    async fn update_status_batch(
        &self,
        ids: &[AutomationId],
        status: AutomationStatus,
        at: Timestamp,
    ) -> Result<u64, CadenceError> {
        if ids.is_empty() {
            return Ok(0);
        }

        let mut builder: QueryBuilder<'_, Sqlite> = QueryBuilder::new("UPDATE automations SET status = ");
        builder.push_bind(status.as_str());
        builder.push(", last_upd = ");
        builder.push_bind(codec::timestamp(at));
        builder.push(" WHERE automation_id IN (");
        let mut separated = builder.separated(", ");
        for id in ids {
            separated.push_bind(id.to_string());
        }
        separated.push_unseparated(")");

        let result = builder
            .build()
            .execute(&self.pool)
            .await
            .map_err(StorageError::from)?;
        Ok(result.rows_affected())
    }

    async fn get_by_id(&self, id: AutomationId) -> Result<Option<Automation>, CadenceError> {
        let row: Option<Wrapper> = sqlx::query_as("SELECT * FROM automations WHERE automation_id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(StorageError::from)?;
        Ok(Wrapper::maybe(row))
    }

    async fn update(&self, automation: Automation) -> Result<Automation, CadenceError> {
        automation.validate()?;
        let schedule = &automation.schedule;

        let result = sqlx::query(UPDATE_VERSIONED)
            .bind(&automation.name)
            .bind(schedule.frequency.as_str())
            .bind(schedule.time_of_day.to_string())
            .bind(schedule.day_of_week.as_deref())
            .bind(schedule.day_of_month.map(i64::from))
            .bind(schedule.month_of_year.map(i64::from))
            .bind(automation.status.as_str())
            .bind(codec::optional_timestamp(automation.next_run_time))
            .bind(automation.is_active)
            .bind(codec::timestamp(automation.last_upd))
            .bind(&automation.channel_id)
            .bind(automation.id.to_string())
            .bind(automation.version)
            .execute(&self.pool)
            .await
            .map_err(StorageError::from)?;

        if result.rows_affected() == 0 {
            let exists = self.get_by_id(automation.id).await?.is_some();
            return Err(if exists {
                ConflictError {
                    entity: "Automation",
                    id: automation.id.to_string(),
                    expected: automation.version,
                }
                .into()
            } else {
                NotFoundError {
                    entity: "Automation",
                    id: automation.id.to_string(),
                }
                .into()
            });
        }

        Ok(Automation {
            version: automation.version + 1,
            ..automation
        })
    }

    async fn list_stale_locked(&self, older_than: Timestamp, limit: usize) -> Result<Vec<Automation>, CadenceError> {
        let rows: Vec<Wrapper> = sqlx::query_as(LIST_STALE_LOCKED)
            .bind(codec::timestamp(older_than))
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await
            .map_err(StorageError::from)?;
        Ok(Wrapper::all(rows))
    }
}
