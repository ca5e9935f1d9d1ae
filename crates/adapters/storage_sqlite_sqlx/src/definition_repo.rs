//! `SQLite` implementation of [`DefinitionReader`].

use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, QueryBuilder, Row, Sqlite, SqlitePool};

use cadence_app::ports::DefinitionReader;
use cadence_domain::definition::{ActionDefinition, AutomationAction, Condition, ConditionGroup, Target};
use cadence_domain::error::CadenceError;
use cadence_domain::id::{ActionId, AutomationId, ConditionGroupId};

use crate::codec;
use crate::error::StorageError;

struct GroupRow(ConditionGroup);

impl<'r> FromRow<'r, SqliteRow> for GroupRow {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let id: String = row.try_get("group_id")?;
        let automation_id: String = row.try_get("automation_id")?;
        Ok(Self(ConditionGroup {
            id: codec::parse(&id)?,
            automation_id: codec::parse(&automation_id)?,
            logic: row.try_get("logic")?,
            sort_order: row.try_get("sort_order")?,
        }))
    }
}

struct ConditionRow(Condition);

impl<'r> FromRow<'r, SqliteRow> for ConditionRow {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let id: String = row.try_get("condition_id")?;
        let group_id: String = row.try_get("group_id")?;
        let data: String = row.try_get("data")?;
        Ok(Self(Condition {
            id: codec::parse(&id)?,
            group_id: codec::parse(&group_id)?,
            data: codec::decode(serde_json::from_str(&data))?,
        }))
    }
}

struct LinkRow(AutomationAction);

impl<'r> FromRow<'r, SqliteRow> for LinkRow {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let id: String = row.try_get("automation_action_id")?;
        let automation_id: String = row.try_get("automation_id")?;
        let action_id: String = row.try_get("action_id")?;
        let params: String = row.try_get("params")?;
        Ok(Self(AutomationAction {
            id: codec::parse(&id)?,
            automation_id: codec::parse(&automation_id)?,
            action_id: codec::parse(&action_id)?,
            sort_order: row.try_get("sort_order")?,
            params: codec::decode(serde_json::from_str(&params))?,
        }))
    }
}

struct ActionRow(ActionDefinition);

impl<'r> FromRow<'r, SqliteRow> for ActionRow {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let id: String = row.try_get("action_id")?;
        Ok(Self(ActionDefinition {
            id: codec::parse(&id)?,
            name: row.try_get("name")?,
            invoke_url: row.try_get("invoke_url")?,
        }))
    }
}

struct TargetRow(Target);

impl<'r> FromRow<'r, SqliteRow> for TargetRow {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let id: String = row.try_get("target_id")?;
        let automation_id: String = row.try_get("automation_id")?;
        Ok(Self(Target {
            id: codec::parse(&id)?,
            automation_id: codec::parse(&automation_id)?,
            target_type: row.try_get("target_type")?,
            target_ref: row.try_get("target_ref")?,
        }))
    }
}

/// `SELECT * FROM {table} WHERE {column} IN (…)` over the given ids.
fn select_in<'a, I>(table: &str, column: &str, ids: I, order_by: &str) -> QueryBuilder<'a, Sqlite>
where
    I: IntoIterator<Item = String>,
{
    let mut builder = QueryBuilder::new(format!("SELECT * FROM {table} WHERE {column} IN ("));
    let mut separated = builder.separated(", ");
    for id in ids {
        separated.push_bind(id);
    }
    separated.push_unseparated(format!(") ORDER BY {order_by}"));
    builder
}

/// `SQLite`-backed reader for the child records of an automation.
///
/// The insert helpers exist for seeding; the scheduler itself only reads.
#[derive(Debug, Clone)]
pub struct SqliteDefinitionRepository {
    pool: SqlitePool,
}

impl SqliteDefinitionRepository {
    /// Create a new repository backed by the given connection pool.
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Register an action endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`CadenceError::Validation`] for an invalid definition and
    /// [`CadenceError::Storage`] if the insert fails.
    pub async fn insert_action(&self, action: &ActionDefinition) -> Result<(), CadenceError> {
        action.validate()?;
        sqlx::query("INSERT INTO actions (action_id, name, invoke_url) VALUES (?, ?, ?)")
            .bind(action.id.to_string())
            .bind(&action.name)
            .bind(&action.invoke_url)
            .execute(&self.pool)
            .await
            .map_err(StorageError::from)?;
        Ok(())
    }

    /// Attach an action to an automation.
    ///
    /// # Errors
    ///
    /// Returns [`CadenceError::Storage`] if the insert fails.
    pub async fn insert_automation_action(&self, link: &AutomationAction) -> Result<(), CadenceError> {
        let params = serde_json::to_string(&link.params).map_err(StorageError::from)?;
        sqlx::query(
            "INSERT INTO automation_actions (automation_action_id, automation_id, action_id, sort_order, params) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(link.id.to_string())
        .bind(link.automation_id.to_string())
        .bind(link.action_id.to_string())
        .bind(link.sort_order)
        .bind(&params)
        .execute(&self.pool)
        .await
        .map_err(StorageError::from)?;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns [`CadenceError::Storage`] if the insert fails.
    pub async fn insert_condition_group(&self, group: &ConditionGroup) -> Result<(), CadenceError> {
        sqlx::query(
            "INSERT INTO automation_condition_groups (group_id, automation_id, logic, sort_order) VALUES (?, ?, ?, ?)",
        )
        .bind(group.id.to_string())
        .bind(group.automation_id.to_string())
        .bind(&group.logic)
        .bind(group.sort_order)
        .execute(&self.pool)
        .await
        .map_err(StorageError::from)?;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns [`CadenceError::Storage`] if the insert fails.
    pub async fn insert_condition(&self, condition: &Condition) -> Result<(), CadenceError> {
        let data = serde_json::to_string(&condition.data).map_err(StorageError::from)?;
        sqlx::query("INSERT INTO automation_conditions (condition_id, group_id, data) VALUES (?, ?, ?)")
            .bind(condition.id.to_string())
            .bind(condition.group_id.to_string())
            .bind(&data)
            .execute(&self.pool)
            .await
            .map_err(StorageError::from)?;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns [`CadenceError::Storage`] if the insert fails.
    pub async fn insert_target(&self, target: &Target) -> Result<(), CadenceError> {
        sqlx::query(
            "INSERT INTO automation_targets (target_id, automation_id, target_type, target_ref) VALUES (?, ?, ?, ?)",
        )
        .bind(target.id.to_string())
        .bind(target.automation_id.to_string())
        .bind(&target.target_type)
        .bind(&target.target_ref)
        .execute(&self.pool)
        .await
        .map_err(StorageError::from)?;
        Ok(())
    }
}

impl DefinitionReader for SqliteDefinitionRepository {
    async fn condition_groups(&self, automation_id: AutomationId) -> Result<Vec<ConditionGroup>, CadenceError> {
        let rows: Vec<GroupRow> = sqlx::query_as(
            "SELECT * FROM automation_condition_groups WHERE automation_id = ? ORDER BY sort_order, group_id",
        )
        .bind(automation_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(StorageError::from)?;
        Ok(rows.into_iter().map(|r| r.0).collect())
    }

    async fn conditions(&self, group_ids: &[ConditionGroupId]) -> Result<Vec<Condition>, CadenceError> {
        if group_ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut query = select_in(
            "automation_conditions",
            "group_id",
            group_ids.iter().map(ToString::to_string),
            "group_id, condition_id",
        );
        let rows: Vec<ConditionRow> = query
            .build_query_as()
            .fetch_all(&self.pool)
            .await
            .map_err(StorageError::from)?;
        Ok(rows.into_iter().map(|r| r.0).collect())
    }

    async fn automation_actions(&self, automation_id: AutomationId) -> Result<Vec<AutomationAction>, CadenceError> {
        let rows: Vec<LinkRow> = sqlx::query_as(
            "SELECT * FROM automation_actions WHERE automation_id = ? ORDER BY sort_order, automation_action_id",
        )
        .bind(automation_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(StorageError::from)?;
        Ok(rows.into_iter().map(|r| r.0).collect())
    }

    async fn action_definitions(&self, ids: &[ActionId]) -> Result<Vec<ActionDefinition>, CadenceError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut query = select_in("actions", "action_id", ids.iter().map(ToString::to_string), "action_id");
        let rows: Vec<ActionRow> = query
            .build_query_as()
            .fetch_all(&self.pool)
            .await
            .map_err(StorageError::from)?;
        Ok(rows.into_iter().map(|r| r.0).collect())
    }

    async fn targets(&self, automation_id: AutomationId) -> Result<Vec<Target>, CadenceError> {
        let rows: Vec<TargetRow> =
            sqlx::query_as("SELECT * FROM automation_targets WHERE automation_id = ? ORDER BY target_id")
                .bind(automation_id.to_string())
                .fetch_all(&self.pool)
                .await
                .map_err(StorageError::from)?;
        Ok(rows.into_iter().map(|r| r.0).collect())
    }
}
