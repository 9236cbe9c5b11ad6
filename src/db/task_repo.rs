//! Task repository for CRUD operations on the `tasks` table

use chrono::{DateTime, Utc};
use sqlx::postgres::{PgArguments, PgConnection, PgPool};
use sqlx::query::QueryAs;
use sqlx::{Postgres, QueryBuilder};
use tracing::{debug, info};

use crate::error::{Result, TaskError};
use crate::models::{TaskCreate, TaskFilter, TaskRecord, TaskUpdate};

const TASK_COLUMNS: &str = "task_id, team_name, member_name, task_title, task_type, priority, \
     status, created_at, closed_at, last_updated, source_tool, cycle_time";

const INSERT_TASK: &str = r#"
    INSERT INTO tasks (task_id, team_name, member_name, task_title, task_type, priority,
                       status, created_at, closed_at, last_updated, source_tool, cycle_time)
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
    RETURNING task_id, team_name, member_name, task_title, task_type, priority,
              status, created_at, closed_at, last_updated, source_tool, cycle_time
"#;

const UPSERT_TASK: &str = r#"
    INSERT INTO tasks (task_id, team_name, member_name, task_title, task_type, priority,
                       status, created_at, closed_at, last_updated, source_tool, cycle_time)
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
    ON CONFLICT (task_id) DO UPDATE SET
        team_name = EXCLUDED.team_name,
        member_name = EXCLUDED.member_name,
        task_title = EXCLUDED.task_title,
        task_type = EXCLUDED.task_type,
        priority = EXCLUDED.priority,
        status = EXCLUDED.status,
        created_at = EXCLUDED.created_at,
        closed_at = EXCLUDED.closed_at,
        last_updated = EXCLUDED.last_updated,
        source_tool = EXCLUDED.source_tool,
        cycle_time = EXCLUDED.cycle_time
    RETURNING task_id, team_name, member_name, task_title, task_type, priority,
              status, created_at, closed_at, last_updated, source_tool, cycle_time
"#;

const UPDATE_TASK: &str = r#"
    UPDATE tasks SET
        team_name = $2, member_name = $3, task_title = $4, task_type = $5, priority = $6,
        status = $7, created_at = $8, closed_at = $9, last_updated = $10,
        source_tool = $11, cycle_time = $12
    WHERE task_id = $1
    RETURNING task_id, team_name, member_name, task_title, task_type, priority,
              status, created_at, closed_at, last_updated, source_tool, cycle_time
"#;

/// Row as stored; enum columns are plain text.
#[derive(Debug, sqlx::FromRow)]
struct TaskRow {
    task_id: String,
    team_name: String,
    member_name: String,
    task_title: String,
    task_type: String,
    priority: String,
    status: String,
    created_at: DateTime<Utc>,
    closed_at: Option<DateTime<Utc>>,
    last_updated: DateTime<Utc>,
    source_tool: String,
    cycle_time: Option<f64>,
}

impl TryFrom<TaskRow> for TaskRecord {
    type Error = TaskError;

    fn try_from(row: TaskRow) -> Result<Self> {
        Ok(TaskRecord {
            task_type: row.task_type.parse()?,
            priority: row.priority.parse()?,
            status: row.status.parse()?,
            task_id: row.task_id,
            team_name: row.team_name,
            member_name: row.member_name,
            task_title: row.task_title,
            created_at: row.created_at,
            closed_at: row.closed_at,
            last_updated: row.last_updated,
            source_tool: row.source_tool,
            cycle_time: row.cycle_time,
        })
    }
}

/// Binds `$1..$12` in column order.
fn bind_record<'q>(
    query: QueryAs<'q, Postgres, TaskRow, PgArguments>,
    record: &'q TaskRecord,
) -> QueryAs<'q, Postgres, TaskRow, PgArguments> {
    query
        .bind(&record.task_id)
        .bind(&record.team_name)
        .bind(&record.member_name)
        .bind(&record.task_title)
        .bind(record.task_type.as_str())
        .bind(record.priority.as_str())
        .bind(record.status.as_str())
        .bind(record.created_at)
        .bind(record.closed_at)
        .bind(record.last_updated)
        .bind(&record.source_tool)
        .bind(record.cycle_time)
}

fn list_query(filter: &TaskFilter) -> QueryBuilder<'_, Postgres> {
    let mut query = QueryBuilder::new(format!("SELECT {} FROM tasks WHERE TRUE", TASK_COLUMNS));

    if let Some(status) = filter.status {
        query.push(" AND status = ").push_bind(status.as_str());
    }
    if let Some(priority) = filter.priority {
        query.push(" AND priority = ").push_bind(priority.as_str());
    }
    if let Some(task_type) = filter.task_type {
        query.push(" AND task_type = ").push_bind(task_type.as_str());
    }
    for (column, value) in [
        ("team_name", &filter.team_name),
        ("member_name", &filter.member_name),
        ("source_tool", &filter.source_tool),
    ] {
        if let Some(value) = value {
            query
                .push(format!(" AND {} ILIKE ", column))
                .push_bind(format!("%{}%", value));
        }
    }

    query.push(" ORDER BY created_at DESC");
    query
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .and_then(|db| db.code())
        .map_or(false, |code| code == "23505")
}

/// Insert or replace a task by id.
pub async fn upsert(conn: &mut PgConnection, record: &TaskRecord) -> Result<TaskRecord> {
    let row = bind_record(sqlx::query_as(UPSERT_TASK), record)
        .fetch_one(conn)
        .await?;
    row.try_into()
}

#[derive(Clone)]
pub struct TaskRepository {
    pool: PgPool,
}

impl TaskRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn list(&self, filter: &TaskFilter) -> Result<Vec<TaskRecord>> {
        let rows: Vec<TaskRow> = list_query(filter)
            .build_query_as()
            .fetch_all(&self.pool)
            .await?;
        debug!(count = rows.len(), "Listed tasks");
        rows.into_iter().map(TaskRecord::try_from).collect()
    }

    pub async fn get(&self, task_id: &str) -> Result<Option<TaskRecord>> {
        let row: Option<TaskRow> =
            sqlx::query_as(&format!("SELECT {} FROM tasks WHERE task_id = $1", TASK_COLUMNS))
                .bind(task_id)
                .fetch_optional(&self.pool)
                .await?;
        row.map(TaskRecord::try_from).transpose()
    }

    pub async fn create(&self, payload: TaskCreate) -> Result<TaskRecord> {
        let record = payload.into_record(Utc::now())?;

        let row = bind_record(sqlx::query_as(INSERT_TASK), &record)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    TaskError::InvalidInput(format!("Task '{}' already exists", record.task_id))
                } else {
                    TaskError::from(e)
                }
            })?;

        info!(task_id = %record.task_id, status = %record.status, "Task created");
        row.try_into()
    }

    /// Returns `None` when the task does not exist.
    pub async fn update(&self, task_id: &str, patch: TaskUpdate) -> Result<Option<TaskRecord>> {
        let mut tx = self.pool.begin().await?;

        let current: Option<TaskRow> = sqlx::query_as(&format!(
            "SELECT {} FROM tasks WHERE task_id = $1 FOR UPDATE",
            TASK_COLUMNS
        ))
        .bind(task_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(current) = current else {
            tx.rollback().await?;
            return Ok(None);
        };

        let mut record = TaskRecord::try_from(current)?;
        patch.apply_to(&mut record, Utc::now())?;

        let row = bind_record(sqlx::query_as(UPDATE_TASK), &record)
            .fetch_one(&mut *tx)
            .await?;
        tx.commit().await?;

        info!(task_id = %task_id, status = %record.status, "Task updated");
        TaskRecord::try_from(row).map(Some)
    }

    /// Returns whether a row was removed.
    pub async fn delete(&self, task_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM tasks WHERE task_id = $1")
            .bind(task_id)
            .execute(&self.pool)
            .await?;

        let removed = result.rows_affected() > 0;
        if removed {
            info!(task_id = %task_id, "Task deleted");
        }
        Ok(removed)
    }
}
