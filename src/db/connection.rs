//! Database connection management using sqlx

use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::info;

use crate::config::DatabaseSettings;

/// Statements that create the `tasks` table and its indexes when missing.
pub const SCHEMA_STATEMENTS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS tasks (
        task_id VARCHAR(64) PRIMARY KEY,
        team_name VARCHAR(128) NOT NULL,
        member_name VARCHAR(128) NOT NULL,
        task_title VARCHAR(256) NOT NULL,
        task_type VARCHAR(64) NOT NULL,
        priority VARCHAR(32) NOT NULL,
        status VARCHAR(32) NOT NULL,
        created_at TIMESTAMPTZ NOT NULL,
        closed_at TIMESTAMPTZ,
        last_updated TIMESTAMPTZ NOT NULL,
        source_tool VARCHAR(64) NOT NULL,
        cycle_time DOUBLE PRECISION
    )
    "#,
    "CREATE INDEX IF NOT EXISTS ix_tasks_team_name ON tasks (team_name)",
    "CREATE INDEX IF NOT EXISTS ix_tasks_member_name ON tasks (member_name)",
    "CREATE INDEX IF NOT EXISTS ix_tasks_task_type ON tasks (task_type)",
    "CREATE INDEX IF NOT EXISTS ix_tasks_priority ON tasks (priority)",
    "CREATE INDEX IF NOT EXISTS ix_tasks_status ON tasks (status)",
    "CREATE INDEX IF NOT EXISTS ix_tasks_created_at ON tasks (created_at)",
    "CREATE INDEX IF NOT EXISTS ix_tasks_closed_at ON tasks (closed_at)",
    "CREATE INDEX IF NOT EXISTS ix_tasks_last_updated ON tasks (last_updated)",
    "CREATE INDEX IF NOT EXISTS ix_tasks_source_tool ON tasks (source_tool)",
];

/// Initialize the database connection pool
pub async fn init_pool(database_url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(30))
        .connect(database_url)
        .await?;

    // Test the connection
    sqlx::query("SELECT 1").execute(&pool).await?;

    Ok(pool)
}

pub async fn connect(settings: &DatabaseSettings) -> Result<PgPool, sqlx::Error> {
    init_pool(&settings.database_url, settings.db_max_connections).await
}

/// Create the task table if this is a fresh database.
pub async fn ensure_schema(pool: &PgPool) -> Result<(), sqlx::Error> {
    for statement in SCHEMA_STATEMENTS {
        sqlx::query(statement).execute(pool).await?;
    }
    info!("Task schema ready");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_is_idempotent() {
        assert!(SCHEMA_STATEMENTS
            .iter()
            .all(|stmt| stmt.contains("IF NOT EXISTS")));
    }

    #[test]
    fn every_filter_column_is_indexed() {
        for column in [
            "team_name",
            "member_name",
            "task_type",
            "priority",
            "status",
            "created_at",
            "closed_at",
            "last_updated",
            "source_tool",
        ] {
            let index = format!("ON tasks ({})", column);
            assert!(
                SCHEMA_STATEMENTS.iter().any(|stmt| stmt.contains(&index)),
                "missing index on {}",
                column
            );
        }
    }
}
