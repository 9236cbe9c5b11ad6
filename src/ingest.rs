//! Load the task CSV export into the `tasks` table.

use std::fs::File;
use std::path::Path;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;
use sqlx::PgPool;
use tracing::{debug, info};

use crate::db::task_repo;
use crate::error::{Result, TaskError};
use crate::models::TaskRecord;

/// Timestamp layout used by the export.
pub const CSV_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M";

/// One line of the export, before any normalization.
#[derive(Debug, Deserialize)]
pub struct CsvTaskRow {
    pub task_id: String,
    pub team_name: String,
    pub member_name: String,
    pub task_title: String,
    pub task_type: String,
    pub priority: String,
    pub status: String,
    pub created_at: String,
    #[serde(default)]
    pub closed_at: String,
    #[serde(default)]
    pub last_updated: String,
    pub source_tool: String,
    #[serde(default)]
    pub cycle_time: String,
}

impl CsvTaskRow {
    pub fn into_record(self) -> Result<TaskRecord> {
        let created_at = parse_timestamp("created_at", &self.created_at)?.ok_or_else(|| {
            TaskError::InvalidInput(format!("Task '{}' has no created_at", self.task_id))
        })?;
        let last_updated = parse_timestamp("last_updated", &self.last_updated)?.unwrap_or(created_at);

        Ok(TaskRecord {
            task_type: self.task_type.trim().to_lowercase().parse()?,
            priority: self.priority.trim().to_lowercase().parse()?,
            status: self.status.trim().to_lowercase().parse()?,
            closed_at: parse_timestamp("closed_at", &self.closed_at)?,
            cycle_time: parse_cycle_time(&self.cycle_time)?,
            task_id: self.task_id,
            team_name: self.team_name,
            member_name: self.member_name,
            task_title: self.task_title,
            created_at,
            last_updated,
            source_tool: self.source_tool,
        })
    }
}

/// Empty cells are `None`; anything else must match [`CSV_TIMESTAMP_FORMAT`].
pub fn parse_timestamp(field: &str, value: &str) -> Result<Option<DateTime<Utc>>> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(None);
    }
    NaiveDateTime::parse_from_str(value, CSV_TIMESTAMP_FORMAT)
        .map(|naive| Some(naive.and_utc()))
        .map_err(|e| TaskError::InvalidInput(format!("Invalid {} '{}': {}", field, value, e)))
}

fn parse_cycle_time(value: &str) -> Result<Option<f64>> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(None);
    }
    value
        .parse()
        .map(Some)
        .map_err(|_| TaskError::InvalidInput(format!("Invalid cycle_time '{}'", value)))
}

/// Parse every row of the export.
pub fn read_records(path: &Path) -> Result<Vec<TaskRecord>> {
    if !path.exists() {
        return Err(TaskError::NotFound(format!("CSV file not found: {}", path.display())));
    }

    let mut reader = csv::Reader::from_reader(File::open(path)?);
    let mut records = Vec::new();
    for row in reader.deserialize::<CsvTaskRow>() {
        records.push(row?.into_record()?);
    }
    debug!(count = records.len(), path = %path.display(), "CSV parsed");
    Ok(records)
}

/// Upsert every row of the export in one transaction; returns the row count.
pub async fn ingest_csv(pool: &PgPool, path: &Path) -> Result<usize> {
    let records = read_records(path)?;

    let mut tx = pool.begin().await?;
    for record in &records {
        task_repo::upsert(&mut *tx, record).await?;
    }
    tx.commit().await?;

    info!(count = records.len(), path = %path.display(), "Tasks imported");
    Ok(records.len())
}
