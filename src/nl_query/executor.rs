//! Execute validated statements against the task store.

use std::fmt;

use async_trait::async_trait;
use serde::de::{self, Deserializer};
use serde::Deserialize;
use serde_json::{Map, Value};
use sqlx::postgres::{PgPool, PgRow};
use sqlx::Row;
use tracing::{debug, info_span, Instrument};

use crate::error::{Result, TaskError};

/// One result row: column name to scalar, in the order the statement selected them.
pub type ResultRow = Map<String, Value>;

/// Runs a statement that already passed the guardrail.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    async fn execute(&self, sql: &str) -> Result<Vec<ResultRow>>;
}

/// Postgres executor.
///
/// Each statement runs in a read-only transaction that is always rolled
/// back. The database renders every row with `row_to_json`, which keeps
/// column order and gives one decoding path for every column type.
#[derive(Clone)]
pub struct PgQueryExecutor {
    pool: PgPool,
    row_cap: Option<u32>,
}

impl PgQueryExecutor {
    /// `row_cap` of zero disables the server-side limit.
    pub fn new(pool: PgPool, row_cap: u32) -> Self {
        Self {
            pool,
            row_cap: (row_cap > 0).then_some(row_cap),
        }
    }

    pub fn row_cap(&self) -> Option<u32> {
        self.row_cap
    }
}

#[async_trait]
impl QueryExecutor for PgQueryExecutor {
    async fn execute(&self, sql: &str) -> Result<Vec<ResultRow>> {
        let statement = wrap_statement(sql, self.row_cap);

        let rows = async {
            let mut tx = self.pool.begin().await?;
            sqlx::query("SET TRANSACTION READ ONLY")
                .execute(&mut *tx)
                .await?;
            let rows = sqlx::query(&statement).fetch_all(&mut *tx).await?;
            tx.rollback().await?;
            Ok::<_, sqlx::Error>(rows)
        }
        .instrument(info_span!("execute_generated_sql", row_cap = ?self.row_cap))
        .await
        .map_err(|e| TaskError::Execution(e.to_string()))?;

        debug!(rows = rows.len(), "Generated SQL executed");
        rows.iter().map(decode_row).collect()
    }
}

/// Wrap a validated statement so each row comes back as one JSON text
/// column, with the row cap applied outside the generated SQL.
///
/// The statement sits on its own lines so a trailing line comment cannot
/// swallow the closing parenthesis.
pub fn wrap_statement(sql: &str, row_cap: Option<u32>) -> String {
    let mut wrapped = format!("SELECT row_to_json(guarded)::text AS guarded_row\nFROM (\n{}\n) AS guarded", sql);
    if let Some(cap) = row_cap {
        wrapped.push_str(&format!("\nLIMIT {}", cap));
    }
    wrapped
}

fn decode_row(row: &PgRow) -> Result<ResultRow> {
    let text: String = row
        .try_get(0)
        .map_err(|e| TaskError::Execution(format!("Failed to read result row: {}", e)))?;
    parse_row_json(&text)
}

fn parse_row_json(text: &str) -> Result<ResultRow> {
    serde_json::from_str::<UniqueColumns>(text)
        .map(|columns| columns.0)
        .map_err(|e| TaskError::Execution(format!("Failed to decode result row: {}", e)))
}

/// A result row whose column names are all distinct. `row_to_json` emits
/// repeated names as-is, and a map would keep only the last value.
struct UniqueColumns(ResultRow);

impl<'de> Deserialize<'de> for UniqueColumns {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct RowVisitor;

        impl<'de> de::Visitor<'de> for RowVisitor {
            type Value = UniqueColumns;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a JSON object with one key per column")
            }

            fn visit_map<A: de::MapAccess<'de>>(self, mut access: A) -> std::result::Result<Self::Value, A::Error> {
                let mut row = Map::new();
                while let Some((column, value)) = access.next_entry::<String, Value>()? {
                    if row.contains_key(&column) {
                        return Err(de::Error::custom(format!(
                            "duplicate column '{}', alias each output column",
                            column
                        )));
                    }
                    row.insert(column, value);
                }
                Ok(UniqueColumns(row))
            }
        }

        deserializer.deserialize_map(RowVisitor)
    }
}
