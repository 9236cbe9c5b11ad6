//! Natural-language questions answered with guarded SQL.
//!
//! Pipeline: prompt → completion → parse → guardrail → execute. Stages run
//! strictly in that order, nothing is retried, and the first failure ends
//! the request.

pub mod executor;
pub mod guardrail;
pub mod prompt;
pub mod response;

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{Result, TaskError};
use crate::llm::CompletionClient;

pub use executor::{PgQueryExecutor, QueryExecutor, ResultRow};
pub use guardrail::{GuardrailViolation, SqlGuardrail};
pub use prompt::PromptBuilder;
pub use response::parse_candidate_sql;

/// Where a question is in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Received,
    Prompted,
    Generated,
    Parsed,
    Validated,
    Executed,
    Answered,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Received => "received",
            Stage::Prompted => "prompted",
            Stage::Generated => "generated",
            Stage::Parsed => "parsed",
            Stage::Validated => "validated",
            Stage::Executed => "executed",
            Stage::Answered => "answered",
        };
        f.write_str(name)
    }
}

/// A validated statement together with everything it returned.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryAnswer {
    pub sql: String,
    pub rows: Vec<ResultRow>,
}

/// Answers task questions by generating, validating and running SQL.
///
/// Holds no per-request state; one instance serves concurrent requests.
#[derive(Clone)]
pub struct TaskQueryAgent {
    system_prompt: String,
    guardrail: SqlGuardrail,
    client: Arc<dyn CompletionClient>,
    executor: Arc<dyn QueryExecutor>,
}

impl TaskQueryAgent {
    pub fn new(
        prompt: PromptBuilder,
        guardrail: SqlGuardrail,
        client: Arc<dyn CompletionClient>,
        executor: Arc<dyn QueryExecutor>,
    ) -> Self {
        Self {
            system_prompt: prompt.render(),
            guardrail,
            client,
            executor,
        }
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    /// Generate a validated statement for `question` without running it.
    pub async fn build_sql(&self, question: &str) -> Result<String> {
        let mut stage = Stage::Received;
        debug!(%stage, "Question received");

        let result = self.generate(question, &mut stage).await;
        if let Err(e) = &result {
            warn!(last_stage = %stage, error = %e, "Question failed");
        }
        result
    }

    /// Answer `question` with the validated statement and its rows.
    pub async fn answer(&self, question: &str) -> Result<QueryAnswer> {
        let mut stage = Stage::Received;
        debug!(%stage, "Question received");

        let result = async {
            let sql = self.generate(question, &mut stage).await?;
            let rows = self.executor.execute(&sql).await?;
            advance(&mut stage, Stage::Executed);
            Ok::<_, TaskError>(QueryAnswer { sql, rows })
        }
        .await;

        match &result {
            Ok(answer) => {
                advance(&mut stage, Stage::Answered);
                info!(sql = %answer.sql, rows = answer.rows.len(), "Question answered");
            }
            Err(e) => warn!(last_stage = %stage, error = %e, "Question failed"),
        }
        result
    }

    async fn generate(&self, question: &str, stage: &mut Stage) -> Result<String> {
        advance(stage, Stage::Prompted);
        let raw = self.client.submit(&self.system_prompt, question).await?;
        advance(stage, Stage::Generated);
        let candidate = parse_candidate_sql(&raw)?;
        advance(stage, Stage::Parsed);
        let sql = self.guardrail.validate(&candidate)?;
        advance(stage, Stage::Validated);
        Ok(sql)
    }
}

/// On failure `stage` still holds the last stage that completed.
fn advance(stage: &mut Stage, next: Stage) {
    *stage = next;
    debug!(stage = %next, "Pipeline advanced");
}
