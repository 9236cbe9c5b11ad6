//! System prompt for the natural-language query agent.
//!
//! The prompt is a pure function of fixed text plus the configured row
//! limit, so two builders with the same limit always render the same prompt.

/// The only table generated SQL may read from.
pub const TASKS_TABLE: &str = "tasks";

/// Row limit the prompt asks for when no cap is configured.
pub const DEFAULT_ROW_LIMIT: u32 = 100;

pub const ROLE_DIRECTIVE: &str = "You translate product analytics questions into SQL for Postgres.";

/// Schema description handed to the model.
pub const SCHEMA_SUMMARY: &str = r#"You can only query a single Postgres table named tasks with the following columns and types:
- task_id (varchar, primary key)
- team_name (text)
- member_name (text)
- task_title (text)
- task_type (text: feature, bug, improvement, research, chore)
- priority (text: low, medium, high, critical)
- status (text: open, in_progress, blocked, completed, closed)
- created_at (timestamptz)
- closed_at (timestamptz, nullable)
- last_updated (timestamptz)
- source_tool (text)
- cycle_time (float, nullable, days)"#;

pub const RESPONSE_FORMAT_DIRECTIVE: &str = r#"Respond with JSON: {"sql": "SELECT ..."}"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PromptBuilder {
    row_limit: u32,
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_ROW_LIMIT)
    }
}

impl PromptBuilder {
    /// A zero limit falls back to [`DEFAULT_ROW_LIMIT`].
    pub fn new(row_limit: u32) -> Self {
        let row_limit = if row_limit == 0 { DEFAULT_ROW_LIMIT } else { row_limit };
        Self { row_limit }
    }

    pub fn row_limit(&self) -> u32 {
        self.row_limit
    }

    pub fn guardrail_directive(&self) -> String {
        format!(
            "Only write read-only SELECT queries. Never modify data. \
             Always reference the {} table and include limit {} if not specified.",
            TASKS_TABLE, self.row_limit
        )
    }

    pub fn render(&self) -> String {
        format!(
            "{}\n{}\n{}\n{}",
            ROLE_DIRECTIVE,
            SCHEMA_SUMMARY,
            self.guardrail_directive(),
            RESPONSE_FORMAT_DIRECTIVE
        )
    }
}
