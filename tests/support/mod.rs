#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};

use pulsevo_tasks::error::{Result, TaskError};
use pulsevo_tasks::llm::CompletionClient;
use pulsevo_tasks::nl_query::{PromptBuilder, QueryExecutor, ResultRow, SqlGuardrail, TaskQueryAgent};

/// Replies with a fixed completion and records every call.
pub struct ScriptedClient {
    reply: std::result::Result<String, String>,
    calls: Mutex<Vec<(String, String)>>,
}

impl ScriptedClient {
    pub fn replying(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Ok(reply.to_string()),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn sql(sql: &str) -> Arc<Self> {
        Self::replying(&json!({ "sql": sql }).to_string())
    }

    pub fn unavailable(message: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Err(message.to_string()),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionClient for ScriptedClient {
    async fn submit(&self, system_prompt: &str, question: &str) -> Result<String> {
        self.calls
            .lock()
            .unwrap()
            .push((system_prompt.to_string(), question.to_string()));
        self.reply.clone().map_err(TaskError::Unavailable)
    }
}

/// Returns canned rows and records every statement it was asked to run.
pub struct RecordingExecutor {
    outcome: std::result::Result<Vec<ResultRow>, String>,
    statements: Mutex<Vec<String>>,
}

impl RecordingExecutor {
    pub fn returning(rows: Vec<Value>) -> Arc<Self> {
        let rows = rows
            .into_iter()
            .map(|row| match row {
                Value::Object(map) => map,
                other => panic!("row must be an object, got {}", other),
            })
            .collect();
        Arc::new(Self {
            outcome: Ok(rows),
            statements: Mutex::new(Vec::new()),
        })
    }

    pub fn failing(message: &str) -> Arc<Self> {
        Arc::new(Self {
            outcome: Err(message.to_string()),
            statements: Mutex::new(Vec::new()),
        })
    }

    pub fn statements(&self) -> Vec<String> {
        self.statements.lock().unwrap().clone()
    }
}

#[async_trait]
impl QueryExecutor for RecordingExecutor {
    async fn execute(&self, sql: &str) -> Result<Vec<ResultRow>> {
        self.statements.lock().unwrap().push(sql.to_string());
        self.outcome.clone().map_err(TaskError::Execution)
    }
}

pub fn agent(client: Arc<ScriptedClient>, executor: Arc<RecordingExecutor>) -> TaskQueryAgent {
    TaskQueryAgent::new(PromptBuilder::default(), SqlGuardrail::new(), client, executor)
}
