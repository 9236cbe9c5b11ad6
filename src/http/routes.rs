//! Route table for the tasks API.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use crate::db::{AnalyticsRepository, TaskRepository};
use crate::error::{Result, TaskError};
use crate::http::request::Request;
use crate::http::response::Response;
use crate::models::{HealthCheck, TaskCreate, TaskFilter, TaskUpdate};
use crate::nl_query::TaskQueryAgent;

/// Shortest question accepted by `/ai/query`.
pub const MIN_QUESTION_CHARS: usize = 4;

/// Shared, immutable handler state.
#[derive(Clone)]
pub struct AppState {
    pub tasks: TaskRepository,
    pub analytics: AnalyticsRepository,
    pub agent: TaskQueryAgent,
}

impl AppState {
    pub fn new(pool: PgPool, agent: TaskQueryAgent) -> Self {
        Self {
            tasks: TaskRepository::new(pool.clone()),
            analytics: AnalyticsRepository::new(pool),
            agent,
        }
    }
}

#[derive(Debug, Deserialize)]
struct AiQueryRequest {
    question: String,
}

impl AiQueryRequest {
    fn validate(&self) -> Result<()> {
        if self.question.chars().count() < MIN_QUESTION_CHARS {
            return Err(TaskError::InvalidInput(format!(
                "question must be at least {} characters",
                MIN_QUESTION_CHARS
            )));
        }
        Ok(())
    }
}

#[derive(Serialize)]
struct AiQueryResponse {
    sql: String,
    rows: Vec<crate::nl_query::ResultRow>,
}

/// Dispatch one request. Errors become `{"detail": ...}` bodies.
pub async fn route(state: &AppState, request: &Request) -> Response {
    if request.method == "OPTIONS" {
        return Response::no_content();
    }

    match dispatch(state, request).await {
        Ok(response) => response,
        Err(e) => Response::from_error(&e),
    }
}

async fn dispatch(state: &AppState, request: &Request) -> Result<Response> {
    let segments = request.segments();
    let segments: Vec<&str> = segments.iter().map(String::as_str).collect();

    match (request.method.as_str(), segments.as_slice()) {
        ("GET", ["health"]) => Ok(Response::json(200, &HealthCheck::ok())),

        ("GET", ["tasks"]) => {
            let filter = TaskFilter::from_query(&request.query)?;
            let tasks = state.tasks.list(&filter).await?;
            Ok(Response::json(200, &tasks))
        }
        ("POST", ["tasks"]) => {
            let payload: TaskCreate = request.json()?;
            let task = state.tasks.create(payload).await?;
            Ok(Response::json(201, &task))
        }
        ("GET", ["tasks", task_id]) => {
            let task = state.tasks.get(task_id).await?.ok_or_else(task_not_found)?;
            Ok(Response::json(200, &task))
        }
        ("PATCH", ["tasks", task_id]) => {
            let patch: TaskUpdate = request.json()?;
            let task = state
                .tasks
                .update(task_id, patch)
                .await?
                .ok_or_else(task_not_found)?;
            Ok(Response::json(200, &task))
        }
        ("DELETE", ["tasks", task_id]) => {
            if state.tasks.delete(task_id).await? {
                Ok(Response::no_content())
            } else {
                Err(task_not_found())
            }
        }

        ("GET", ["analytics", "dashboard"]) => {
            let dashboard = state.analytics.dashboard(Utc::now()).await?;
            Ok(Response::json(200, &dashboard))
        }
        ("GET", ["analytics", "task-management"]) => {
            let members = state.analytics.task_management().await?;
            Ok(Response::json(200, &members))
        }

        ("POST", ["ai", "query"]) => {
            let payload: AiQueryRequest = request.json()?;
            payload.validate()?;
            let answer = state.agent.answer(&payload.question).await?;
            Ok(Response::json(
                200,
                &AiQueryResponse {
                    sql: answer.sql,
                    rows: answer.rows,
                },
            ))
        }

        (method, _) if is_known_path(&segments) => Ok(Response::error(
            405,
            &format!("Method {} not allowed for {}", method, request.path),
        )),
        (method, _) => Err(TaskError::NotFound(format!(
            "Not found: {} {}",
            method, request.path
        ))),
    }
}

fn is_known_path(segments: &[&str]) -> bool {
    matches!(
        segments,
        ["health"]
            | ["tasks"]
            | ["tasks", _]
            | ["analytics", "dashboard"]
            | ["analytics", "task-management"]
            | ["ai", "query"]
    )
}

fn task_not_found() -> TaskError {
    TaskError::NotFound("Task not found.".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_questions_are_rejected() {
        let request = AiQueryRequest {
            question: "hi?".to_string(),
        };
        assert!(matches!(request.validate(), Err(TaskError::InvalidInput(_))));
    }

    #[test]
    fn question_length_counts_characters() {
        let request = AiQueryRequest {
            question: "¿qué?".to_string(),
        };
        assert!(request.validate().is_ok());
    }

    #[test]
    fn known_paths_include_task_ids() {
        assert!(is_known_path(&["tasks", "T-1"]));
        assert!(is_known_path(&["analytics", "dashboard"]));
        assert!(!is_known_path(&["tasks", "T-1", "history"]));
    }
}
