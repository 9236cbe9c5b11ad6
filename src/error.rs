use crate::nl_query::GuardrailViolation;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TaskError {
    #[error("Configuration error: {0}")]
    Config(String),

    /// The generation service is missing credentials or cannot be reached.
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Unable to parse model response: {0}")]
    ResponseParse(String),

    #[error(transparent)]
    Guardrail(#[from] GuardrailViolation),

    /// A validated statement was rejected or failed at the data store.
    #[error("Execution error: {0}")]
    Execution(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl TaskError {
    /// HTTP status used when this error reaches the API surface.
    pub fn status_code(&self) -> u16 {
        match self {
            TaskError::Unavailable(_) => 503,
            TaskError::Guardrail(_) => 400,
            TaskError::NotFound(_) => 404,
            TaskError::InvalidInput(_) => 422,
            TaskError::ResponseParse(_)
            | TaskError::Execution(_)
            | TaskError::Database(_)
            | TaskError::Config(_)
            | TaskError::Io(_)
            | TaskError::Json(_)
            | TaskError::Csv(_) => 500,
        }
    }

    /// Message returned to API callers in the `detail` field.
    pub fn detail(&self) -> String {
        match self {
            TaskError::Unavailable(msg) | TaskError::NotFound(msg) | TaskError::InvalidInput(msg) => {
                msg.clone()
            }
            TaskError::ResponseParse(_) => "Unable to parse model response.".to_string(),
            TaskError::Guardrail(violation) => violation.to_string(),
            other => other.to_string(),
        }
    }
}

impl From<sqlx::Error> for TaskError {
    fn from(err: sqlx::Error) -> Self {
        TaskError::Database(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, TaskError>;
