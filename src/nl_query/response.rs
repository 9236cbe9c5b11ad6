use serde_json::Value;

use crate::error::{Result, TaskError};

/// Field of the generated JSON object that carries the SQL text.
pub const SQL_FIELD: &str = "sql";

/// Extract the candidate SQL from a raw completion.
///
/// The completion must be exactly one JSON object with a string `sql` field.
/// Anything else fails; SQL is never scraped out of prose or code fences.
pub fn parse_candidate_sql(raw: &str) -> Result<String> {
    let payload: Value = serde_json::from_str(raw)
        .map_err(|e| TaskError::ResponseParse(format!("response is not valid JSON: {}", e)))?;

    let object = payload
        .as_object()
        .ok_or_else(|| TaskError::ResponseParse("response is not a JSON object".to_string()))?;

    match object.get(SQL_FIELD) {
        Some(Value::String(sql)) => Ok(sql.clone()),
        Some(other) => Err(TaskError::ResponseParse(format!(
            "field '{}' must be a string, got {}",
            SQL_FIELD,
            json_kind(other)
        ))),
        None => Err(TaskError::ResponseParse(format!(
            "missing required field '{}'",
            SQL_FIELD
        ))),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
