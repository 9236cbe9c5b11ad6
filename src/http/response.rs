use serde::Serialize;
use serde_json::json;

use crate::error::TaskError;

const ALLOWED_METHODS: &str = "GET, POST, PATCH, DELETE, OPTIONS";
const ALLOWED_HEADERS: &str = "Content-Type, Authorization";

/// A fully buffered response. Every response carries permissive CORS headers
/// and closes the connection.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    status: u16,
    body: Vec<u8>,
}

impl Response {
    pub fn json<T: Serialize>(status: u16, body: &T) -> Self {
        match serde_json::to_vec(body) {
            Ok(body) => Self { status, body },
            Err(e) => Self::error(500, &format!("Failed to encode response: {}", e)),
        }
    }

    pub fn error(status: u16, detail: &str) -> Self {
        Self::json(status, &json!({ "detail": detail }))
    }

    pub fn from_error(err: &TaskError) -> Self {
        let body = match err {
            TaskError::Guardrail(violation) => json!({
                "detail": err.detail(),
                "reason": violation.reason(),
            }),
            _ => json!({ "detail": err.detail() }),
        };
        Self::json(err.status_code(), &body)
    }

    pub fn no_content() -> Self {
        Self {
            status: 204,
            body: Vec::new(),
        }
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut head = format!(
            "HTTP/1.1 {} {}\r\n\
             Access-Control-Allow-Origin: *\r\n\
             Access-Control-Allow-Methods: {}\r\n\
             Access-Control-Allow-Headers: {}\r\n\
             Content-Length: {}\r\n\
             Connection: close\r\n",
            self.status,
            status_text(self.status),
            ALLOWED_METHODS,
            ALLOWED_HEADERS,
            self.body.len()
        );
        if !self.body.is_empty() {
            head.push_str("Content-Type: application/json\r\n");
        }
        head.push_str("\r\n");

        let mut bytes = head.into_bytes();
        bytes.extend_from_slice(&self.body);
        bytes
    }
}

fn status_text(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        204 => "No Content",
        400 => "Bad Request",
        404 => "Not Found",
        405 => "Method Not Allowed",
        408 => "Request Timeout",
        413 => "Payload Too Large",
        422 => "Unprocessable Entity",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "Unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nl_query::GuardrailViolation;

    fn body_json(response: &Response) -> serde_json::Value {
        serde_json::from_slice(response.body()).unwrap()
    }

    #[test]
    fn serializes_head_with_cors_and_length() {
        let response = Response::json(200, &json!({"status": "ok"}));
        let text = String::from_utf8(response.to_bytes()).unwrap();

        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(text.contains("Access-Control-Allow-Origin: *\r\n"));
        assert!(text.contains("Content-Type: application/json\r\n"));
        assert!(text.contains("Content-Length: 15\r\n"));
        assert!(text.ends_with("\r\n\r\n{\"status\":\"ok\"}"));
    }

    #[test]
    fn no_content_has_empty_body() {
        let text = String::from_utf8(Response::no_content().to_bytes()).unwrap();
        assert!(text.starts_with("HTTP/1.1 204 No Content\r\n"));
        assert!(text.contains("Content-Length: 0\r\n"));
        assert!(!text.contains("Content-Type: application/json"));
    }

    #[test]
    fn guardrail_errors_carry_reason_code() {
        let response = Response::from_error(&TaskError::from(GuardrailViolation::WrongTable));
        assert_eq!(response.status(), 400);
        let body = body_json(&response);
        assert_eq!(body["reason"], "wrong_table");
        assert_eq!(body["detail"], "Query must target the tasks table.");
    }

    #[test]
    fn other_errors_only_carry_detail() {
        let response = Response::from_error(&TaskError::NotFound("Task not found.".into()));
        assert_eq!(response.status(), 404);
        assert_eq!(body_json(&response), json!({"detail": "Task not found."}));
    }
}
