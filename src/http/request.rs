//! Minimal HTTP/1.1 request reading.

use std::collections::HashMap;
use std::time::Duration;

use percent_encoding::percent_decode_str;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::time::timeout;

use crate::error::TaskError;

pub const READ_TIMEOUT: Duration = Duration::from_secs(5);
pub const MAX_BODY_BYTES: usize = 1024 * 1024;
const MAX_HEAD_BYTES: usize = 64 * 1024;
const HEAD_TERMINATOR: &[u8] = b"\r\n\r\n";

#[derive(Debug, Error)]
pub enum RequestError {
    #[error("Request timeout")]
    Timeout,

    #[error("{0}")]
    Malformed(String),

    #[error("Request body exceeds {} bytes", MAX_BODY_BYTES)]
    TooLarge,

    #[error("Connection error: {0}")]
    Io(#[from] std::io::Error),
}

impl RequestError {
    pub fn status_code(&self) -> u16 {
        match self {
            RequestError::Timeout => 408,
            RequestError::Malformed(_) => 400,
            RequestError::TooLarge => 413,
            RequestError::Io(_) => 400,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Request {
    pub method: String,
    pub path: String,
    pub query: HashMap<String, String>,
    /// Header names are lowercased.
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl Request {
    /// Decoded, non-empty path segments.
    pub fn segments(&self) -> Vec<String> {
        self.path
            .split('/')
            .filter(|segment| !segment.is_empty())
            .map(|segment| percent_decode_str(segment).decode_utf8_lossy().into_owned())
            .collect()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    fn content_length(&self) -> Result<usize, RequestError> {
        match self.header("content-length") {
            None => Ok(0),
            Some(value) => value
                .trim()
                .parse()
                .map_err(|_| RequestError::Malformed(format!("Invalid Content-Length '{}'", value))),
        }
    }

    /// Deserialize the body; malformed payloads are invalid input.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, TaskError> {
        if self.body.is_empty() {
            return Err(TaskError::InvalidInput("Request body is required".to_string()));
        }
        serde_json::from_slice(&self.body)
            .map_err(|e| TaskError::InvalidInput(format!("Invalid request body: {}", e)))
    }
}

/// Read one request, giving up after [`READ_TIMEOUT`].
pub async fn read_request<R>(reader: &mut R) -> Result<Request, RequestError>
where
    R: AsyncRead + Unpin,
{
    timeout(READ_TIMEOUT, read_request_inner(reader))
        .await
        .map_err(|_| RequestError::Timeout)?
}

async fn read_request_inner<R>(reader: &mut R) -> Result<Request, RequestError>
where
    R: AsyncRead + Unpin,
{
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 8192];

    let head_end = loop {
        if let Some(pos) = find_head_end(&buffer) {
            break pos;
        }
        if buffer.len() > MAX_HEAD_BYTES {
            return Err(RequestError::Malformed("Request headers too large".to_string()));
        }
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            let reason = if buffer.is_empty() { "Empty request" } else { "Incomplete request" };
            return Err(RequestError::Malformed(reason.to_string()));
        }
        buffer.extend_from_slice(&chunk[..n]);
    };

    let head = std::str::from_utf8(&buffer[..head_end])
        .map_err(|_| RequestError::Malformed("Request head is not UTF-8".to_string()))?;
    let mut request = parse_head(head)?;

    let content_length = request.content_length()?;
    if content_length > MAX_BODY_BYTES {
        return Err(RequestError::TooLarge);
    }

    let mut body = buffer[head_end + HEAD_TERMINATOR.len()..].to_vec();
    while body.len() < content_length {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            return Err(RequestError::Malformed(
                "Request body shorter than Content-Length".to_string(),
            ));
        }
        body.extend_from_slice(&chunk[..n]);
    }
    body.truncate(content_length);
    request.body = body;

    Ok(request)
}

fn find_head_end(buffer: &[u8]) -> Option<usize> {
    buffer
        .windows(HEAD_TERMINATOR.len())
        .position(|window| window == HEAD_TERMINATOR)
}

/// Parse the request line and headers.
pub fn parse_head(head: &str) -> Result<Request, RequestError> {
    let mut lines = head.split("\r\n");

    let request_line = lines
        .next()
        .filter(|line| !line.trim().is_empty())
        .ok_or_else(|| RequestError::Malformed("Empty request".to_string()))?;
    let parts: Vec<&str> = request_line.split_whitespace().collect();
    if parts.len() < 2 {
        return Err(RequestError::Malformed("Invalid request line".to_string()));
    }

    let (path, query) = match parts[1].split_once('?') {
        Some((path, query)) => (path, parse_query(query)),
        None => (parts[1], HashMap::new()),
    };

    let headers = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(name, value)| (name.trim().to_ascii_lowercase(), value.trim().to_string()))
        .collect();

    Ok(Request {
        method: parts[0].to_ascii_uppercase(),
        path: path.to_string(),
        query,
        headers,
        body: Vec::new(),
    })
}

pub fn parse_query(query: &str) -> HashMap<String, String> {
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            (decode_component(key), decode_component(value))
        })
        .collect()
}

fn decode_component(value: &str) -> String {
    let spaced = value.replace('+', " ");
    percent_decode_str(&spaced).decode_utf8_lossy().into_owned()
}
