use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::config::AiSettings;
use crate::error::{Result, TaskError};

/// Sends a system prompt and a user question to a generation service.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn submit(&self, system_prompt: &str, question: &str) -> Result<String>;
}

/// OpenAI-compatible chat completions client.
///
/// Generation is always requested with temperature 0. Every failure, a
/// missing key included, surfaces as [`TaskError::Unavailable`].
#[derive(Clone)]
pub struct LlmClient {
    api_key: Option<String>,
    base_url: String,
    model: String,
    http: reqwest::Client,
}

impl LlmClient {
    pub fn new(
        api_key: Option<String>,
        model: String,
        base_url: String,
        timeout: Duration,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TaskError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            api_key: api_key.filter(|key| !key.trim().is_empty()),
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            http,
        })
    }

    pub fn from_settings(settings: &AiSettings) -> Result<Self> {
        Self::new(
            settings.openai_api_key.clone(),
            settings.openai_model.clone(),
            settings.openai_base_url.clone(),
            Duration::from_secs(settings.openai_timeout_secs),
        )
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn request_body(&self, system_prompt: &str, question: &str) -> serde_json::Value {
        serde_json::json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": system_prompt},
                {"role": "user", "content": question}
            ],
            "temperature": 0
        })
    }
}

#[async_trait]
impl CompletionClient for LlmClient {
    async fn submit(&self, system_prompt: &str, question: &str) -> Result<String> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| TaskError::Unavailable("OPENAI_API_KEY not configured.".to_string()))?;

        info!(model = %self.model, "Requesting SQL generation");

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(api_key)
            .json(&self.request_body(system_prompt, question))
            .send()
            .await
            .map_err(|e| TaskError::Unavailable(format!("LLM API call failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TaskError::Unavailable(format!(
                "LLM API returned {}: {}",
                status, body
            )));
        }

        let response_json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| TaskError::Unavailable(format!("Failed to read LLM response: {}", e)))?;

        let content = extract_content(&response_json)?;
        debug!(chars = content.len(), "LLM response received");
        Ok(content)
    }
}

fn extract_content(response_json: &serde_json::Value) -> Result<String> {
    response_json["choices"][0]["message"]["content"]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| TaskError::Unavailable("No content in LLM response".to_string()))
}
