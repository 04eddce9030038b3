use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::core::metrics::Metrics;
use crate::error::ApiError;

/// Network-bound generation calls must not hang a request forever.
const GENERATION_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: "system".to_string(), content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user".to_string(), content: content.into() }
    }
}

/// Seam for the external generation capability. Handlers and pipelines only see
/// this trait, so tests substitute deterministic mocks.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Run one chat completion. `json_response` asks the backend to emit a JSON
    /// object (used by the alert and profile pipelines).
    async fn generate(&self, messages: &[ChatMessage], json_response: bool)
    -> Result<String, ApiError>;
}

#[derive(Serialize)]
struct OpenAiRequest<'a> {
    model: &'a str,
    messages: Vec<OpenAiMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Serialize)]
struct OpenAiMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessageOwned,
}

#[derive(Deserialize)]
struct OpenAiMessageOwned {
    content: String,
}

/// OpenAI-compatible chat-completions client.
pub struct OpenAiClient {
    api_key: String,
    base_url: String,
    model: String,
    client: Client,
    metrics: Arc<Metrics>,
}

impl OpenAiClient {
    pub fn new(api_key: String, base_url: String, model: String, metrics: Arc<Metrics>) -> Self {
        let client = Client::builder()
            .timeout(GENERATION_TIMEOUT)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self { api_key, base_url, model, client, metrics }
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn generate(
        &self,
        messages: &[ChatMessage],
        json_response: bool,
    ) -> Result<String, ApiError> {
        self.metrics.record_generation_call();

        let req_messages = messages
            .iter()
            .map(|m| OpenAiMessage { role: &m.role, content: &m.content })
            .collect();

        let req = OpenAiRequest {
            model: &self.model,
            messages: req_messages,
            response_format: json_response.then_some(ResponseFormat { kind: "json_object" }),
        };

        let res = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&req)
            .send()
            .await
            .map_err(|e| {
                warn!("Generation request failed: {}", e);
                ApiError::GenerationUnavailable(e.to_string())
            })?;

        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(ApiError::GenerationUnavailable(format!(
                "backend returned {}: {}",
                status, body
            )));
        }

        let parsed: OpenAiResponse = res
            .json()
            .await
            .map_err(|e| ApiError::MalformedGenerationOutput(e.to_string()))?;

        Ok(parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .unwrap_or_default())
    }
}
