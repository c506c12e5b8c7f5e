//! Model backends: the low-level "send a prompt, get text back" seam.
//! Separated from the cascade so tests can substitute deterministic doubles.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::BACKEND_TIMEOUT;

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("backend unavailable: {0}")]
    Unavailable(String),
    #[error("backend call exceeded its {0:?} budget")]
    Timeout(Duration),
    #[error("backend rate limit hit")]
    RateLimited,
    #[error("backend returned malformed output: {0}")]
    InvalidResponse(String),
}

/// One prompt/request payload. Temperature is fixed per call site: the
/// structured recommendation flow runs cold, the headline flow runs hot.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub system: String,
    pub user: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Ask the backend for a JSON object rather than prose.
    pub json_output: bool,
}

#[async_trait]
pub trait ModelBackend: Send + Sync {
    /// Model identifier, surfaced to callers as `modelUsed`.
    fn name(&self) -> &str;
    async fn complete(&self, request: &CompletionRequest) -> Result<String, BackendError>;
}

/// OpenAI Chat Completions backend. One instance per model candidate so the
/// cascade stays an ordered list of uniform handles.
pub struct OpenAiChatBackend {
    http: reqwest::Client,
    api_key: String,
    model: String,
    endpoint: String,
}

impl OpenAiChatBackend {
    pub fn new(api_key: String, model: String) -> Self {
        let http = reqwest::Client::builder()
            .user_agent("whatson/0.1 (+local activity recommender)")
            .connect_timeout(Duration::from_secs(4))
            .timeout(BACKEND_TIMEOUT)
            .build()
            .expect("reqwest client");
        Self {
            http,
            api_key,
            model,
            endpoint: "https://api.openai.com/v1/chat/completions".to_string(),
        }
    }
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat<'a>>,
}

#[derive(Serialize)]
struct ResponseFormat<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

#[async_trait]
impl ModelBackend for OpenAiChatBackend {
    fn name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String, BackendError> {
        if self.api_key.is_empty() {
            return Err(BackendError::Unavailable(
                "OPENAI_API_KEY is not configured".to_string(),
            ));
        }

        let payload = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &request.system,
                },
                ChatMessage {
                    role: "user",
                    content: &request.user,
                },
            ],
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            response_format: request.json_output.then_some(ResponseFormat {
                kind: "json_object",
            }),
        };

        let resp = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    BackendError::Timeout(BACKEND_TIMEOUT)
                } else {
                    BackendError::Unavailable(e.to_string())
                }
            })?;

        let status = resp.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(BackendError::RateLimited);
        }
        if !status.is_success() {
            return Err(BackendError::Unavailable(format!(
                "chat completions returned {status}"
            )));
        }

        let body: ChatResponse = resp
            .json()
            .await
            .map_err(|e| BackendError::InvalidResponse(e.to_string()))?;
        let content = body
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .unwrap_or_default();
        if content.trim().is_empty() {
            return Err(BackendError::InvalidResponse(
                "empty completion content".to_string(),
            ));
        }
        Ok(content)
    }
}

/// Deterministic backend used by mock mode and tests.
#[derive(Clone)]
pub struct MockBackend {
    name: String,
    fixed: String,
}

impl MockBackend {
    pub fn new(name: impl Into<String>, fixed: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fixed: fixed.into(),
        }
    }
}

#[async_trait]
impl ModelBackend for MockBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, _request: &CompletionRequest) -> Result<String, BackendError> {
        Ok(self.fixed.clone())
    }
}
