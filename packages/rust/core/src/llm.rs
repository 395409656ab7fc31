//! Chat completion client for the summarization service.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use politdocs_shared::{LlmConfig, PolitdocsError, Result};

/// Error text the service returns when the input exceeds the context window.
const TOO_LONG_MESSAGE: &str = "Please reduce the length of the messages.";

/// Structured error code for the same condition.
const TOO_LONG_CODE: &str = "context_length_exceeded";

/// Failure of one completion call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CompletionError {
    /// The input does not fit; retrying the same text is pointless.
    #[error("input too long: {0}")]
    TooLong(String),
    #[error("{0}")]
    Other(String),
}

impl CompletionError {
    /// Classify an error body returned by the service.
    pub fn classify(body: impl Into<String>) -> Self {
        let body = body.into();
        if body.contains(TOO_LONG_MESSAGE) || body.contains(TOO_LONG_CODE) {
            Self::TooLong(body)
        } else {
            Self::Other(body)
        }
    }
}

/// One system + user exchange with a language model.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, system: &str, user: &str)
    -> std::result::Result<String, CompletionError>;
}

// ---------------------------------------------------------------------------
// OpenAI-compatible client
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: [ChatMessage<'a>; 2],
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

/// Client for `POST {base_url}/chat/completions`.
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
}

impl OpenAiClient {
    pub fn new(api_key: impl Into<String>, config: &LlmConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("politdocs/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| PolitdocsError::config(format!("failed to build LLM client: {e}")))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: config.model.clone(),
            temperature: config.temperature,
        })
    }

    /// Build a client reading the API key from the configured env var.
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        Self::new(config.api_key()?, config)
    }
}

#[async_trait]
impl CompletionClient for OpenAiClient {
    async fn complete(
        &self,
        system: &str,
        user: &str,
    ) -> std::result::Result<String, CompletionError> {
        let url = format!("{}/chat/completions", self.base_url);
        let request = ChatRequest {
            model: &self.model,
            temperature: self.temperature,
            messages: [
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
        };

        debug!(model = %self.model, chars = user.chars().count(), "chat completion request");

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| CompletionError::Other(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CompletionError::classify(format!(
                "API error ({status}): {body}"
            )));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| CompletionError::Other(format!("invalid response: {e}")))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| CompletionError::Other("response contained no message".into()))
    }
}
