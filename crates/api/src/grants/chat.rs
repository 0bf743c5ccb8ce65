//! Chat-completion provider client
//!
//! Speaks the `{model, messages}` request format and accepts either an
//! OpenAI-style `{choices: [{message: {content}}]}` reply or a native
//! `{message: {content}}` reply.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::Config;

/// Retries after the first attempt, for transient failures only
const MAX_RETRIES: usize = 1;

/// Initial backoff before the retry
const RETRY_BASE_DELAY: Duration = Duration::from_millis(250);

/// Maximum backoff before the retry
const RETRY_MAX_DELAY: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
}

/// Error type for chat-completion calls
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Provider returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Provider reply is not JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unexpected reply format from chat provider")]
    UnexpectedFormat,
}

impl ChatError {
    /// Returns true if this error is transient and should be retried
    pub fn is_transient(&self) -> bool {
        match self {
            ChatError::Http(e) => e.is_timeout() || e.is_connect(),
            ChatError::Status { status, .. } => *status == 429 || *status >= 500,
            ChatError::Json(_) => false,
            ChatError::UnexpectedFormat => false,
        }
    }
}

/// Result type for chat-completion calls
pub type ChatResult<T> = Result<T, ChatError>;

/// Reply shapes accepted from the provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatReply {
    /// `{choices: [{message: {content}}]}`
    OpenAi { content: String },
    /// `{message: {content}}`
    Native { content: String },
}

impl ChatReply {
    /// Classify a reply body by its shape
    pub fn from_value(value: &Value) -> ChatResult<Self> {
        if let Some(content) = value
            .get("choices")
            .and_then(Value::as_array)
            .and_then(|choices| choices.first())
            .and_then(|choice| choice.get("message"))
            .and_then(|message| message.get("content"))
            .and_then(Value::as_str)
        {
            return Ok(ChatReply::OpenAi {
                content: content.to_string(),
            });
        }

        if let Some(content) = value
            .get("message")
            .and_then(|message| message.get("content"))
            .and_then(Value::as_str)
        {
            return Ok(ChatReply::Native {
                content: content.to_string(),
            });
        }

        Err(ChatError::UnexpectedFormat)
    }

    pub fn into_content(self) -> String {
        match self {
            ChatReply::OpenAi { content } | ChatReply::Native { content } => content,
        }
    }
}

/// A model that answers a conversation with one message
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(&self, messages: &[ChatMessage]) -> ChatResult<String>;
}

/// HTTP chat-completion client
#[derive(Clone)]
pub struct ChatClient {
    http_client: Client,
    api_url: String,
    api_key: String,
    model: String,
}

impl ChatClient {
    /// Create a new chat client
    #[allow(clippy::expect_used)] // HTTP client creation failure is a fatal system error
    pub fn new(
        api_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            http_client,
            api_url: api_url.into(),
            api_key: api_key.into(),
            model: model.into(),
        }
    }

    /// Build a client from configuration; `None` when no API key is set
    pub fn from_config(config: &Config) -> Option<Self> {
        let api_key = config.chat_api_key.as_deref()?;
        Some(Self::new(
            config.chat_api_url.clone(),
            api_key,
            config.chat_model.clone(),
            Duration::from_millis(config.chat_timeout_ms),
        ))
    }

    async fn send_once(&self, messages: &[ChatMessage]) -> ChatResult<String> {
        let response = self
            .http_client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&ChatRequest {
                model: &self.model,
                messages,
            })
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(ChatError::Status {
                status: status.as_u16(),
                body: body.chars().take(500).collect(),
            });
        }

        let value: Value = serde_json::from_str(&body)?;
        Ok(ChatReply::from_value(&value)?.into_content())
    }
}

#[async_trait]
impl ChatModel for ChatClient {
    async fn complete(&self, messages: &[ChatMessage]) -> ChatResult<String> {
        use tokio_retry::strategy::{jitter, ExponentialBackoff};
        use tokio_retry::Retry;

        let retry_strategy = ExponentialBackoff::from_millis(RETRY_BASE_DELAY.as_millis() as u64)
            .max_delay(RETRY_MAX_DELAY)
            .take(MAX_RETRIES)
            .map(jitter);

        Retry::spawn(retry_strategy, || async {
            let result = self.send_once(messages).await;

            match &result {
                Ok(_) => Ok(result),
                Err(e) if e.is_transient() => {
                    tracing::warn!(model = %self.model, error = %e, "Transient chat error - will retry");
                    Err(result)
                }
                Err(_) => Ok(result),
            }
        })
        .await
        .unwrap_or_else(|e| e)
    }
}
