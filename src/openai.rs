//! Completion Provider Client
//!
//! Sends chat message histories to the OpenAI chat completion API and
//! returns the first generated reply. Rate-limited attempts (HTTP 429) are
//! retried with exponential backoff up to a fixed bound; every other
//! failure propagates immediately.

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::OpenAiConfig;

/// Chat message role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A single role-tagged chat message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: &str) -> Self {
        Self {
            role: Role::System,
            content: content.to_string(),
        }
    }

    pub fn user(content: &str) -> Self {
        Self {
            role: Role::User,
            content: content.to_string(),
        }
    }

    pub fn assistant(content: &str) -> Self {
        Self {
            role: Role::Assistant,
            content: content.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChatMessage,
}

/// Errors from the completion provider
#[derive(Debug, Error)]
pub enum OpenAiError {
    /// Transport-level failure (connect, timeout, body read/parse)
    #[error("completion request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Provider returned a non-success status
    #[error("completion API error {status}: {body}")]
    Api { status: StatusCode, body: String },

    /// Provider returned a success response with no choices
    #[error("completion response contained no choices")]
    EmptyResponse,
}

impl OpenAiError {
    /// Status code of the provider error, if this is an API-level failure
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Client for the chat completion API
pub struct OpenAiClient {
    client: Client,
    config: OpenAiConfig,
}

impl OpenAiClient {
    pub fn new(config: OpenAiConfig) -> Result<Self, OpenAiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        debug!(
            "Completion client: model={} max_retries={}",
            config.model, config.max_retries
        );
        Ok(Self { client, config })
    }

    pub fn from_env() -> Result<Self, OpenAiError> {
        Self::new(OpenAiConfig::default())
    }

    /// Whether a provider API key is configured
    pub fn has_api_key(&self) -> bool {
        !self.config.api_key.is_empty()
    }

    /// Model identifier sent with every request
    pub fn model(&self) -> &str {
        &self.config.model
    }

    /// Send the message history and return the first generated reply.
    ///
    /// Retry semantics: only HTTP 429 is retried, at most
    /// `config.max_retries` times after the initial call (so up to
    /// `max_retries + 1` provider calls total). The retry counter is
    /// incremented before computing the delay, so retry k sleeps
    /// `base_delay_ms * 2^k` milliseconds: 1000ms, 2000ms, 4000ms with
    /// defaults. Any other status or transport error fails fast.
    pub async fn complete(&self, messages: &[ChatMessage]) -> Result<ChatMessage, OpenAiError> {
        let url = format!(
            "{}/chat/completions",
            self.config.api_base.trim_end_matches('/')
        );

        let mut retries: u32 = 0;
        loop {
            debug!(
                "Completion call {} (model {})",
                retries + 1,
                self.config.model
            );

            let response = self
                .client
                .post(&url)
                .bearer_auth(&self.config.api_key)
                .json(&ChatRequest {
                    model: &self.config.model,
                    messages,
                })
                .send()
                .await?;

            let status = response.status();
            if status.is_success() {
                let chat: ChatResponse = response.json().await?;
                return chat
                    .choices
                    .into_iter()
                    .next()
                    .map(|c| c.message)
                    .ok_or(OpenAiError::EmptyResponse);
            }

            let body = response.text().await.unwrap_or_default();

            if status == StatusCode::TOO_MANY_REQUESTS && retries < self.config.max_retries {
                retries += 1;
                let backoff_ms = self.config.base_delay_ms * (1 << retries);
                debug!(
                    "Rate limited, retry {}/{} in {}ms...",
                    retries, self.config.max_retries, backoff_ms
                );
                tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                continue;
            }

            if status == StatusCode::TOO_MANY_REQUESTS {
                warn!(
                    "Still rate limited after {} retries, giving up",
                    self.config.max_retries
                );
            }
            return Err(OpenAiError::Api { status, body });
        }
    }
}
