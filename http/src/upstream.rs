//! Upstream Completion Client
//!
//! Speaks the OpenAI-compatible `/v1/chat/completions` shape with a bounded
//! retry schedule: transient transport failures back off exponentially
//! (capped at 8 s), rate limits wait a flat 3 s, both with a little jitter.

use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

const DEFAULT_BASE_URL: &str = "https://api.openai.com";
const DEFAULT_TEMPERATURE: f32 = 0.8;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_RETRIES: u32 = 3;

/// Message role on the upstream wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "system" => Some(Role::System),
            "user" => Some(Role::User),
            "assistant" => Some(Role::Assistant),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpstreamMessage {
    pub role: Role,
    pub content: String,
}

impl UpstreamMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Upstream failure taxonomy; drives the `/chat` status mapping.
#[derive(Error, Debug)]
pub enum UpstreamError {
    #[error("upstream request timed out")]
    Timeout,
    #[error("upstream unavailable: {0}")]
    Unavailable(String),
    #[error("upstream rate limit exceeded")]
    RateLimited,
    #[error("upstream returned status {status}: {body}")]
    Api { status: u16, body: String },
    #[error("upstream reply was unreadable: {0}")]
    Protocol(String),
}

impl UpstreamError {
    fn is_retryable(&self) -> bool {
        matches!(
            self,
            UpstreamError::Timeout | UpstreamError::Unavailable(_) | UpstreamError::RateLimited
        )
    }
}

/// Seam over the completion backend so handlers can be tested without a
/// network.
#[async_trait]
pub trait Completion: Send + Sync {
    async fn complete(
        &self,
        model: &str,
        messages: &[UpstreamMessage],
    ) -> Result<String, UpstreamError>;
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [UpstreamMessage],
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: String,
}

/// Retrying client for an OpenAI-compatible completion endpoint.
#[derive(Debug, Clone)]
pub struct CompletionClient {
    api_key: String,
    base_url: String,
    temperature: f32,
    http: reqwest::Client,
}

impl CompletionClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            http: reqwest::Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .unwrap_or_default(),
        }
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        let trimmed = self.base_url.trim_end_matches('/').len();
        self.base_url.truncate(trimmed);
        self
    }

    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    async fn request_once(
        &self,
        model: &str,
        messages: &[UpstreamMessage],
    ) -> Result<String, UpstreamError> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        let body = CompletionRequest {
            model,
            messages,
            temperature: self.temperature,
        };

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    UpstreamError::Timeout
                } else {
                    UpstreamError::Unavailable(e.to_string())
                }
            })?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(UpstreamError::RateLimited);
        }
        if status.is_server_error() {
            return Err(UpstreamError::Unavailable(format!("status {}", status)));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(UpstreamError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: CompletionResponse = response
            .json()
            .await
            .map_err(|e| UpstreamError::Protocol(e.to_string()))?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| UpstreamError::Protocol("no choices in response".to_string()))
    }

    fn backoff(error: &UpstreamError, attempt: u32) -> Duration {
        let jitter: f64 = rand::thread_rng().gen_range(0.0..0.5);
        let base = match error {
            UpstreamError::RateLimited => 3.0,
            _ => f64::from(2u32.saturating_pow(attempt).min(8)),
        };
        Duration::from_secs_f64(base + jitter)
    }
}

#[async_trait]
impl Completion for CompletionClient {
    async fn complete(
        &self,
        model: &str,
        messages: &[UpstreamMessage],
    ) -> Result<String, UpstreamError> {
        let mut attempt = 0;
        loop {
            match self.request_once(model, messages).await {
                Ok(reply) => return Ok(reply),
                Err(e) if e.is_retryable() && attempt < MAX_RETRIES => {
                    attempt += 1;
                    let delay = Self::backoff(&e, attempt);
                    tracing::warn!(
                        error = %e,
                        flowchat.retry = attempt,
                        flowchat.delay_ms = delay.as_millis() as u64,
                        "upstream call failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
