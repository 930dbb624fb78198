//! # FlowChat Client - Designer Backend Adapter
//!
//! HTTP client for the designer backend: submits exported Flow Documents
//! (`POST /submit`) and relays model-bound turns (`POST /chat`). The latter
//! makes [`BackendClient`] the production [`Delegate`] implementation.

pub mod wire;

use async_trait::async_trait;
use flowchat_core::delegate::{Delegate, DelegateError, DelegateTurn, NO_REPLY_FALLBACK};
use flowchat_core::document::FlowDocument;
use std::time::Duration;
use thiserror::Error;
use wire::{ChatRequest, ChatResponse};

const DEFAULT_BASE_URL: &str = "http://localhost:5000";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(35);

#[derive(Error, Debug)]
pub enum ClientError {
    /// The backend refused the submission (non-2xx). The conversation stays
    /// inactive; no state mutation has happened.
    #[error("flow submission rejected with status {status}: {detail}")]
    Rejected { status: u16, detail: String },
    #[error("backend transport failure: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Client for the designer backend.
///
/// # Example
/// ```rust,ignore
/// let client = BackendClient::new().with_base_url("http://localhost:5000");
/// client.submit(&document).await?;
/// let interpreter = Interpreter::new(document, client)?;
/// ```
#[derive(Debug, Clone)]
pub struct BackendClient {
    base_url: String,
    http: reqwest::Client,
}

impl BackendClient {
    pub fn new() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            http: reqwest::Client::builder()
                .timeout(DEFAULT_TIMEOUT)
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

    /// Submit an exported Flow Document, activating it on the backend.
    ///
    /// On success the caller seeds a fresh conversation from the document.
    /// On rejection nothing changes and the detail is surfaced to the user.
    pub async fn submit(&self, document: &FlowDocument) -> Result<(), ClientError> {
        let url = format!("{}/submit", self.base_url);
        let response = self.http.post(&url).json(document).send().await?;

        let status = response.status();
        if status.is_success() {
            tracing::info!(flowchat.nodes = document.nodes.len(), "flow submitted");
            Ok(())
        } else {
            let detail = response.text().await.unwrap_or_default();
            tracing::warn!(flowchat.status = status.as_u16(), "flow submission rejected");
            Err(ClientError::Rejected {
                status: status.as_u16(),
                detail,
            })
        }
    }
}

impl Default for BackendClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Delegate for BackendClient {
    async fn converse(&self, turn: DelegateTurn<'_>) -> Result<String, DelegateError> {
        let url = format!("{}/chat", self.base_url);
        let body = ChatRequest::from_transcript(
            turn.transcript,
            turn.system_prompt,
            turn.gpt_model,
            turn.captured,
        );

        let response = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| DelegateError::Transport(e.to_string()))?;

        // The body is decoded regardless of status: the backend reports its
        // own failures as JSON, and an unreadable body is the protocol
        // failure case.
        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| DelegateError::Protocol(e.to_string()))?;

        Ok(parsed.reply.unwrap_or_else(|| NO_REPLY_FALLBACK.to_string()))
    }
}
