//! Delegate - The Model Backend Seam
//!
//! The interpreter never speaks a protocol. It hands each model-bound turn
//! to a [`Delegate`] and awaits one reply string. `flowchat-client`
//! provides the HTTP implementation; tests provide scripted ones.

use crate::transcript::Transcript;
use async_trait::async_trait;
use std::collections::HashMap;
use thiserror::Error;

/// Fallback bot line when the delegate answered but carried no reply field.
pub const NO_REPLY_FALLBACK: &str = "No response from GPT.";

/// Fallback bot line when the delegate call failed outright.
pub const DELEGATE_ERROR_FALLBACK: &str = "Error contacting GPT.";

/// Terminal bot line when node resolution fails.
pub const CONVERSATION_COMPLETE: &str = "Conversation complete.";

/// Default message for a gpt node that carries none of its own.
pub const DEFAULT_HANDOFF_MESSAGE: &str = "Let's continue.";

/// Everything the delegate needs for one turn.
///
/// Borrowed views into the conversation state: the delegate must not
/// mutate anything.
#[derive(Debug, Clone, Copy)]
pub struct DelegateTurn<'a> {
    pub transcript: &'a Transcript,
    pub system_prompt: &'a str,
    pub gpt_model: &'a str,
    pub captured: &'a HashMap<String, String>,
}

/// Delegate failures are non-fatal by design: the interpreter converts
/// them into [`DELEGATE_ERROR_FALLBACK`] and keeps going.
#[derive(Error, Debug)]
pub enum DelegateError {
    #[error("delegate transport failure: {0}")]
    Transport(String),
    #[error("delegate returned an unreadable reply: {0}")]
    Protocol(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// External collaborator that continues a conversation as free text.
#[async_trait]
pub trait Delegate: Send + Sync {
    /// Produce the next bot line for the given turn.
    ///
    /// A missing or malformed reply field on an otherwise successful
    /// exchange must be mapped to [`NO_REPLY_FALLBACK`] by the
    /// implementation, never surfaced as an error.
    async fn converse(&self, turn: DelegateTurn<'_>) -> Result<String, DelegateError>;
}
