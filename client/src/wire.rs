//! Wire payloads for the designer backend's `/chat` endpoint.

use flowchat_core::transcript::{Speaker, Transcript};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Message role as the backend expects it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl From<Speaker> for Role {
    fn from(speaker: Speaker) -> Self {
        match speaker {
            Speaker::User => Role::User,
            Speaker::Bot => Role::Assistant,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

/// `POST /chat` request body.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub chat_history: Vec<ChatMessage>,
    pub system_prompt: String,
    pub gpt_model: String,
    pub user_inputs: HashMap<String, String>,
}

impl ChatRequest {
    pub fn from_transcript(
        transcript: &Transcript,
        system_prompt: &str,
        gpt_model: &str,
        user_inputs: &HashMap<String, String>,
    ) -> Self {
        Self {
            chat_history: transcript
                .lines()
                .iter()
                .map(|line| ChatMessage {
                    role: line.speaker.into(),
                    content: line.text.clone(),
                })
                .collect(),
            system_prompt: system_prompt.to_string(),
            gpt_model: gpt_model.to_string(),
            user_inputs: user_inputs.clone(),
        }
    }
}

/// `POST /chat` response body. A missing `reply` is tolerated and mapped to
/// the designed fallback by the caller.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub reply: Option<String>,
}
