//! Route Handlers
//!
//! Pure request logic for `/health`, `/submit` and `/chat`, kept separate
//! from the hyper plumbing so every branch is unit-testable. Each handler
//! returns a status code plus the JSON body to write.

use crate::upstream::{Completion, Role, UpstreamError, UpstreamMessage};
use flowchat_core::document::{FlowDocument, ENTRY_NODE_ID};
use http::StatusCode;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;

/// Inbound history is bounded before it reaches the upstream model.
const MAX_HISTORY_MESSAGES: usize = 20;
const MAX_MESSAGE_CHARS: usize = 8000;

/// Mutable service state: the active flow plus the server-side view of the
/// conversation. Reset wholesale on every successful submission.
#[derive(Default)]
pub struct AppState {
    pub flow: Option<FlowDocument>,
    pub assistant_history: Vec<UpstreamMessage>,
    pub user_inputs: HashMap<String, String>,
}

/// A computed handler response.
pub type Reply = (StatusCode, Value);

fn error_reply(status: StatusCode, error: &str) -> Reply {
    (status, json!({ "error": error }))
}

/// `GET /health`
pub fn health() -> Reply {
    (StatusCode::OK, json!({ "status": "ok" }))
}

/// Check the submission payload the way the backend always has, producing
/// the same human-readable details.
fn validate_submission(value: &Value) -> Result<(), &'static str> {
    let Some(obj) = value.as_object() else {
        return Err("Invalid JSON.");
    };
    if !obj.contains_key("settings") || !obj.contains_key("nodes") {
        return Err("Missing 'settings' or 'nodes'.");
    }
    let settings = &obj["settings"];
    if settings.get("system_prompt").is_none() || settings.get("gpt_model").is_none() {
        return Err("Missing 'system_prompt' or 'gpt_model' in settings.");
    }
    if obj["nodes"].get(ENTRY_NODE_ID).is_none() {
        return Err("Start node '1' is missing.");
    }
    Ok(())
}

/// `POST /submit` - activate a new flow, resetting conversation state.
pub fn submit(state: &mut AppState, body: &[u8]) -> Reply {
    let value: Value = match serde_json::from_slice(body) {
        Ok(v) => v,
        Err(_) => Value::Null,
    };

    let detail = match validate_submission(&value) {
        Ok(()) => match serde_json::from_value::<FlowDocument>(value) {
            Ok(document) => {
                tracing::info!(flowchat.nodes = document.nodes.len(), "flow submitted");
                state.flow = Some(document);
                state.assistant_history.clear();
                state.user_inputs.clear();
                return (StatusCode::OK, json!({ "status": "success" }));
            }
            Err(_) => "Invalid JSON.",
        },
        Err(detail) => detail,
    };

    (
        StatusCode::BAD_REQUEST,
        json!({ "error": "invalid_flow", "detail": detail }),
    )
}

/// `POST /chat` request body. Parsed leniently: a missing or unreadable
/// body degrades to the defaults, matching the original backend.
#[derive(Debug, Default, Deserialize)]
pub struct ChatBody {
    #[serde(default)]
    pub chat_history: Vec<Value>,
    #[serde(default)]
    pub system_prompt: Option<String>,
    #[serde(default)]
    pub gpt_model: Option<String>,
    #[serde(default)]
    pub user_inputs: Option<HashMap<String, String>>,
}

/// Keep only well-formed messages with known roles, truncate oversized
/// content, and retain at most the newest [`MAX_HISTORY_MESSAGES`].
pub fn sanitize_history(raw: &[Value]) -> Vec<UpstreamMessage> {
    let mut safe: Vec<UpstreamMessage> = raw
        .iter()
        .filter_map(|m| {
            let role = Role::parse(m.get("role")?.as_str()?)?;
            let content = m.get("content")?.as_str()?;
            let truncated: String = content.chars().take(MAX_MESSAGE_CHARS).collect();
            Some(UpstreamMessage::new(role, truncated))
        })
        .collect();

    if safe.len() > MAX_HISTORY_MESSAGES {
        safe.drain(..safe.len() - MAX_HISTORY_MESSAGES);
    }
    safe
}

/// `POST /chat` - relay a conversation turn to the upstream model.
pub async fn chat(state: &mut AppState, body: &[u8], upstream: &dyn Completion) -> Reply {
    let (flow_prompt, flow_model) = match state.flow.as_ref() {
        Some(flow) => (
            flow.settings.system_prompt.clone(),
            flow.settings.gpt_model.clone(),
        ),
        None => return error_reply(StatusCode::BAD_REQUEST, "no_flow_submitted"),
    };

    let body: ChatBody = serde_json::from_slice(body).unwrap_or_default();

    let system_prompt = body.system_prompt.unwrap_or(flow_prompt);
    let gpt_model = body.gpt_model.unwrap_or(flow_model);
    if let Some(inputs) = body.user_inputs {
        state.user_inputs = inputs;
    }

    let mut messages = vec![UpstreamMessage::new(Role::System, system_prompt)];
    messages.extend(sanitize_history(&body.chat_history));

    match upstream.complete(&gpt_model, &messages).await {
        Ok(reply) => {
            state
                .assistant_history
                .push(UpstreamMessage::new(Role::Assistant, reply.clone()));
            (StatusCode::OK, json!({ "reply": reply }))
        }
        Err(UpstreamError::Timeout) => error_reply(StatusCode::GATEWAY_TIMEOUT, "timeout"),
        Err(UpstreamError::Unavailable(_)) => {
            error_reply(StatusCode::SERVICE_UNAVAILABLE, "upstream_unavailable")
        }
        Err(UpstreamError::RateLimited) => {
            error_reply(StatusCode::TOO_MANY_REQUESTS, "rate_limited")
        }
        Err(e) => {
            tracing::error!(error = %e, "upstream call failed");
            error_reply(StatusCode::INTERNAL_SERVER_ERROR, "server_error")
        }
    }
}
