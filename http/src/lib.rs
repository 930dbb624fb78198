//! # FlowChat HTTP - Designer Backend Service
//!
//! Hyper 1.0-native implementation of the designer backend:
//! `GET /health`, `POST /submit` (activate a flow), `POST /chat` (relay a
//! turn to an OpenAI-compatible upstream with bounded retries).

pub mod handlers;
pub mod ingress;
pub mod upstream;

pub use handlers::AppState;
pub use ingress::FlowService;
pub use upstream::{Completion, CompletionClient, Role, UpstreamError, UpstreamMessage};
