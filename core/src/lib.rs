//! # FlowChat Core - Flow Document Model and Interpreter
//!
//! This crate is the protocol-agnostic heart of FlowChat:
//! - [`document`]: the authored conversation graph (Flow Document)
//! - [`state`]: per-conversation runtime state and its phase machine
//! - [`interpreter`]: the turn function that walks the graph
//! - [`delegate`]: the seam to the external language-model backend
//!
//! **IMPORTANT**: This layer has no HTTP and no IO beyond the [`delegate::Delegate`]
//! trait. Wire concerns live in `flowchat-client` and `flowchat-http`.

pub mod delegate;
pub mod document;
pub mod interpreter;
pub mod state;
pub mod transcript;

pub use delegate::{Delegate, DelegateError, DelegateTurn};
pub use document::{DocumentError, FlowDocument, FlowSettings, Node, NodeIdAllocator, NodeKind};
pub use interpreter::Interpreter;
pub use state::{ConversationState, Phase};
pub use transcript::{Line, Speaker, Transcript};

pub mod prelude {
    pub use crate::delegate::{Delegate, DelegateError, DelegateTurn};
    pub use crate::document::{FlowDocument, FlowSettings, Node, NodeKind};
    pub use crate::interpreter::Interpreter;
    pub use crate::state::{ConversationState, Phase};
    pub use crate::transcript::{Line, Speaker, Transcript};
}
