//! Conversation State - The Phase Machine
//!
//! Every conversation moves through exactly three phases:
//!
//! ```text
//! Active(n) --resolves to non-gpt m--> Active(m)
//! Active(n) --resolves to gpt node--> Delegate
//! Active(n) --resolution fails------> Terminal
//! Delegate  ------------------------> Delegate   (absorbing)
//! Terminal  ------------------------> Terminal   (absorbing)
//! ```
//!
//! Only a fresh document submission creates a new state and thereby leaves
//! an absorbing phase.

use crate::document::FlowDocument;
use crate::transcript::Transcript;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Where the conversation currently is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    /// Walking the authored graph; holds the current node id.
    Active(String),
    /// All further turns are handled by the model delegate. Absorbing.
    Delegate,
    /// The conversation has ended. Absorbing.
    Terminal,
}

impl Phase {
    pub fn is_active(&self) -> bool {
        matches!(self, Phase::Active(_))
    }

    pub fn is_delegate(&self) -> bool {
        matches!(self, Phase::Delegate)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Terminal)
    }

    /// The current node id, when still walking the graph.
    pub fn current_node(&self) -> Option<&str> {
        match self {
            Phase::Active(id) => Some(id),
            _ => None,
        }
    }
}

/// Mutable per-conversation state, owned by the interpreter's caller.
///
/// Created at submit time, mutated once per turn, destroyed on
/// re-submission. Never shared across conversations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationState {
    pub phase: Phase,
    /// Variables captured from user responses; last write wins.
    pub captured: HashMap<String, String>,
    pub transcript: Transcript,
}

impl ConversationState {
    /// Seed a fresh conversation from a just-submitted document: the entry
    /// node becomes current and its message opens the transcript.
    pub fn begin(document: &FlowDocument) -> Self {
        let mut transcript = Transcript::new();
        transcript.push_bot(document.entry_message());
        Self {
            phase: Phase::Active(crate::document::ENTRY_NODE_ID.to_string()),
            captured: HashMap::new(),
            transcript,
        }
    }
}
