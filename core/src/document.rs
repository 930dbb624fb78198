//! Flow Document - The Authored Conversation Graph
//!
//! A Flow Document is a mapping from node id to node definition plus global
//! model settings. It is produced by an external editor, frozen at submit
//! time, and consumed read-only by the interpreter.
//!
//! The serde shape here is the wire format: what the editor exports is what
//! `/submit` receives and what this module parses.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;

/// The designated first node of every Flow Document.
pub const ENTRY_NODE_ID: &str = "1";

/// Shown when the entry node carries no message of its own.
pub const DEFAULT_ENTRY_MESSAGE: &str = "Let's begin.";

/// Default system instruction when the author left it blank.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant.";

/// Default model identifier.
pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";

#[derive(Error, Debug)]
pub enum DocumentError {
    #[error("start node '{ENTRY_NODE_ID}' is missing")]
    MissingEntryNode,
    #[error("flow document is not valid JSON: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// The behavioral variant of a node.
///
/// The variant decides how the user's response is obtained and how the next
/// node is resolved; the interpreter itself branches only on `Gpt` (handoff)
/// versus everything else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    /// Single selection among `options`; the selected label is the response.
    Choice,
    /// Multiple selection; the caller joins labels via [`join_selection`]
    /// and the joined string is matched against `options` as an opaque key.
    MultiChoice,
    /// Free-text response, routed via `next`.
    Input,
    /// Hand the conversation off to the model delegate permanently.
    Gpt,
    /// Terminal leaf.
    End,
}

/// One step in the conversation graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    /// Text shown to the user when this node becomes current.
    pub message: String,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    /// Option label -> target node id. Populated for choice/multi_choice.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub options: BTreeMap<String, String>,
    /// Variable name the user's response at this node is stored under.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capture: Option<String>,
    /// Target node id for non-branching node kinds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,
}

impl Node {
    /// The capture variable name, treating an empty string as absent.
    pub fn capture_name(&self) -> Option<&str> {
        self.capture.as_deref().filter(|c| !c.is_empty())
    }

    /// The `next` target, treating an empty string as absent.
    pub fn next_id(&self) -> Option<&str> {
        self.next.as_deref().filter(|n| !n.is_empty())
    }

    /// Resolve the target node id for a given response.
    ///
    /// `next` wins when present; otherwise the response is used as an exact
    /// key into `options`. Returns `None` when nothing matches, which the
    /// interpreter resolves as conversation termination.
    pub fn resolve_target(&self, response: &str) -> Option<&str> {
        self.next_id()
            .or_else(|| self.options.get(response).map(String::as_str))
    }
}

/// Global settings carried alongside the graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowSettings {
    pub system_prompt: String,
    pub gpt_model: String,
}

impl Default for FlowSettings {
    fn default() -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            gpt_model: DEFAULT_MODEL.to_string(),
        }
    }
}

/// The authored graph plus settings - immutable once submitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowDocument {
    pub settings: FlowSettings,
    pub nodes: HashMap<String, Node>,
}

impl FlowDocument {
    /// Parse a document from its exported JSON form and validate it.
    pub fn from_json(json: &str) -> Result<Self, DocumentError> {
        let doc: FlowDocument = serde_json::from_str(json)?;
        doc.validate()?;
        Ok(doc)
    }

    /// Check the structural invariants a submission must satisfy.
    ///
    /// Only the entry node is required. Dangling `next`/`options` targets
    /// are deliberately NOT rejected: they degrade to conversation
    /// termination at runtime.
    pub fn validate(&self) -> Result<(), DocumentError> {
        if !self.nodes.contains_key(ENTRY_NODE_ID) {
            return Err(DocumentError::MissingEntryNode);
        }
        Ok(())
    }

    /// Look up a node; dangling ids resolve to `None`, never an error.
    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id)
    }

    /// The message that seeds a fresh conversation.
    pub fn entry_message(&self) -> &str {
        self.node(ENTRY_NODE_ID)
            .map(|n| n.message.as_str())
            .filter(|m| !m.is_empty())
            .unwrap_or(DEFAULT_ENTRY_MESSAGE)
    }
}

/// Join a multi-choice selection into the response string.
///
/// The joined string is matched as an opaque key against the node's
/// `options`, so only combinations authored verbatim as one option key will
/// ever match. This is a designed constraint, shared here so the input
/// affordance and the interpreter cannot disagree on the separator.
pub fn join_selection<S: AsRef<str>>(labels: &[S]) -> String {
    labels
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Allocator for fresh node ids in an editing session.
///
/// Node ids are decimal strings. The counter is explicit session state
/// rather than a process-wide global, and can be recomputed from a loaded
/// document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeIdAllocator {
    next: u64,
}

impl NodeIdAllocator {
    /// Start after the entry node.
    pub fn new() -> Self {
        Self { next: 2 }
    }

    /// Recompute the counter from a document: one past the highest numeric id.
    pub fn from_document(doc: &FlowDocument) -> Self {
        let max = doc
            .nodes
            .keys()
            .filter_map(|id| id.parse::<u64>().ok())
            .max()
            .unwrap_or(1);
        Self { next: max + 1 }
    }

    /// Hand out the next id.
    pub fn next_id(&mut self) -> String {
        let id = self.next.to_string();
        self.next += 1;
        id
    }
}

impl Default for NodeIdAllocator {
    fn default() -> Self {
        Self::new()
    }
}
