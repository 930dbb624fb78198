//! Flow Interpreter - The Turn Function
//!
//! Given an immutable Flow Document snapshot and a mutable
//! [`ConversationState`], [`Interpreter::advance`] computes one
//! conversation turn: append the user's response, capture it if the node
//! asks for that, resolve the next node, and either show its message, hand
//! off to the model delegate, or terminate.
//!
//! Nothing in here fails hard. Dangling node references terminate the
//! conversation with a fixed line; delegate failures substitute a fixed
//! line and otherwise proceed exactly as success. The delegate call is the
//! single suspension point of a turn.

use crate::delegate::{
    Delegate, DelegateTurn, CONVERSATION_COMPLETE, DEFAULT_HANDOFF_MESSAGE,
    DELEGATE_ERROR_FALLBACK,
};
use crate::document::{DocumentError, FlowDocument, NodeKind};
use crate::state::{ConversationState, Phase};
use crate::transcript::Line;
use tracing::Instrument;

/// Walks a submitted Flow Document, one turn per user response.
///
/// The document is frozen at construction; structural edits in the editor
/// never affect a conversation already in progress.
pub struct Interpreter<D> {
    document: FlowDocument,
    delegate: D,
}

impl<D: Delegate> Interpreter<D> {
    /// Take a snapshot of a validated document.
    pub fn new(document: FlowDocument, delegate: D) -> Result<Self, DocumentError> {
        document.validate()?;
        Ok(Self { document, delegate })
    }

    pub fn document(&self) -> &FlowDocument {
        &self.document
    }

    /// Start a fresh conversation on this document.
    pub fn begin(&self) -> ConversationState {
        ConversationState::begin(&self.document)
    }

    /// Advance the conversation by one turn.
    ///
    /// Returns the lines appended during this turn so the caller can render
    /// them incrementally. A terminated conversation is a no-op and returns
    /// no lines; only a fresh [`Interpreter::begin`] resumes it.
    pub async fn advance(&self, state: &mut ConversationState, response: &str) -> Vec<Line> {
        let span = tracing::info_span!(
            "Turn",
            flowchat.node = state.phase.current_node().unwrap_or("-"),
            flowchat.delegate_mode = state.phase.is_delegate(),
        );
        self.turn(state, response).instrument(span).await
    }

    async fn turn(&self, state: &mut ConversationState, response: &str) -> Vec<Line> {
        let before = state.transcript.len();

        match state.phase.clone() {
            Phase::Terminal => {
                tracing::debug!("turn ignored: conversation already terminated");
                return Vec::new();
            }
            Phase::Delegate => {
                state.transcript.push_user(response);
                let reply = self.consult(state).await;
                state.transcript.push_bot(reply);
                // Delegate mode is absorbing: no node transition ever again.
            }
            Phase::Active(node_id) => {
                let Some(node) = self.document.node(&node_id) else {
                    // Current id no longer resolves; treat as terminated.
                    tracing::debug!(node = %node_id, "turn ignored: current node missing");
                    return Vec::new();
                };

                state.transcript.push_user(response);

                if let Some(name) = node.capture_name() {
                    // Last write wins.
                    state.captured.insert(name.to_string(), response.to_string());
                }

                let next = node
                    .resolve_target(response)
                    .map(str::to_string)
                    .and_then(|id| self.document.node(&id).map(|n| (id, n)));

                match next {
                    None => {
                        state.transcript.push_bot(CONVERSATION_COMPLETE);
                        state.phase = Phase::Terminal;
                    }
                    Some((_, next_node)) if next_node.kind == NodeKind::Gpt => {
                        let handoff = if next_node.message.is_empty() {
                            DEFAULT_HANDOFF_MESSAGE
                        } else {
                            next_node.message.as_str()
                        };
                        state.transcript.push_bot(handoff);
                        let reply = self.consult(state).await;
                        state.transcript.push_bot(reply);
                        state.phase = Phase::Delegate;
                    }
                    Some((next_id, next_node)) => {
                        state.transcript.push_bot(next_node.message.clone());
                        state.phase = Phase::Active(next_id);
                    }
                }
            }
        }

        state.transcript.lines()[before..].to_vec()
    }

    /// Run the delegate over the full transcript. The error path yields the
    /// fixed fallback line; phase handling at the call sites is identical
    /// either way.
    async fn consult(&self, state: &ConversationState) -> String {
        let turn = DelegateTurn {
            transcript: &state.transcript,
            system_prompt: &self.document.settings.system_prompt,
            gpt_model: &self.document.settings.gpt_model,
            captured: &state.captured,
        };

        let span = tracing::info_span!(
            "DelegateCall",
            flowchat.model = %self.document.settings.gpt_model,
            flowchat.transcript_len = state.transcript.len(),
        );
        match self.delegate.converse(turn).instrument(span).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::warn!(error = %e, "delegate call failed, substituting fallback line");
                DELEGATE_ERROR_FALLBACK.to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delegate::DelegateError;
    use crate::document::{join_selection, FlowSettings, Node};
    use crate::transcript::Speaker;
    use async_trait::async_trait;
    use std::collections::{BTreeMap, HashMap, VecDeque};
    use std::sync::Mutex;

    /// Delegate that pops scripted outcomes and records what it saw.
    #[derive(Default)]
    struct Scripted {
        replies: Mutex<VecDeque<Result<String, DelegateError>>>,
        seen_transcripts: Mutex<Vec<Vec<Line>>>,
        seen_captured: Mutex<Vec<HashMap<String, String>>>,
    }

    impl Scripted {
        fn replying(replies: &[&str]) -> Self {
            let s = Self::default();
            {
                let mut q = s.replies.lock().unwrap();
                for r in replies {
                    q.push_back(Ok(r.to_string()));
                }
            }
            s
        }

        fn failing() -> Self {
            let s = Self::default();
            s.replies
                .lock()
                .unwrap()
                .push_back(Err(DelegateError::Transport("connection refused".into())));
            s
        }
    }

    #[async_trait]
    impl Delegate for Scripted {
        async fn converse(&self, turn: DelegateTurn<'_>) -> Result<String, DelegateError> {
            self.seen_transcripts
                .lock()
                .unwrap()
                .push(turn.transcript.lines().to_vec());
            self.seen_captured.lock().unwrap().push(turn.captured.clone());
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok("ok".to_string()))
        }
    }

    fn node(message: &str, kind: NodeKind) -> Node {
        Node {
            message: message.to_string(),
            kind,
            options: BTreeMap::new(),
            capture: None,
            next: None,
        }
    }

    fn choice(message: &str, options: &[(&str, &str)]) -> Node {
        Node {
            options: options
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            ..node(message, NodeKind::Choice)
        }
    }

    fn document(nodes: Vec<(&str, Node)>) -> FlowDocument {
        FlowDocument {
            settings: FlowSettings::default(),
            nodes: nodes
                .into_iter()
                .map(|(id, n)| (id.to_string(), n))
                .collect(),
        }
    }

    fn bot_lines(lines: &[Line]) -> Vec<&str> {
        lines
            .iter()
            .filter(|l| l.speaker == Speaker::Bot)
            .map(|l| l.text.as_str())
            .collect()
    }

    #[tokio::test]
    async fn test_choice_transitions_to_matched_target() {
        let doc = document(vec![
            ("1", choice("Shall we begin?", &[("Yes", "2")])),
            ("2", node("Great, tell me more.", NodeKind::Input)),
        ]);
        let interp = Interpreter::new(doc, Scripted::default()).unwrap();
        let mut state = interp.begin();

        let appended = interp.advance(&mut state, "Yes").await;

        assert_eq!(state.phase, Phase::Active("2".to_string()));
        assert_eq!(appended.len(), 2);
        assert_eq!(appended[0], Line::user("Yes"));
        assert_eq!(appended[1], Line::bot("Great, tell me more."));
        assert_eq!(state.transcript.last().unwrap().text, "Great, tell me more.");
    }

    #[tokio::test]
    async fn test_unmatched_choice_terminates() {
        let doc = document(vec![("1", choice("Shall we begin?", &[("Yes", "2")]))]);
        let interp = Interpreter::new(doc, Scripted::default()).unwrap();
        let mut state = interp.begin();

        let appended = interp.advance(&mut state, "Maybe").await;

        assert_eq!(state.phase, Phase::Terminal);
        assert_eq!(bot_lines(&appended), vec![CONVERSATION_COMPLETE]);
        assert_eq!(state.transcript.last().unwrap().text, CONVERSATION_COMPLETE);
    }

    #[tokio::test]
    async fn test_dangling_target_terminates_with_one_bot_line() {
        // "2" is authored as the target but does not exist.
        let doc = document(vec![("1", choice("Q?", &[("Yes", "2")]))]);
        let interp = Interpreter::new(doc, Scripted::default()).unwrap();
        let mut state = interp.begin();

        let appended = interp.advance(&mut state, "Yes").await;

        assert_eq!(state.phase, Phase::Terminal);
        assert_eq!(bot_lines(&appended).len(), 1);
    }

    #[tokio::test]
    async fn test_terminal_is_a_no_op() {
        let doc = document(vec![("1", choice("Q?", &[("Yes", "2")]))]);
        let interp = Interpreter::new(doc, Scripted::default()).unwrap();
        let mut state = interp.begin();

        interp.advance(&mut state, "Maybe").await;
        let len = state.transcript.len();

        let appended = interp.advance(&mut state, "hello?").await;
        assert!(appended.is_empty());
        assert_eq!(state.transcript.len(), len);
        assert_eq!(state.phase, Phase::Terminal);
    }

    #[tokio::test]
    async fn test_gpt_handoff_appends_two_bot_lines_and_enters_delegate_mode() {
        let delegate = Scripted::replying(&["I hear you."]);
        let doc = document(vec![
            ("1", choice("Q?", &[("Yes", "2")])),
            ("2", {
                let mut n = node("Let's continue.", NodeKind::Gpt);
                n.next = Some("3".to_string());
                n
            }),
        ]);
        let interp = Interpreter::new(doc, delegate).unwrap();
        let mut state = interp.begin();

        let appended = interp.advance(&mut state, "Yes").await;

        assert_eq!(state.phase, Phase::Delegate);
        assert_eq!(bot_lines(&appended), vec!["Let's continue.", "I hear you."]);
    }

    #[tokio::test]
    async fn test_gpt_handoff_delegate_sees_handoff_message() {
        let delegate = Scripted::replying(&["hi"]);
        let doc = document(vec![
            ("1", choice("Q?", &[("Yes", "2")])),
            ("2", node("Let's continue.", NodeKind::Gpt)),
        ]);
        let interp = Interpreter::new(doc, delegate).unwrap();
        let mut state = interp.begin();

        interp.advance(&mut state, "Yes").await;

        let seen = interp.delegate.seen_transcripts.lock().unwrap();
        let last_seen = seen.last().unwrap();
        assert_eq!(last_seen.last().unwrap(), &Line::bot("Let's continue."));
    }

    #[tokio::test]
    async fn test_gpt_node_without_message_uses_default_handoff() {
        let doc = document(vec![
            ("1", choice("Q?", &[("Yes", "2")])),
            ("2", node("", NodeKind::Gpt)),
        ]);
        let interp = Interpreter::new(doc, Scripted::replying(&["r"])).unwrap();
        let mut state = interp.begin();

        let appended = interp.advance(&mut state, "Yes").await;
        assert_eq!(bot_lines(&appended)[0], DEFAULT_HANDOFF_MESSAGE);
    }

    #[tokio::test]
    async fn test_delegate_mode_is_absorbing() {
        let delegate = Scripted::replying(&["first", "second", "third"]);
        let doc = document(vec![
            ("1", choice("Q?", &[("Yes", "2")])),
            ("2", node("Handing off.", NodeKind::Gpt)),
        ]);
        let interp = Interpreter::new(doc, delegate).unwrap();
        let mut state = interp.begin();

        interp.advance(&mut state, "Yes").await;
        assert_eq!(state.phase, Phase::Delegate);

        for text in ["more", "and more"] {
            let appended = interp.advance(&mut state, text).await;
            assert_eq!(state.phase, Phase::Delegate);
            assert_eq!(appended.len(), 2);
            assert_eq!(appended[0].speaker, Speaker::User);
            assert_eq!(appended[1].speaker, Speaker::Bot);
        }
    }

    #[tokio::test]
    async fn test_capture_overwrites_prior_value() {
        // 1 and 2 both capture "mood" and loop back and forth.
        let doc = document(vec![
            ("1", {
                let mut n = node("How do you feel?", NodeKind::Input);
                n.capture = Some("mood".to_string());
                n.next = Some("2".to_string());
                n
            }),
            ("2", {
                let mut n = node("And now?", NodeKind::Input);
                n.capture = Some("mood".to_string());
                n.next = Some("1".to_string());
                n
            }),
        ]);
        let interp = Interpreter::new(doc, Scripted::default()).unwrap();
        let mut state = interp.begin();

        interp.advance(&mut state, "anxious").await;
        assert_eq!(state.captured.get("mood").unwrap(), "anxious");

        interp.advance(&mut state, "calm").await;
        assert_eq!(state.captured.len(), 1);
        assert_eq!(state.captured.get("mood").unwrap(), "calm");
    }

    #[tokio::test]
    async fn test_captured_vars_reach_the_delegate() {
        let doc = document(vec![
            ("1", {
                let mut n = node("Name?", NodeKind::Input);
                n.capture = Some("name".to_string());
                n.next = Some("2".to_string());
                n
            }),
            ("2", node("", NodeKind::Gpt)),
        ]);
        let interp = Interpreter::new(doc, Scripted::replying(&["hello Ada"])).unwrap();
        let mut state = interp.begin();

        interp.advance(&mut state, "Ada").await;

        let seen = interp.delegate.seen_captured.lock().unwrap();
        assert_eq!(seen.last().unwrap().get("name").unwrap(), "Ada");
    }

    #[tokio::test]
    async fn test_delegate_failure_substitutes_fallback_and_still_enters_delegate_mode() {
        let doc = document(vec![
            ("1", choice("Q?", &[("Yes", "2")])),
            ("2", node("Handing off.", NodeKind::Gpt)),
        ]);
        let interp = Interpreter::new(doc, Scripted::failing()).unwrap();
        let mut state = interp.begin();

        let appended = interp.advance(&mut state, "Yes").await;

        // Identical shape to the success path: two bot lines, delegate mode.
        assert_eq!(state.phase, Phase::Delegate);
        assert_eq!(bot_lines(&appended), vec!["Handing off.", DELEGATE_ERROR_FALLBACK]);
    }

    #[tokio::test]
    async fn test_delegate_failure_in_delegate_mode_keeps_turn_taking() {
        let delegate = Scripted::replying(&["hi"]);
        delegate
            .replies
            .lock()
            .unwrap()
            .push_back(Err(DelegateError::Transport("boom".into())));
        let doc = document(vec![
            ("1", choice("Q?", &[("Yes", "2")])),
            ("2", node("Handing off.", NodeKind::Gpt)),
        ]);
        let interp = Interpreter::new(doc, delegate).unwrap();
        let mut state = interp.begin();

        interp.advance(&mut state, "Yes").await;
        let appended = interp.advance(&mut state, "still there?").await;

        assert_eq!(state.phase, Phase::Delegate);
        assert_eq!(bot_lines(&appended), vec![DELEGATE_ERROR_FALLBACK]);
    }

    #[tokio::test]
    async fn test_multi_choice_matches_only_authored_combination() {
        let combo = join_selection(&["Sleep", "Stress"]);
        let doc = document(vec![
            ("1", {
                let mut n = choice("Pick your topics.", &[]);
                n.kind = NodeKind::MultiChoice;
                n.options.insert(combo.clone(), "2".to_string());
                n
            }),
            ("2", node("Both it is.", NodeKind::End)),
        ]);
        let interp = Interpreter::new(doc, Scripted::default()).unwrap();

        // The authored combination, joined in the authored order, matches.
        let mut state = interp.begin();
        interp.advance(&mut state, &combo).await;
        assert_eq!(state.phase, Phase::Active("2".to_string()));

        // The same labels in another order are a different string: terminal.
        let mut state = interp.begin();
        interp
            .advance(&mut state, &join_selection(&["Stress", "Sleep"]))
            .await;
        assert_eq!(state.phase, Phase::Terminal);
    }

    #[tokio::test]
    async fn test_resubmission_resets_to_entry() {
        let doc = document(vec![("1", choice("Q?", &[("Yes", "2")]))]);
        let interp = Interpreter::new(doc, Scripted::default()).unwrap();
        let mut state = interp.begin();

        interp.advance(&mut state, "Maybe").await;
        assert!(state.phase.is_terminal());

        // A new submission produces a fresh state at the entry node.
        let state = interp.begin();
        assert_eq!(state.phase, Phase::Active("1".to_string()));
        assert_eq!(state.transcript.len(), 1);
    }

    #[tokio::test]
    async fn test_rejects_document_without_entry_node() {
        let doc = document(vec![("2", node("hi", NodeKind::End))]);
        assert!(Interpreter::new(doc, Scripted::default()).is_err());
    }
}
