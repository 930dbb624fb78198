//! Transcript - Ordered Conversation History
//!
//! The transcript is an append-only sequence of user and bot lines. It is
//! both what the chat panel renders and what the model delegate receives as
//! context.

use serde::{Deserialize, Serialize};

/// Who produced a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    User,
    Bot,
}

/// A single transcript entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Line {
    pub speaker: Speaker,
    pub text: String,
}

impl Line {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            speaker: Speaker::User,
            text: text.into(),
        }
    }

    pub fn bot(text: impl Into<String>) -> Self {
        Self {
            speaker: Speaker::Bot,
            text: text.into(),
        }
    }
}

/// Append-only conversation history.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transcript(Vec<Line>);

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_user(&mut self, text: impl Into<String>) {
        self.0.push(Line::user(text));
    }

    pub fn push_bot(&mut self, text: impl Into<String>) {
        self.0.push(Line::bot(text));
    }

    pub fn lines(&self) -> &[Line] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn last(&self) -> Option<&Line> {
        self.0.last()
    }

    /// Render the transcript as plain text for file export.
    ///
    /// User lines are attributed to "You", bot lines to `bot_name`,
    /// separated by blank lines.
    pub fn to_plain_text(&self, bot_name: &str) -> String {
        self.0
            .iter()
            .map(|line| match line.speaker {
                Speaker::User => format!("You: {}", line.text),
                Speaker::Bot => format!("{}: {}", bot_name, line.text),
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_order_preserved() {
        let mut t = Transcript::new();
        t.push_bot("Hello");
        t.push_user("Hi");
        t.push_bot("How are you?");

        let lines = t.lines();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], Line::bot("Hello"));
        assert_eq!(lines[1], Line::user("Hi"));
        assert_eq!(t.last(), Some(&Line::bot("How are you?")));
    }

    #[test]
    fn test_plain_text_export() {
        let mut t = Transcript::new();
        t.push_bot("Hello");
        t.push_user("Hi");

        let text = t.to_plain_text("Assistant");
        assert_eq!(text, "Assistant: Hello\n\nYou: Hi");
    }

    #[test]
    fn test_speaker_wire_format() {
        let json = serde_json::to_string(&Line::user("x")).unwrap();
        assert_eq!(json, r#"{"speaker":"user","text":"x"}"#);
    }
}
