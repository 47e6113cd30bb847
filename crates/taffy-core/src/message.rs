//! Chat transcript types.
//!
//! The sender set is closed: every consumer matches on [`Sender`]
//! exhaustively, so a new sender kind is a compile error everywhere it
//! matters rather than a silent fallthrough.

use serde::{Deserialize, Serialize};

/// Who wrote a transcript message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sender {
    /// The person typing.
    User,
    /// Taffy's replies.
    Assistant,
    /// Status and error notices.
    System,
}

impl Sender {
    /// Label shown before a message, if any. System notices are unlabeled.
    pub fn label(self) -> Option<&'static str> {
        match self {
            Self::User => Some("You"),
            Self::Assistant => Some("Taffy"),
            Self::System => None,
        }
    }

    /// The role this sender takes in the reply generator's history.
    pub fn role(self) -> Role {
        match self {
            Self::User => Role::User,
            Self::Assistant | Self::System => Role::Model,
        }
    }
}

/// A single transcript entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: u64,
    pub sender: Sender,
    pub text: String,
}

impl ChatMessage {
    /// Renders the message for a terminal.
    pub fn render(&self) -> String {
        match self.sender.label() {
            Some(label) => format!("{}: {}", label, self.text),
            None => format!("[{}]", self.text),
        }
    }
}

/// Role of a history turn for the reply generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

/// One prior turn handed to the reply generator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub text: String,
}

/// Ordered conversation history with monotonically increasing ids.
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    messages: Vec<ChatMessage>,
    next_id: u64,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a message and returns it.
    pub fn push(&mut self, sender: Sender, text: impl Into<String>) -> &ChatMessage {
        self.next_id += 1;
        self.messages.push(ChatMessage {
            id: self.next_id,
            sender,
            text: text.into(),
        });
        &self.messages[self.messages.len() - 1]
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// True if any message from `sender` satisfies `pred`.
    pub fn any_from(&self, sender: Sender, pred: impl Fn(&str) -> bool) -> bool {
        self.messages
            .iter()
            .any(|m| m.sender == sender && pred(&m.text))
    }

    /// History for the reply generator.
    ///
    /// Empty unless at least one user turn exists: the generator expects the
    /// conversation to open with the user, and a lone greeting is not worth
    /// sending.
    pub fn history(&self) -> Vec<Turn> {
        let turns: Vec<Turn> = self
            .messages
            .iter()
            .map(|m| Turn {
                role: m.sender.role(),
                text: m.text.clone(),
            })
            .collect();

        if turns.iter().any(|t| t.role == Role::User) {
            turns
        } else {
            Vec::new()
        }
    }
}
