//! Conversation domain types.
//!
//! A [`ConversationState`] is an ordered list of [`Turn`]s. It is passed into
//! an orchestration run and handed back when the run ends; nothing else holds
//! a reference to it while the run is in flight.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::action::ActionRecord;

/// Unique identifier for a conversation (session).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationId(pub String);

impl ConversationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Default for ConversationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The role of a message sender in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The end user (and injected action results)
    User,
    /// The model
    Assistant,
    /// System preamble; never stored as a turn
    System,
}

/// A `{role, text}` pair as submitted to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    /// Create a new user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// Create a new assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    /// Create a new system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }
}

/// What produced a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnKind {
    /// Typed by a person or generated by the model
    #[default]
    Message,
    /// User-role turn carrying formatted action results
    ToolResults,
}

/// One entry of the conversation history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub id: String,
    pub role: Role,
    pub text: String,
    pub timestamp: DateTime<Utc>,

    /// Actions requested by this (assistant) turn, in request order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<ActionRecord>,

    #[serde(default)]
    pub kind: TurnKind,
}

impl Turn {
    fn new(role: Role, text: impl Into<String>, kind: TurnKind) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            text: text.into(),
            timestamp: Utc::now(),
            actions: Vec::new(),
            kind,
        }
    }

    /// A turn typed by the user.
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, text, TurnKind::Message)
    }

    /// An assistant turn; usually created empty and filled while streaming.
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, text, TurnKind::Message)
    }

    /// The user-role turn that feeds action results back to the model.
    pub fn tool_results(text: impl Into<String>) -> Self {
        Self::new(Role::User, text, TurnKind::ToolResults)
    }

    pub fn to_message(&self) -> Message {
        Message {
            role: self.role,
            content: self.text.clone(),
        }
    }
}

/// An ordered, append-only sequence of turns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationState {
    pub id: ConversationId,
    pub turns: Vec<Turn>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ConversationState {
    /// Create a new empty conversation.
    pub fn new() -> Self {
        Self::with_id(ConversationId::new())
    }

    pub fn with_id(id: ConversationId) -> Self {
        let now = Utc::now();
        Self {
            id,
            turns: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Append a turn and return its id.
    pub fn push(&mut self, turn: Turn) -> String {
        self.updated_at = Utc::now();
        let id = turn.id.clone();
        self.turns.push(turn);
        id
    }

    pub fn turn(&self, id: &str) -> Option<&Turn> {
        self.turns.iter().find(|t| t.id == id)
    }

    pub fn turn_mut(&mut self, id: &str) -> Option<&mut Turn> {
        self.updated_at = Utc::now();
        self.turns.iter_mut().find(|t| t.id == id)
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    /// Every turn mapped to a role+text pair, in order.
    pub fn history(&self) -> Vec<Message> {
        self.turns.iter().map(Turn::to_message).collect()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}

impl Default for ConversationState {
    fn default() -> Self {
        Self::new()
    }
}
