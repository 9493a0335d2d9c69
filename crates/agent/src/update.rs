//! Conversation updates for whoever renders the conversation.
//!
//! The orchestrator never touches UI state; it reports every transition as a
//! [`ConversationUpdate`] to a [`ConversationObserver`]. The gateway forwards
//! these verbatim as SSE events.

use clinicdesk_core::action::{ActionStatus, ToolResult};
use clinicdesk_core::message::Role;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Orchestration state machine phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    Streaming,
    BlockDetected,
    Executing,
    Resubmitting,
    Done,
    Aborted,
}

impl Phase {
    pub fn is_final(self) -> bool {
        matches!(self, Phase::Done | Phase::Aborted)
    }
}

/// Why a run stopped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum Termination {
    /// The model finished without requesting anything further.
    Done,
    /// The iteration ceiling was reached.
    Exhausted,
    /// A transport failure ended the run.
    Failed { message: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConversationUpdate {
    PhaseChanged { phase: Phase, iteration: u32 },

    TurnStarted { turn_id: String, role: Role },

    /// Full text of the turn so far.
    TurnText {
        turn_id: String,
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pending_action: Option<String>,
    },

    ActionStatus {
        turn_id: String,
        action_id: String,
        name: String,
        status: ActionStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<ToolResult>,
    },

    TurnCompleted { turn_id: String },

    Finished {
        termination: Termination,
        iterations: u32,
        actions_executed: usize,
    },
}

impl ConversationUpdate {
    /// SSE event name for this update.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::PhaseChanged { .. } => "phase_changed",
            Self::TurnStarted { .. } => "turn_started",
            Self::TurnText { .. } => "turn_text",
            Self::ActionStatus { .. } => "action_status",
            Self::TurnCompleted { .. } => "turn_completed",
            Self::Finished { .. } => "finished",
        }
    }
}

/// Receives updates synchronously, in the order they happen.
pub trait ConversationObserver: Send + Sync {
    fn on_update(&self, update: &ConversationUpdate);
}

pub struct NoopObserver;

impl ConversationObserver for NoopObserver {
    fn on_update(&self, _update: &ConversationUpdate) {}
}

/// Forwards updates into an unbounded channel. A dropped receiver is ignored.
pub struct ChannelObserver {
    tx: mpsc::UnboundedSender<ConversationUpdate>,
}

impl ChannelObserver {
    pub fn new(tx: mpsc::UnboundedSender<ConversationUpdate>) -> Self {
        Self { tx }
    }

    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ConversationUpdate>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }
}

impl ConversationObserver for ChannelObserver {
    fn on_update(&self, update: &ConversationUpdate) {
        let _ = self.tx.send(update.clone());
    }
}
