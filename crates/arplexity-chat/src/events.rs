//! Conversation event types

use arplexity_wire::{Message, MessageId};
use serde::Serialize;

use crate::session::SessionState;

/// Events emitted while a conversation changes
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConversationEvent {
    /// A message was added to the end of the conversation
    MessageAppended { message: Message },

    /// An existing message changed (content, status or search progress)
    MessageUpdated { message: Message },

    /// The server issued a new continuation token
    CheckpointUpdated { checkpoint: String },

    /// A session reached a terminal state
    SessionEnded {
        message_id: MessageId,
        state: SessionState,
    },
}

impl ConversationEvent {
    /// Check if this is a terminal event
    pub fn is_terminal(&self) -> bool {
        matches!(self, ConversationEvent::SessionEnded { .. })
    }
}
