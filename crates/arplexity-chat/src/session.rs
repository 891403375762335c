//! One streamed reply: the per-turn state machine.
//!
//! A [`StreamSession`] is bound to a single assistant message for its whole
//! life. Frames are dispatched one at a time in arrival order; each one may
//! grow the message content, advance search progress, or end the session.

use std::fmt::Display;

use arplexity_wire::{
    MessageId, MessagePatch, MessageStatus, StreamEvent, TurnRequest, decode,
};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::{error::StoreError, search::SearchProgressTracker, store::MessageStore};

/// Text written into the reply when the connection fails
pub const TRANSPORT_ERROR_MESSAGE: &str = "Sorry, there was an error processing your request.";

/// Session lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Created, request not issued yet
    Idle,
    /// Request issued, no frame yet
    Open,
    /// At least one frame handled
    Receiving,
    /// Ended by an `end` frame or superseded by a newer turn
    Closed,
    /// Ended by a transport failure
    Errored,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Closed | SessionState::Errored)
    }
}

/// What a dispatch changed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Applied {
    pub message_updated: bool,
    pub checkpoint_updated: bool,
}

impl Applied {
    fn message() -> Self {
        Self {
            message_updated: true,
            checkpoint_updated: false,
        }
    }
}

/// Conversation state a session is allowed to touch during dispatch
pub struct TurnContext<'a> {
    pub store: &'a mut MessageStore,
    pub checkpoint: &'a mut Option<String>,
}

/// Streaming state for one user turn
#[derive(Debug)]
pub struct StreamSession {
    message_id: MessageId,
    state: SessionState,
    content: String,
    search: SearchProgressTracker,
    malformed: usize,
    cancel: CancellationToken,
}

impl StreamSession {
    /// Create a session bound to an assistant message
    pub fn new(message_id: MessageId) -> Self {
        Self {
            message_id,
            state: SessionState::Idle,
            content: String::new(),
            search: SearchProgressTracker::new(),
            malformed: 0,
            cancel: CancellationToken::new(),
        }
    }

    pub fn message_id(&self) -> MessageId {
        self.message_id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Reply text accumulated so far
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Number of frames that could not be decoded
    pub fn malformed_frames(&self) -> usize {
        self.malformed
    }

    /// Token cancelled when the session terminates
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Issue the outbound request for this turn
    pub fn open(&mut self, text: &str, checkpoint: Option<String>) -> TurnRequest {
        if self.state == SessionState::Idle {
            self.state = SessionState::Open;
            tracing::debug!("Session for message {} opened", self.message_id);
        } else {
            tracing::warn!(
                "Session for message {} reopened in state {:?}",
                self.message_id,
                self.state
            );
        }
        TurnRequest::new(text, checkpoint)
    }

    /// Decode and dispatch one raw frame
    pub fn dispatch_raw(
        &mut self,
        raw: &str,
        ctx: &mut TurnContext<'_>,
    ) -> Result<Applied, StoreError> {
        self.dispatch(decode(raw), ctx)
    }

    /// Dispatch one decoded event
    pub fn dispatch(
        &mut self,
        event: StreamEvent,
        ctx: &mut TurnContext<'_>,
    ) -> Result<Applied, StoreError> {
        if self.state.is_terminal() {
            tracing::debug!(
                "Ignoring frame for message {} after session ended: {:?}",
                self.message_id,
                event
            );
            return Ok(Applied::default());
        }
        self.state = SessionState::Receiving;

        match event {
            StreamEvent::Checkpoint { token } => {
                let Some(token) = token.filter(|t| !t.is_empty()) else {
                    return Ok(Applied::default());
                };
                *ctx.checkpoint = Some(token);
                Ok(Applied {
                    message_updated: false,
                    checkpoint_updated: true,
                })
            }
            StreamEvent::Content { fragment } => {
                self.content.push_str(&fragment);
                ctx.store.update(
                    self.message_id,
                    MessagePatch::default()
                        .content(self.content.clone())
                        .status(MessageStatus::Streaming),
                )?;
                Ok(Applied::message())
            }
            StreamEvent::SearchStart { .. }
            | StreamEvent::SearchResults { .. }
            | StreamEvent::SearchError { .. } => {
                let mut patch = MessagePatch::default()
                    .content(self.content.clone())
                    .status(MessageStatus::Streaming);
                if let Some(info) = self.search.observe(&event) {
                    patch = patch.search_info(info.clone());
                }
                ctx.store.update(self.message_id, patch)?;
                Ok(Applied::message())
            }
            StreamEvent::End => {
                let mut patch = MessagePatch::default().status(MessageStatus::Complete);
                if let Some(info) = self.search.observe(&StreamEvent::End) {
                    patch = patch.search_info(info.clone());
                }
                self.terminate(SessionState::Closed);
                ctx.store.update(self.message_id, patch)?;
                Ok(Applied::message())
            }
            StreamEvent::Malformed { reason, raw } => {
                self.malformed += 1;
                tracing::warn!(
                    "Error parsing event data for message {}: {} ({})",
                    self.message_id,
                    reason,
                    raw
                );
                Ok(Applied::default())
            }
        }
    }

    /// Handle a transport failure: replace the reply with the fallback text
    pub fn fail(
        &mut self,
        error: &dyn Display,
        store: &mut MessageStore,
    ) -> Result<Applied, StoreError> {
        if self.state.is_terminal() {
            tracing::debug!(
                "Ignoring transport error for message {} after session ended: {}",
                self.message_id,
                error
            );
            return Ok(Applied::default());
        }
        tracing::warn!("Chat stream error for message {}: {}", self.message_id, error);

        self.terminate(SessionState::Errored);
        store.update(
            self.message_id,
            MessagePatch::default()
                .content(TRANSPORT_ERROR_MESSAGE)
                .status(MessageStatus::Errored),
        )?;
        Ok(Applied::message())
    }

    /// End the session because a newer turn replaced it.
    ///
    /// The reply keeps whatever arrived so far and is marked complete.
    pub fn supersede(&mut self, store: &mut MessageStore) -> Result<Applied, StoreError> {
        if self.state.is_terminal() {
            return Ok(Applied::default());
        }
        tracing::debug!("Session for message {} superseded", self.message_id);

        let mut patch = MessagePatch::default().status(MessageStatus::Complete);
        if let Some(info) = self.search.observe(&StreamEvent::End) {
            patch = patch.search_info(info.clone());
        }
        self.terminate(SessionState::Closed);
        store.update(self.message_id, patch)?;
        Ok(Applied::message())
    }

    fn terminate(&mut self, state: SessionState) {
        self.state = state;
        self.cancel.cancel();
        tracing::debug!("Session for message {} -> {:?}", self.message_id, state);
    }
}
