//! Core types for the conversation view

use serde::{Deserialize, Serialize};

/// Fallback shown when a search error frame carries no text
pub const SEARCH_ERROR_FALLBACK: &str = "An error occurred during search.";

/// Message identifier, unique and strictly increasing within a conversation
pub type MessageId = u64;

/// Who wrote a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Author {
    User,
    Assistant,
}

/// Lifecycle of a message as seen by the renderer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    /// Assistant placeholder, nothing received yet
    Pending,
    /// Content or search progress is arriving
    Streaming,
    /// Finished normally
    #[default]
    Complete,
    /// The turn failed at the transport level
    Errored,
}

impl MessageStatus {
    /// Whether the renderer should show a loading indicator
    pub fn is_loading(&self) -> bool {
        matches!(self, MessageStatus::Pending)
    }
}

/// A step of the search-augmented answer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Searching,
    Reading,
    Writing,
    Error,
}

impl Stage {
    /// Get a human-readable label for this stage
    pub fn label(&self) -> &'static str {
        match self {
            Stage::Searching => "Searching the web",
            Stage::Reading => "Reading sources",
            Stage::Writing => "Writing answer",
            Stage::Error => "Search error",
        }
    }
}

/// Progress record for one search-augmented turn
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchInfo {
    /// Stages in arrival order, never duplicated
    pub stages: Vec<Stage>,
    /// Search query, empty until a search starts
    pub query: String,
    /// Source URLs gathered from the results
    pub sources: Vec<String>,
    /// Error text, only set alongside the error stage
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SearchInfo {
    /// Check whether a stage has been reached
    pub fn has_stage(&self, stage: Stage) -> bool {
        self.stages.contains(&stage)
    }

    /// Append a stage unless it is already present.
    ///
    /// Returns `true` if the stage was added.
    pub fn push_stage(&mut self, stage: Stage) -> bool {
        if self.has_stage(stage) {
            return false;
        }
        self.stages.push(stage);
        true
    }

    /// The most recent stage, if any
    pub fn current_stage(&self) -> Option<Stage> {
        self.stages.last().copied()
    }

    /// Error text for display, falling back to a generic message
    pub fn error_message(&self) -> Option<&str> {
        if !self.has_stage(Stage::Error) {
            return None;
        }
        Some(
            self.error
                .as_deref()
                .filter(|e| !e.is_empty())
                .unwrap_or(SEARCH_ERROR_FALLBACK),
        )
    }
}

/// One unit of conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub author: Author,
    pub content: String,
    pub status: MessageStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_info: Option<SearchInfo>,
    /// Creation time in unix milliseconds
    #[serde(default)]
    pub created_at: i64,
}

impl Message {
    /// Create a finished user message
    pub fn user(id: MessageId, content: impl Into<String>) -> Self {
        Self {
            id,
            author: Author::User,
            content: content.into(),
            status: MessageStatus::Complete,
            search_info: None,
            created_at: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Create a finished assistant message
    pub fn assistant(id: MessageId, content: impl Into<String>) -> Self {
        Self {
            id,
            author: Author::Assistant,
            content: content.into(),
            status: MessageStatus::Complete,
            search_info: None,
            created_at: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Create an empty assistant message waiting for its stream
    pub fn placeholder(id: MessageId) -> Self {
        Self {
            status: MessageStatus::Pending,
            ..Self::assistant(id, String::new())
        }
    }

    pub fn is_user(&self) -> bool {
        self.author == Author::User
    }
}

/// Partial update for a message; `None` fields are left untouched
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessagePatch {
    pub content: Option<String>,
    pub status: Option<MessageStatus>,
    pub search_info: Option<SearchInfo>,
}

impl MessagePatch {
    pub fn content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn status(mut self, status: MessageStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn search_info(mut self, search_info: SearchInfo) -> Self {
        self.search_info = Some(search_info);
        self
    }

    /// Apply the supplied fields to a message
    pub fn apply_to(self, message: &mut Message) {
        if let Some(content) = self.content {
            message.content = content;
        }
        if let Some(status) = self.status {
            message.status = status;
        }
        if let Some(search_info) = self.search_info {
            message.search_info = Some(search_info);
        }
    }
}

/// The outbound request for one user turn
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnRequest {
    /// Raw user text, encoded into the request path
    pub text: String,
    /// Continuation token from the previous turn, if any
    pub checkpoint: Option<String>,
}

impl TurnRequest {
    pub fn new(text: impl Into<String>, checkpoint: Option<String>) -> Self {
        Self {
            text: text.into(),
            checkpoint,
        }
    }

    /// Path and query for this turn, percent-encoded
    pub fn path_and_query(&self) -> String {
        let mut path = format!("/chat_stream/{}", urlencoding::encode(&self.text));
        if let Some(checkpoint) = self.checkpoint.as_deref().filter(|c| !c.is_empty()) {
            path.push_str("?checkpoint_id=");
            path.push_str(&urlencoding::encode(checkpoint));
        }
        path
    }
}
