//! Stream frame types and decoding

use serde::Deserialize;
use serde_json::Value;
use std::pin::Pin;
use tokio_stream::Stream;

use crate::error::Result;

/// Events carried by the chat stream, one per frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// Continuation token for the next turn
    Checkpoint { token: Option<String> },
    /// Reply text fragment
    Content { fragment: String },
    /// A web search started
    SearchStart { query: String },
    /// Search results arrived
    SearchResults { urls: Vec<String> },
    /// The search failed
    SearchError { message: Option<String> },
    /// No further frames for this turn
    End,
    /// The frame could not be understood
    Malformed { reason: String, raw: String },
}

impl StreamEvent {
    /// Check if this is the terminal event
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::End)
    }
}

/// A stream of raw frame payloads
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireFrame {
    Checkpoint {
        #[serde(default)]
        checkpoint_id: Option<String>,
    },
    Content {
        content: String,
    },
    SearchStart {
        #[serde(default)]
        query: String,
    },
    SearchResults {
        #[serde(default)]
        urls: Value,
    },
    SearchError {
        #[serde(default)]
        error: Option<String>,
    },
    End,
}

/// Decode one frame payload.
///
/// Never fails: anything that is not a known frame becomes `Malformed`.
pub fn decode(raw: &str) -> StreamEvent {
    let frame: WireFrame = match serde_json::from_str(raw) {
        Ok(frame) => frame,
        Err(e) => {
            return StreamEvent::Malformed {
                reason: e.to_string(),
                raw: raw.to_string(),
            };
        }
    };

    match frame {
        WireFrame::Checkpoint { checkpoint_id } => StreamEvent::Checkpoint {
            token: checkpoint_id,
        },
        WireFrame::Content { content } if content.is_empty() => StreamEvent::Malformed {
            reason: "empty content fragment".to_string(),
            raw: raw.to_string(),
        },
        WireFrame::Content { content } => StreamEvent::Content { fragment: content },
        WireFrame::SearchStart { query } => StreamEvent::SearchStart { query },
        WireFrame::SearchResults { urls } => StreamEvent::SearchResults {
            urls: normalize_urls(urls),
        },
        WireFrame::SearchError { error } => StreamEvent::SearchError { message: error },
        WireFrame::End => StreamEvent::End,
    }
}

/// Normalize the `urls` field of a search results frame.
///
/// Accepts a list, a string holding a JSON list, or a bare string.
pub fn normalize_urls(urls: Value) -> Vec<String> {
    match urls {
        Value::Array(items) => items.into_iter().map(url_item).collect(),
        Value::String(raw) => match serde_json::from_str::<Value>(&raw) {
            Ok(Value::Array(items)) => items.into_iter().map(url_item).collect(),
            _ => vec![raw],
        },
        _ => Vec::new(),
    }
}

fn url_item(item: Value) -> String {
    match item {
        Value::String(s) => s,
        other => other.to_string(),
    }
}
