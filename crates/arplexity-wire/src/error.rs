//! Error types for arplexity-wire

use thiserror::Error;

/// Result type alias using arplexity-wire Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while talking to the chat stream endpoint
#[derive(Error, Debug)]
pub enum Error {
    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Server-sent events error
    #[error("SSE error: {0}")]
    Sse(String),

    /// The server closed the stream before sending an `end` frame
    #[error("Stream ended before the end frame")]
    StreamEnded,

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// Check if this error was raised by the connection rather than by local setup
    pub fn is_transport(&self) -> bool {
        matches!(self, Error::Http(_) | Error::Sse(_) | Error::StreamEnded)
    }
}
