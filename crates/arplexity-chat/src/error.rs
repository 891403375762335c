//! Error types for arplexity-chat

use arplexity_wire::MessageId;
use thiserror::Error;

/// Result type alias using arplexity-chat Error
pub type Result<T> = std::result::Result<T, Error>;

/// Message store failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Message {0} already exists")]
    DuplicateId(MessageId),

    #[error("Message {0} not found")]
    NotFound(MessageId),
}

/// Errors that can occur while running a conversation
#[derive(Error, Debug)]
pub enum Error {
    /// An error from the wire layer
    #[error(transparent)]
    Wire(#[from] arplexity_wire::Error),

    /// The message store rejected an operation
    #[error(transparent)]
    Store(#[from] StoreError),
}
