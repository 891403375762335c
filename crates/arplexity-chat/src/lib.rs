//! arplexity-chat: streaming conversation engine
//!
//! This crate turns the frames of a streamed reply into a consistent view of
//! the conversation: an ordered message store, search progress for the reply,
//! and one session per user turn.

pub mod controller;
pub mod error;
pub mod events;
pub mod search;
pub mod session;
pub mod store;
pub mod transport;

pub use controller::ConversationController;
pub use error::{Error, Result, StoreError};
pub use events::ConversationEvent;
pub use search::SearchProgressTracker;
pub use session::{SessionState, StreamSession, TRANSPORT_ERROR_MESSAGE};
pub use store::MessageStore;
pub use transport::{SseTransport, Transport};
