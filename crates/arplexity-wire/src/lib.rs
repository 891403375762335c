//! arplexity-wire: message model and chat stream protocol
//!
//! This crate holds the conversation data types, the frame decoder for the
//! chat stream and an SSE client for the streaming endpoint.

pub mod client;
pub mod error;
pub mod stream;
pub mod types;

pub use client::SseClient;
pub use error::{Error, Result};
pub use stream::{FrameStream, StreamEvent, decode};
pub use types::*;
