//! Transport abstraction for opening chat streams

use arplexity_wire::{FrameStream, Result, SseClient, TurnRequest};
use async_trait::async_trait;

/// Opens the frame stream for one turn
#[async_trait]
pub trait Transport: Send + Sync {
    /// Issue the request and return the raw frame payloads in delivery order.
    ///
    /// Dropping the returned stream must release the connection.
    async fn open(&self, request: &TurnRequest) -> Result<FrameStream>;
}

/// Server-sent events transport
pub struct SseTransport {
    client: SseClient,
}

impl SseTransport {
    pub fn new(client: SseClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &SseClient {
        &self.client
    }
}

#[async_trait]
impl Transport for SseTransport {
    async fn open(&self, request: &TurnRequest) -> Result<FrameStream> {
        self.client.stream(request)
    }
}
