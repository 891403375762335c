//! Server-sent events client for the chat stream endpoint

use std::time::Duration;

use async_stream::stream;
use futures::StreamExt;
use reqwest_eventsource::{Event, EventSource};

use crate::{
    error::{Error, Result},
    stream::FrameStream,
    types::TurnRequest,
};

/// Default server address
pub const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:8000";

/// Chat stream client
#[derive(Debug, Clone)]
pub struct SseClient {
    client: reqwest::Client,
    base_url: String,
}

impl SseClient {
    /// Create a client for a server base URL
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    /// Create a client with a connect timeout
    pub fn with_connect_timeout(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().connect_timeout(timeout).build()?;
        Self::with_client(client, base_url)
    }

    /// Create a client around an existing reqwest client
    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Result<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(Error::InvalidConfig("server url is empty".to_string()));
        }
        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Full URL for a turn
    pub fn url_for(&self, request: &TurnRequest) -> String {
        format!("{}{}", self.base_url, request.path_and_query())
    }

    /// Open the stream for one turn.
    ///
    /// Yields raw `data` payloads. The stream finishes after an error item,
    /// and dropping it closes the connection.
    pub fn stream(&self, request: &TurnRequest) -> Result<FrameStream> {
        let url = self.url_for(request);
        tracing::debug!("Opening chat stream: {}", url);

        let event_source = EventSource::new(self.client.get(&url))
            .map_err(|e| Error::Sse(format!("Failed to create event source: {}", e)))?;

        Ok(Box::pin(create_stream(event_source)))
    }
}

fn create_stream(mut event_source: EventSource) -> impl futures::Stream<Item = Result<String>> {
    stream! {
        while let Some(event) = event_source.next().await {
            match event {
                Ok(Event::Open) => {}
                Ok(Event::Message(msg)) => {
                    yield Ok(msg.data);
                }
                Err(reqwest_eventsource::Error::StreamEnded) => {
                    event_source.close();
                    yield Err(Error::StreamEnded);
                    return;
                }
                Err(e) => {
                    // Stop the built-in reconnect before reporting
                    event_source.close();
                    yield Err(Error::Sse(e.to_string()));
                    return;
                }
            }
        }
    }
}
