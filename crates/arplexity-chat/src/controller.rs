//! Conversation orchestration: ids, sessions and the continuation token.

use std::fmt::Display;

use arplexity_wire::{Message, MessageId, TurnRequest};
use futures::StreamExt;
use tokio::sync::broadcast;

use crate::{
    error::Result,
    events::ConversationEvent,
    session::{Applied, SessionState, StreamSession, TurnContext},
    store::MessageStore,
    transport::Transport,
};

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Owns the visible conversation and starts one session per user turn.
///
/// At most one session is live. Submitting while a reply is still streaming
/// supersedes the older session: its message keeps what it received and is
/// marked complete, and any later frames for it are dropped.
pub struct ConversationController {
    store: MessageStore,
    checkpoint: Option<String>,
    next_id: MessageId,
    input: String,
    active: Option<StreamSession>,
    events: broadcast::Sender<ConversationEvent>,
}

impl Default for ConversationController {
    fn default() -> Self {
        Self::new()
    }
}

impl ConversationController {
    /// Start an empty conversation
    pub fn new() -> Self {
        Self::with_store(MessageStore::new())
    }

    /// Start from existing messages; new ids continue after the highest one
    pub fn with_history(messages: impl IntoIterator<Item = Message>) -> Result<Self> {
        Ok(Self::with_store(MessageStore::from_messages(messages)?))
    }

    fn with_store(store: MessageStore) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            next_id: store.max_id().map_or(1, |id| id + 1),
            store,
            checkpoint: None,
            input: String::new(),
            active: None,
            events,
        }
    }

    /// Subscribe to conversation changes
    pub fn subscribe(&self) -> broadcast::Receiver<ConversationEvent> {
        self.events.subscribe()
    }

    /// All messages in display order
    pub fn snapshot(&self) -> Vec<Message> {
        self.store.snapshot()
    }

    pub fn store(&self) -> &MessageStore {
        &self.store
    }

    /// Continuation token to send with the next turn
    pub fn checkpoint(&self) -> Option<&str> {
        self.checkpoint.as_deref()
    }

    pub fn set_checkpoint(&mut self, checkpoint: Option<String>) {
        self.checkpoint = checkpoint;
    }

    /// Current input buffer
    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn set_input(&mut self, input: impl Into<String>) {
        self.input = input.into();
    }

    /// Submit whatever is in the input buffer
    pub fn submit_input(&mut self) -> Result<Option<TurnRequest>> {
        let text = self.input.clone();
        self.submit(&text)
    }

    /// State of the most recent session, if any
    pub fn active_state(&self) -> Option<SessionState> {
        self.active.as_ref().map(|s| s.state())
    }

    /// Message the most recent session writes into
    pub fn active_message_id(&self) -> Option<MessageId> {
        self.active.as_ref().map(|s| s.message_id())
    }

    /// Start a new turn.
    ///
    /// Blank input does nothing and returns `None`. Otherwise appends the
    /// user message and a pending reply, clears the input buffer and returns
    /// the request the transport should open.
    pub fn submit(&mut self, text: &str) -> Result<Option<TurnRequest>> {
        if text.trim().is_empty() {
            return Ok(None);
        }

        if let Some(mut previous) = self.active.take() {
            let was_terminal = previous.state().is_terminal();
            let applied = previous.supersede(&mut self.store)?;
            self.publish(&previous, applied, was_terminal);
        }

        let user_id = self.allocate_id();
        let reply_id = self.allocate_id();
        self.append(Message::user(user_id, text))?;
        self.append(Message::placeholder(reply_id))?;
        self.input.clear();

        let mut session = StreamSession::new(reply_id);
        let request = session.open(text, self.checkpoint.clone());
        self.active = Some(session);
        tracing::debug!("Turn started: user message {}, reply {}", user_id, reply_id);

        Ok(Some(request))
    }

    /// Feed one raw frame to the live session
    pub fn handle_frame(&mut self, raw: &str) -> Result<Option<SessionState>> {
        let Some(session) = self.active.as_mut() else {
            tracing::debug!("Dropping frame with no active session: {}", raw);
            return Ok(None);
        };

        let was_terminal = session.state().is_terminal();
        let mut ctx = TurnContext {
            store: &mut self.store,
            checkpoint: &mut self.checkpoint,
        };
        let applied = session.dispatch_raw(raw, &mut ctx)?;

        let Some(session) = self.active.as_ref() else {
            return Ok(None);
        };
        self.publish(session, applied, was_terminal);
        Ok(Some(session.state()))
    }

    /// Report a transport failure to the live session
    pub fn handle_transport_error(&mut self, error: &dyn Display) -> Result<Option<SessionState>> {
        let Some(session) = self.active.as_mut() else {
            return Ok(None);
        };

        let was_terminal = session.state().is_terminal();
        let applied = session.fail(error, &mut self.store)?;

        let Some(session) = self.active.as_ref() else {
            return Ok(None);
        };
        self.publish(session, applied, was_terminal);
        Ok(Some(session.state()))
    }

    /// Run one full turn against a transport.
    ///
    /// Returns the final session state, or `None` for blank input. The
    /// frame stream is dropped as soon as the session terminates.
    pub async fn send(
        &mut self,
        transport: &dyn Transport,
        text: &str,
    ) -> Result<Option<SessionState>> {
        let Some(request) = self.submit(text)? else {
            return Ok(None);
        };
        let Some(cancel) = self.active.as_ref().map(|s| s.cancel_token()) else {
            return Ok(None);
        };

        let mut frames = match transport.open(&request).await {
            Ok(frames) => frames,
            Err(e) => return self.handle_transport_error(&e),
        };

        loop {
            let item = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                item = frames.next() => item,
            };

            match item {
                Some(Ok(raw)) => {
                    self.handle_frame(&raw)?;
                }
                Some(Err(e)) => {
                    self.handle_transport_error(&e)?;
                    break;
                }
                None => {
                    self.handle_transport_error(&arplexity_wire::Error::StreamEnded)?;
                    break;
                }
            }
        }
        drop(frames);

        Ok(self.active_state())
    }

    fn allocate_id(&mut self) -> MessageId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn append(&mut self, message: Message) -> Result<()> {
        self.store.append(message.clone())?;
        let _ = self
            .events
            .send(ConversationEvent::MessageAppended { message });
        Ok(())
    }

    fn publish(&self, session: &StreamSession, applied: Applied, was_terminal: bool) {
        if applied.checkpoint_updated {
            if let Some(ref checkpoint) = self.checkpoint {
                let _ = self.events.send(ConversationEvent::CheckpointUpdated {
                    checkpoint: checkpoint.clone(),
                });
            }
        }
        if applied.message_updated {
            if let Some(message) = self.store.get(session.message_id()) {
                let _ = self.events.send(ConversationEvent::MessageUpdated {
                    message: message.clone(),
                });
            }
        }
        if !was_terminal && session.state().is_terminal() {
            let _ = self.events.send(ConversationEvent::SessionEnded {
                message_id: session.message_id(),
                state: session.state(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::TRANSPORT_ERROR_MESSAGE;
    use arplexity_wire::{Author, FrameStream, MessageStatus, Stage};
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Replays scripted frames; `Err` entries become transport failures
    struct MockTransport {
        scripts: Mutex<Vec<Vec<std::result::Result<String, String>>>>,
        requests: Mutex<Vec<TurnRequest>>,
        fail_open: bool,
    }

    impl MockTransport {
        fn new(scripts: Vec<Vec<std::result::Result<String, String>>>) -> Self {
            Self {
                scripts: Mutex::new(scripts),
                requests: Mutex::new(Vec::new()),
                fail_open: false,
            }
        }

        fn failing_open() -> Self {
            Self {
                fail_open: true,
                ..Self::new(Vec::new())
            }
        }

        fn requests(&self) -> Vec<TurnRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn open(&self, request: &TurnRequest) -> arplexity_wire::Result<FrameStream> {
            self.requests.lock().unwrap().push(request.clone());
            if self.fail_open {
                return Err(arplexity_wire::Error::Sse("connection refused".into()));
            }

            let script = {
                let mut scripts = self.scripts.lock().unwrap();
                if scripts.is_empty() {
                    Vec::new()
                } else {
                    scripts.remove(0)
                }
            };

            let stream: FrameStream = Box::pin(async_stream::stream! {
                for item in script {
                    match item {
                        Ok(raw) => {
                            yield Ok(raw);
                        }
                        Err(e) => {
                            yield Err(arplexity_wire::Error::Sse(e));
                        }
                    }
                }
            });
            Ok(stream)
        }
    }

    fn frame(raw: &str) -> std::result::Result<String, String> {
        Ok(raw.to_string())
    }

    fn greeting() -> Vec<Message> {
        vec![
            Message::assistant(1, "Hi there, how can I help you?"),
            Message::user(2, "Hello! I have a question."),
            Message::assistant(3, "Sure, go ahead!"),
        ]
    }

    #[test]
    fn test_submit_appends_two_messages() {
        let mut controller = ConversationController::with_history(greeting()).unwrap();
        let request = controller.submit("What is Rust?").unwrap().unwrap();
        assert_eq!(request.text, "What is Rust?");
        assert_eq!(request.checkpoint, None);

        let messages = controller.snapshot();
        assert_eq!(messages.len(), 5);
        assert_eq!(messages[3].id, 4);
        assert_eq!(messages[3].author, Author::User);
        assert_eq!(messages[3].content, "What is Rust?");
        assert_eq!(messages[4].id, 5);
        assert_eq!(messages[4].author, Author::Assistant);
        assert_eq!(messages[4].status, MessageStatus::Pending);
        assert!(messages[4].search_info.is_none());

        assert_eq!(controller.active_message_id(), Some(5));
        assert_eq!(controller.active_state(), Some(SessionState::Open));
    }

    #[test]
    fn test_ids_keep_increasing() {
        let mut controller = ConversationController::new();
        controller.submit("one").unwrap();
        controller.submit("two").unwrap();
        let ids: Vec<_> = controller.snapshot().iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_blank_input_is_ignored() {
        let mut controller = ConversationController::new();
        assert!(controller.submit("").unwrap().is_none());
        assert!(controller.submit("   \n\t").unwrap().is_none());
        assert!(controller.snapshot().is_empty());
        assert!(controller.active_state().is_none());
    }

    #[test]
    fn test_submit_input_clears_buffer() {
        let mut controller = ConversationController::new();
        controller.set_input("hello");
        let request = controller.submit_input().unwrap().unwrap();
        assert_eq!(request.text, "hello");
        assert_eq!(controller.input(), "");

        controller.set_input("  ");
        assert!(controller.submit_input().unwrap().is_none());
        assert_eq!(controller.input(), "  ");
    }

    #[test]
    fn test_new_submit_supersedes_streaming_reply() {
        let mut controller = ConversationController::new();
        controller.submit("first").unwrap();
        controller
            .handle_frame(r#"{"type":"content","content":"Partial"}"#)
            .unwrap();

        controller.submit("second").unwrap();
        let messages = controller.snapshot();
        assert_eq!(messages[1].content, "Partial");
        assert_eq!(messages[1].status, MessageStatus::Complete);
        assert_eq!(controller.active_message_id(), Some(4));

        // frames now go to the new reply only
        controller
            .handle_frame(r#"{"type":"content","content":"Fresh"}"#)
            .unwrap();
        let messages = controller.snapshot();
        assert_eq!(messages[1].content, "Partial");
        assert_eq!(messages[3].content, "Fresh");
    }

    #[test]
    fn test_frame_without_session() {
        let mut controller = ConversationController::new();
        let state = controller
            .handle_frame(r#"{"type":"content","content":"x"}"#)
            .unwrap();
        assert!(state.is_none());
        assert!(controller.snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_send_weather_turn() {
        let transport = MockTransport::new(vec![vec![
            frame(r#"{"type":"checkpoint","checkpoint_id":"cp-1"}"#),
            frame(r#"{"type":"search_start","query":"weather today"}"#),
            frame(r#"{"type":"search_results","urls":["https://a","https://b"]}"#),
            frame(r#"{"type":"content","content":"It's sunny"}"#),
            frame(r#"{"type":"end"}"#),
        ]]);
        let mut controller = ConversationController::new();

        let state = controller.send(&transport, "weather today").await.unwrap();
        assert_eq!(state, Some(SessionState::Closed));

        let reply = &controller.snapshot()[1];
        assert_eq!(reply.content, "It's sunny");
        assert_eq!(reply.status, MessageStatus::Complete);
        let info = reply.search_info.as_ref().unwrap();
        assert_eq!(
            info.stages,
            vec![Stage::Searching, Stage::Reading, Stage::Writing]
        );
        assert_eq!(info.query, "weather today");
        assert_eq!(info.sources, vec!["https://a", "https://b"]);
        assert_eq!(controller.checkpoint(), Some("cp-1"));
    }

    #[tokio::test]
    async fn test_checkpoint_forwarded_next_turn() {
        let transport = MockTransport::new(vec![
            vec![
                frame(r#"{"type":"checkpoint","checkpoint_id":"thread-9"}"#),
                frame(r#"{"type":"content","content":"Hi"}"#),
                frame(r#"{"type":"end"}"#),
            ],
            vec![
                frame(r#"{"type":"content","content":"Again"}"#),
                frame(r#"{"type":"end"}"#),
            ],
        ]);
        let mut controller = ConversationController::new();

        controller.send(&transport, "hello").await.unwrap();
        controller.send(&transport, "and again").await.unwrap();

        let requests = transport.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].checkpoint, None);
        assert_eq!(requests[1].checkpoint.as_deref(), Some("thread-9"));
        assert_eq!(requests[1].text, "and again");
    }

    #[tokio::test]
    async fn test_empty_checkpoint_is_not_forwarded() {
        let transport = MockTransport::new(vec![
            vec![
                frame(r#"{"type":"checkpoint","checkpoint_id":""}"#),
                frame(r#"{"type":"end"}"#),
            ],
            vec![frame(r#"{"type":"end"}"#)],
        ]);
        let mut controller = ConversationController::new();

        controller.send(&transport, "hi").await.unwrap();
        assert_eq!(controller.checkpoint(), None);
        controller.send(&transport, "again").await.unwrap();

        let requests = transport.requests();
        assert_eq!(requests[1].checkpoint, None);
        assert_eq!(requests[1].path_and_query(), "/chat_stream/again");
    }

    #[tokio::test]
    async fn test_frames_after_end_are_not_read() {
        let transport = MockTransport::new(vec![vec![
            frame(r#"{"type":"content","content":"Done"}"#),
            frame(r#"{"type":"end"}"#),
            frame(r#"{"type":"content","content":" extra"}"#),
            Err("late failure".into()),
        ]]);
        let mut controller = ConversationController::new();

        let state = controller.send(&transport, "hi").await.unwrap();
        assert_eq!(state, Some(SessionState::Closed));
        let reply = &controller.snapshot()[1];
        assert_eq!(reply.content, "Done");
        assert_eq!(reply.status, MessageStatus::Complete);
    }

    #[tokio::test]
    async fn test_transport_failure_after_partial_content() {
        let transport = MockTransport::new(vec![vec![
            frame(r#"{"type":"content","content":"Hel"}"#),
            Err("connection reset by peer".into()),
        ]]);
        let mut controller = ConversationController::new();

        let state = controller.send(&transport, "hi").await.unwrap();
        assert_eq!(state, Some(SessionState::Errored));
        let reply = &controller.snapshot()[1];
        assert_eq!(reply.content, TRANSPORT_ERROR_MESSAGE);
        assert_eq!(reply.status, MessageStatus::Errored);
    }

    #[tokio::test]
    async fn test_stream_closed_without_end_is_an_error() {
        let transport = MockTransport::new(vec![vec![frame(
            r#"{"type":"content","content":"Hel"}"#,
        )]]);
        let mut controller = ConversationController::new();

        let state = controller.send(&transport, "hi").await.unwrap();
        assert_eq!(state, Some(SessionState::Errored));
        assert_eq!(controller.snapshot()[1].content, TRANSPORT_ERROR_MESSAGE);
    }

    #[tokio::test]
    async fn test_open_failure() {
        let transport = MockTransport::failing_open();
        let mut controller = ConversationController::new();

        let state = controller.send(&transport, "hi").await.unwrap();
        assert_eq!(state, Some(SessionState::Errored));
        assert_eq!(controller.snapshot().len(), 2);
        assert_eq!(controller.snapshot()[1].status, MessageStatus::Errored);
    }

    #[tokio::test]
    async fn test_send_blank_does_not_open() {
        let transport = MockTransport::new(Vec::new());
        let mut controller = ConversationController::new();

        assert!(controller.send(&transport, "  ").await.unwrap().is_none());
        assert!(transport.requests().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_frames_do_not_stop_the_turn() {
        let transport = MockTransport::new(vec![vec![
            frame("garbage"),
            frame(r#"{"type":"content","content":"Hel"}"#),
            frame(r#"{"type":"unknown"}"#),
            frame(r#"{"type":"content","content":"lo"}"#),
            frame(r#"{"type":"end"}"#),
        ]]);
        let mut controller = ConversationController::new();

        let state = controller.send(&transport, "hi").await.unwrap();
        assert_eq!(state, Some(SessionState::Closed));
        assert_eq!(controller.snapshot()[1].content, "Hello");
    }

    #[tokio::test]
    async fn test_events_are_published() {
        let transport = MockTransport::new(vec![vec![
            frame(r#"{"type":"checkpoint","checkpoint_id":"cp"}"#),
            frame(r#"{"type":"content","content":"Hi"}"#),
            frame(r#"{"type":"end"}"#),
        ]]);
        let mut controller = ConversationController::new();
        let mut rx = controller.subscribe();

        controller.send(&transport, "hello").await.unwrap();

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }

        assert!(matches!(
            &events[0],
            ConversationEvent::MessageAppended { message } if message.is_user()
        ));
        assert!(matches!(
            &events[1],
            ConversationEvent::MessageAppended { message } if message.status == MessageStatus::Pending
        ));
        assert!(matches!(
            &events[2],
            ConversationEvent::CheckpointUpdated { checkpoint } if checkpoint == "cp"
        ));
        assert!(matches!(
            &events[3],
            ConversationEvent::MessageUpdated { message } if message.content == "Hi"
        ));
        assert!(matches!(
            &events[4],
            ConversationEvent::MessageUpdated { message } if message.status == MessageStatus::Complete
        ));
        assert!(events[5].is_terminal());
        assert_eq!(events.len(), 6);
    }
}
