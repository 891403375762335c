//! Ordered message storage addressable by id.

use arplexity_wire::{Message, MessageId, MessagePatch};

use crate::error::StoreError;

/// Ordered collection of messages.
///
/// Insertion order is display order. Updates never move a message.
#[derive(Debug, Clone, Default)]
pub struct MessageStore {
    messages: Vec<Message>,
}

impl MessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from existing history, rejecting repeated ids
    pub fn from_messages(
        messages: impl IntoIterator<Item = Message>,
    ) -> Result<Self, StoreError> {
        let mut store = Self::new();
        for message in messages {
            store.append(message)?;
        }
        Ok(store)
    }

    /// Add a message at the end
    pub fn append(&mut self, message: Message) -> Result<(), StoreError> {
        if self.position(message.id).is_some() {
            return Err(StoreError::DuplicateId(message.id));
        }
        self.messages.push(message);
        Ok(())
    }

    /// Replace the supplied fields of one message in place
    pub fn update(&mut self, id: MessageId, patch: MessagePatch) -> Result<(), StoreError> {
        let index = self.position(id).ok_or(StoreError::NotFound(id))?;
        patch.apply_to(&mut self.messages[index]);
        Ok(())
    }

    pub fn get(&self, id: MessageId) -> Option<&Message> {
        self.position(id).map(|index| &self.messages[index])
    }

    /// Owned copy of every message in order
    pub fn snapshot(&self) -> Vec<Message> {
        self.messages.clone()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Highest id in the store
    pub fn max_id(&self) -> Option<MessageId> {
        self.messages.iter().map(|m| m.id).max()
    }

    fn position(&self, id: MessageId) -> Option<usize> {
        // Recent messages are the ones being updated
        self.messages.iter().rposition(|m| m.id == id)
    }
}
