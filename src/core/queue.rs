//! FIFO store of whole messages with byte accounting.
//!
//! Every method assumes the caller holds the slot lock; the queue itself does
//! no synchronization and no capacity checks.

use std::collections::VecDeque;

/// One whole message. The payload length is the recorded length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    payload: Vec<u8>,
}

impl Message {
    pub fn new(payload: Vec<u8>) -> Self {
        Self { payload }
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }
}

#[derive(Debug, Default)]
pub struct MessageQueue {
    messages: VecDeque<Message>,
    storage_size: usize,
}

impl MessageQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends at the tail.
    pub fn enqueue(&mut self, message: Message) {
        self.storage_size += message.len();
        self.messages.push_back(message);
    }

    /// Length of the head message, left in place.
    pub fn peek_len(&self) -> Option<usize> {
        self.messages.front().map(Message::len)
    }

    /// Removes the head message.
    pub fn dequeue(&mut self) -> Option<Message> {
        let message = self.messages.pop_front()?;
        self.storage_size -= message.len();
        Some(message)
    }

    /// Removes every message, returning `(messages, bytes)` discarded.
    pub fn drain(&mut self) -> (usize, usize) {
        let drained = (self.messages.len(), self.storage_size);
        self.messages.clear();
        self.storage_size = 0;
        drained
    }

    /// Sum of queued message lengths.
    pub fn storage_size(&self) -> usize {
        self.storage_size
    }

    pub fn pending_count(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
