//! Bounded FIFO store of received messages for one subscription.

use crate::message::Message;
use std::collections::VecDeque;
use tokio::sync::Mutex;

/// A bounded, thread-safe message buffer.
///
/// Holds at most `capacity` messages. Appending past capacity evicts the oldest message.
#[derive(Debug)]
pub struct MessageBuffer {
    capacity: usize,
    messages: Mutex<VecDeque<Message>>,
}

impl MessageBuffer {
    /// Creates an empty buffer. A capacity of zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            messages: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
        }
    }

    /// The maximum number of messages kept.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Appends a message, evicting the oldest ones while over capacity.
    pub async fn append(&self, message: Message) {
        let mut messages = self.messages.lock().await;
        messages.push_back(message);
        while messages.len() > self.capacity {
            messages.pop_front();
        }
    }

    /// Returns a copy of the buffered messages, oldest first.
    pub async fn snapshot(&self) -> Vec<Message> {
        let messages = self.messages.lock().await;
        messages.iter().cloned().collect()
    }

    /// Removes every buffered message.
    pub async fn clear(&self) {
        self.messages.lock().await.clear();
    }

    /// The number of buffered messages.
    pub async fn len(&self) -> usize {
        self.messages.lock().await.len()
    }

    /// Whether the buffer holds no messages.
    pub async fn is_empty(&self) -> bool {
        self.messages.lock().await.is_empty()
    }
}
