//! Bounded chat buffer.
//!
//! Each pair keeps a small FIFO of relayed messages. When the buffer is
//! full the oldest message is dropped; delivery is lossy by design.

use crate::ChatMessage;
use std::collections::VecDeque;

/// Buffer size used when none is configured.
pub const DEFAULT_CHAT_CAPACITY: usize = 10;

/// Largest accepted buffer size.
pub const MAX_CHAT_CAPACITY: usize = 100;

/// Fixed-capacity ring of chat messages in insertion order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatRing {
    capacity: usize,
    messages: VecDeque<ChatMessage>,
}

impl ChatRing {
    /// Create an empty ring. A zero capacity is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            messages: VecDeque::with_capacity(capacity),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append a message, returning the evicted oldest message if the ring
    /// was already full.
    pub fn push(&mut self, message: ChatMessage) -> Option<ChatMessage> {
        let evicted = if self.messages.len() >= self.capacity {
            self.messages.pop_front()
        } else {
            None
        };
        self.messages.push_back(message);
        evicted
    }

    /// Copy of the current contents, oldest first.
    pub fn snapshot(&self) -> ChatSnapshot {
        ChatSnapshot {
            inner: self.messages.iter().cloned().collect::<Vec<_>>().into_iter(),
        }
    }
}

impl Default for ChatRing {
    fn default() -> Self {
        Self::new(DEFAULT_CHAT_CAPACITY)
    }
}

/// Point-in-time view of a chat ring.
///
/// Reflects the buffer at the moment it was taken and can be walked exactly
/// once; later posts are not observed.
#[derive(Debug)]
pub struct ChatSnapshot {
    inner: std::vec::IntoIter<ChatMessage>,
}

impl ChatSnapshot {
    pub fn empty() -> Self {
        Self {
            inner: Vec::new().into_iter(),
        }
    }
}

impl Iterator for ChatSnapshot {
    type Item = ChatMessage;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for ChatSnapshot {}
