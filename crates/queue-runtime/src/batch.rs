//! Size-bounded message batches.
//!
//! A [`MessageBatch`] is created empty by a [`QueueSender`](crate::client::QueueSender)
//! and filled by the caller. Its capacity is decided by the provider that
//! created it: callers learn whether a message fits only by trying to add it.
//!
//! ## Lifecycle
//!
//! 1. **Create**: `sender.create_message_batch()`
//! 2. **Fill**: `batch.try_add_message(msg)` until a message is handed back
//! 3. **Send**: `sender.send_message_batch(batch)` consumes the batch
//!
//! Dropping a batch without sending it discards its messages.

use crate::message::Message;

#[cfg(test)]
#[path = "batch_tests.rs"]
mod tests;

/// Computes the number of bytes a message occupies in a provider's batch payload
pub type MessageSizer = fn(&Message) -> usize;

/// Capacity limits of a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchLimits {
    /// Maximum encoded size of the whole batch, framing included
    pub max_size_in_bytes: usize,

    /// Maximum number of messages, when the provider has one
    pub max_messages: Option<usize>,

    /// Bytes taken by the batch framing before any message is added
    pub framing_overhead: usize,
}

impl BatchLimits {
    /// Limits bounded only by size
    pub fn by_size(max_size_in_bytes: usize) -> Self {
        Self {
            max_size_in_bytes,
            max_messages: None,
            framing_overhead: 0,
        }
    }

    /// Add a message-count limit
    pub fn with_max_messages(mut self, max_messages: usize) -> Self {
        self.max_messages = Some(max_messages);
        self
    }

    /// Set the framing overhead counted against the size limit
    pub fn with_framing_overhead(mut self, framing_overhead: usize) -> Self {
        self.framing_overhead = framing_overhead;
        self
    }
}

/// An ordered group of messages that will be delivered in one send operation
#[derive(Debug)]
pub struct MessageBatch {
    messages: Vec<Message>,
    size_in_bytes: usize,
    limits: BatchLimits,
    sizer: MessageSizer,
}

impl MessageBatch {
    /// Create an empty batch with the given limits and size function
    pub fn new(limits: BatchLimits, sizer: MessageSizer) -> Self {
        Self {
            messages: Vec::new(),
            size_in_bytes: limits.framing_overhead,
            limits,
            sizer,
        }
    }

    /// Try to add a message to the batch.
    ///
    /// Returns the message back unchanged when adding it would exceed either
    /// the size limit or the message-count limit. The batch is not modified in
    /// that case.
    pub fn try_add_message(&mut self, message: Message) -> Result<(), Message> {
        if let Some(max_messages) = self.limits.max_messages {
            if self.messages.len() >= max_messages {
                return Err(message);
            }
        }

        let message_size = (self.sizer)(&message);
        match self.size_in_bytes.checked_add(message_size) {
            Some(new_size) if new_size <= self.limits.max_size_in_bytes => {
                self.size_in_bytes = new_size;
                self.messages.push(message);
                Ok(())
            }
            _ => Err(message),
        }
    }

    /// Encoded size a message would take in this batch
    pub fn size_of(&self, message: &Message) -> usize {
        (self.sizer)(message)
    }

    /// Number of messages in the batch
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Check whether the batch holds no messages
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Current encoded size of the batch, framing included
    pub fn size_in_bytes(&self) -> usize {
        self.size_in_bytes
    }

    /// Maximum encoded size of the batch
    pub fn max_size_in_bytes(&self) -> usize {
        self.limits.max_size_in_bytes
    }

    /// Limits this batch was created with
    pub fn limits(&self) -> BatchLimits {
        self.limits
    }

    /// Messages in insertion order
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Consume the batch, returning its messages in insertion order
    pub fn into_messages(self) -> Vec<Message> {
        self.messages
    }
}
