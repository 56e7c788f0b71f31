//! Publish outcome and error types.
//!
//! Every outcome records how many messages reached the queue before it was
//! produced, so callers can tell nothing, part, or all of the input apart
//! without inspecting the queue.

use queue_runtime::{QueueError, QueueName};
use std::time::Duration;
use thiserror::Error;

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;

/// How much of a publish call reached the queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryState {
    NothingSent,
    PartiallySent { messages_sent: usize },
    FullySent { messages_sent: usize },
}

/// Successful publish of every input message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishReport {
    pub queue_name: QueueName,
    pub messages_sent: usize,
    pub batches_sent: usize,
}

impl PublishReport {
    pub fn delivery_state(&self) -> DeliveryState {
        if self.messages_sent == 0 {
            DeliveryState::NothingSent
        } else {
            DeliveryState::FullySent {
                messages_sent: self.messages_sent,
            }
        }
    }
}

/// Failure of a publish call
///
/// Batches sent before the failure stay sent; `messages_sent` counts them.
#[derive(Debug, Error)]
pub enum PublishError {
    /// A message does not fit even in an empty batch.
    ///
    /// `position` is the 1-based index of the message in the input.
    #[error(
        "message at position {position} needs {size_in_bytes} bytes but an empty batch holds at most {max_size_in_bytes} bytes"
    )]
    OversizedMessage {
        position: usize,
        size_in_bytes: usize,
        max_size_in_bytes: usize,
        messages_sent: usize,
    },

    /// Sending a batch failed; the queue error is passed through unchanged
    #[error("batch send failed after {messages_sent} messages in {batches_sent} batches")]
    Transport {
        messages_sent: usize,
        batches_sent: usize,
        source: QueueError,
    },

    /// The sender could not provide a new batch
    #[error("could not create a batch after {messages_sent} messages")]
    BatchUnavailable {
        messages_sent: usize,
        source: QueueError,
    },
}

impl PublishError {
    /// Messages that reached the queue before the failure
    pub fn messages_sent(&self) -> usize {
        match self {
            Self::OversizedMessage { messages_sent, .. }
            | Self::Transport { messages_sent, .. }
            | Self::BatchUnavailable { messages_sent, .. } => *messages_sent,
        }
    }

    pub fn delivery_state(&self) -> DeliveryState {
        match self.messages_sent() {
            0 => DeliveryState::NothingSent,
            messages_sent => DeliveryState::PartiallySent { messages_sent },
        }
    }

    /// Queue error behind the failure, if any
    pub fn queue_error(&self) -> Option<&QueueError> {
        match self {
            Self::OversizedMessage { .. } => None,
            Self::Transport { source, .. } | Self::BatchUnavailable { source, .. } => Some(source),
        }
    }

    /// Check if retrying the publish could succeed
    pub fn is_transient(&self) -> bool {
        self.queue_error().is_some_and(QueueError::is_transient)
    }

    /// Get suggested retry delay for transient failures
    pub fn retry_after(&self) -> Option<Duration> {
        self.queue_error().and_then(QueueError::retry_after)
    }
}
