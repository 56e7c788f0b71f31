//! Batch packing and publisher lifecycle.
//!
//! [`publish_all`] packs messages greedily: each batch is filled in input
//! order until the next message does not fit, then sent, and the message that
//! did not fit starts the next batch. Messages are never reordered or skipped.
//! A message that does not fit into an empty batch ends the call.
//!
//! [`MessagePublisher`] owns the client and sender for the lifetime of the
//! service. It is created once at start-up and shut down explicitly.

use crate::error::{PublishError, PublishReport};
use queue_runtime::{Message, QueueClient, QueueError, QueueName, QueueSender};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

#[cfg(test)]
#[path = "publisher_tests.rs"]
mod tests;

// ============================================================================
// Batch Packer
// ============================================================================

/// Send `messages` to the sender's queue in as few batches as first-fit allows
///
/// Batches are created and sent strictly one after another, one network call
/// per batch. Failures are not retried.
///
/// # Errors
///
/// - [`PublishError::OversizedMessage`] if a message does not fit an empty batch
/// - [`PublishError::Transport`] if sending a batch fails
/// - [`PublishError::BatchUnavailable`] if the sender cannot create a batch
///
/// Batches sent before the error remain delivered.
#[instrument(
    skip(sender, messages),
    fields(queue = %sender.queue_name(), messages = messages.len())
)]
pub async fn publish_all(
    sender: &dyn QueueSender,
    messages: Vec<Message>,
) -> Result<PublishReport, PublishError> {
    let mut pending: VecDeque<Message> = messages.into();
    let mut messages_sent = 0;
    let mut batches_sent = 0;

    while let Some(head) = pending.pop_front() {
        let mut batch = sender
            .create_message_batch()
            .map_err(|source| PublishError::BatchUnavailable {
                messages_sent,
                source,
            })?;

        // Everything before the head has been sent, in order
        let position = messages_sent + 1;
        if let Err(rejected) = batch.try_add_message(head) {
            let size_in_bytes = batch.size_of(&rejected);
            warn!(
                position,
                size_in_bytes,
                max_size_in_bytes = batch.max_size_in_bytes(),
                messages_sent,
                "Message does not fit in an empty batch"
            );
            return Err(PublishError::OversizedMessage {
                position,
                size_in_bytes,
                max_size_in_bytes: batch.max_size_in_bytes(),
                messages_sent,
            });
        }

        while let Some(next) = pending.pop_front() {
            if let Err(rejected) = batch.try_add_message(next) {
                pending.push_front(rejected);
                break;
            }
        }

        let batch_len = batch.len();
        let batch_size = batch.size_in_bytes();

        sender
            .send_message_batch(batch)
            .await
            .map_err(|source| PublishError::Transport {
                messages_sent,
                batches_sent,
                source,
            })?;

        messages_sent += batch_len;
        batches_sent += 1;

        debug!(
            batch = batches_sent,
            messages = batch_len,
            bytes = batch_size,
            remaining = pending.len(),
            "Sent batch"
        );
    }

    Ok(PublishReport {
        queue_name: sender.queue_name().clone(),
        messages_sent,
        batches_sent,
    })
}

// ============================================================================
// Message Publisher
// ============================================================================

/// Long-lived publisher for a single queue
///
/// Holds the queue client and one sender. `publish` may be called
/// concurrently; the sender is shared.
pub struct MessagePublisher {
    client: Arc<dyn QueueClient>,
    sender: Arc<dyn QueueSender>,
    shut_down: AtomicBool,
}

impl MessagePublisher {
    /// Open a sender for `queue` on `client`
    pub fn connect(client: Arc<dyn QueueClient>, queue: QueueName) -> Result<Self, QueueError> {
        let sender = client.create_sender(&queue)?;

        info!(
            queue = %queue,
            provider = %client.provider_type(),
            "Message publisher connected"
        );

        Ok(Self {
            client,
            sender,
            shut_down: AtomicBool::new(false),
        })
    }

    pub fn queue_name(&self) -> &QueueName {
        self.sender.queue_name()
    }

    /// Whether the publisher can still accept work
    pub fn is_ready(&self) -> bool {
        !self.shut_down.load(Ordering::SeqCst)
            && !self.sender.is_closed()
            && !self.client.is_closed()
    }

    /// Publish `messages` to the queue
    pub async fn publish(&self, messages: Vec<Message>) -> Result<PublishReport, PublishError> {
        let report = publish_all(self.sender.as_ref(), messages).await?;

        info!(
            queue = %report.queue_name,
            messages_sent = report.messages_sent,
            batches_sent = report.batches_sent,
            "Sent {} messages to queue {}",
            report.messages_sent,
            report.queue_name
        );

        Ok(report)
    }

    /// Close the sender and then the client
    ///
    /// Cleanup failures are logged and otherwise ignored. Calling this more
    /// than once has no further effect.
    pub async fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }

        let queue = self.sender.queue_name().clone();

        if let Err(e) = self.sender.close().await {
            warn!(queue = %queue, error = %e, "Failed to close queue sender");
        }

        if let Err(e) = self.client.close().await {
            warn!(queue = %queue, error = %e, "Failed to close queue client");
        }

        info!(queue = %queue, "Message publisher shut down");
    }
}

impl std::fmt::Debug for MessagePublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessagePublisher")
            .field("queue", self.sender.queue_name())
            .field("provider", &self.client.provider_type())
            .field("shut_down", &self.shut_down.load(Ordering::SeqCst))
            .finish()
    }
}
