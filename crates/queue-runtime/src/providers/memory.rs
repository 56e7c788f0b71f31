//! In-memory queue provider implementation for testing and development.
//!
//! Delivered messages are kept per queue in FIFO order together with the
//! number of the batch that delivered them, so tests can assert exactly how a
//! publisher packed its messages.

use crate::batch::{BatchLimits, MessageBatch};
use crate::client::{QueueClient, QueueSender};
use crate::error::QueueError;
use crate::message::{Message, QueueName};
use crate::provider::{InMemoryConfig, ProviderType};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use tracing::debug;

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;

// ============================================================================
// Internal Storage Structures
// ============================================================================

/// Thread-safe storage for all queues
#[derive(Default)]
struct QueueStorage {
    queues: HashMap<QueueName, InMemoryQueue>,
}

/// Internal queue state for a single queue
#[derive(Default)]
struct InMemoryQueue {
    messages: Vec<DeliveredMessage>,
    batches_received: u64,
    next_sequence_number: u64,
}

/// A message as it was stored by the in-memory queue
#[derive(Debug, Clone)]
pub struct DeliveredMessage {
    /// Position of the message in its queue, starting at 1
    pub sequence_number: u64,
    /// Batch that delivered the message, starting at 1
    pub batch_number: u64,
    pub enqueued_at: DateTime<Utc>,
    pub message: Message,
}

/// Encoded size of a message in an in-memory batch
fn in_memory_message_size(message: &Message) -> usize {
    let properties: usize = message
        .properties
        .iter()
        .map(|(k, v)| k.len() + v.len())
        .sum();

    message.body.len()
        + properties
        + message.content_type.as_ref().map_or(0, String::len)
        + message.correlation_id.as_ref().map_or(0, String::len)
        + message.message_id.as_ref().map_or(0, |id| id.as_str().len())
}

fn lock_poisoned() -> QueueError {
    QueueError::ProviderError {
        provider: ProviderType::InMemory.to_string(),
        code: "LockPoisoned".to_string(),
        message: "in-memory queue storage lock was poisoned".to_string(),
        transient: false,
    }
}

// ============================================================================
// In-Memory Client
// ============================================================================

/// In-memory queue client
///
/// Queues are created on first use. Clones of the storage are shared by all
/// senders of the client, so messages sent through any sender are visible via
/// [`InMemoryClient::delivered_messages`].
pub struct InMemoryClient {
    storage: Arc<RwLock<QueueStorage>>,
    config: InMemoryConfig,
    closed: Arc<AtomicBool>,
    senders: Mutex<Vec<Arc<InMemorySender>>>,
}

impl InMemoryClient {
    /// Create new in-memory client
    pub fn new(config: InMemoryConfig) -> Self {
        Self {
            storage: Arc::new(RwLock::new(QueueStorage::default())),
            config,
            closed: Arc::new(AtomicBool::new(false)),
            senders: Mutex::new(Vec::new()),
        }
    }

    /// Messages delivered to `queue`, in delivery order
    pub fn delivered_messages(&self, queue: &QueueName) -> Vec<DeliveredMessage> {
        self.storage
            .read()
            .map(|storage| {
                storage
                    .queues
                    .get(queue)
                    .map(|q| q.messages.clone())
                    .unwrap_or_default()
            })
            .unwrap_or_default()
    }

    /// Messages delivered to `queue`, grouped by the batch that carried them
    pub fn sent_batches(&self, queue: &QueueName) -> Vec<Vec<Message>> {
        let mut batches: Vec<Vec<Message>> = Vec::new();
        for delivered in self.delivered_messages(queue) {
            let index = (delivered.batch_number - 1) as usize;
            if batches.len() <= index {
                batches.resize_with(index + 1, Vec::new);
            }
            batches[index].push(delivered.message);
        }
        batches
    }

    /// Number of messages held by `queue`
    pub fn message_count(&self, queue: &QueueName) -> usize {
        self.storage
            .read()
            .map(|storage| storage.queues.get(queue).map_or(0, |q| q.messages.len()))
            .unwrap_or(0)
    }
}

impl Default for InMemoryClient {
    fn default() -> Self {
        Self::new(InMemoryConfig::default())
    }
}

#[async_trait]
impl QueueClient for InMemoryClient {
    fn create_sender(&self, queue: &QueueName) -> Result<Arc<dyn QueueSender>, QueueError> {
        if self.is_closed() {
            return Err(QueueError::ClientClosed {
                entity: "in-memory client".to_string(),
            });
        }

        let sender = Arc::new(InMemorySender {
            queue_name: queue.clone(),
            storage: Arc::clone(&self.storage),
            config: self.config.clone(),
            closed: AtomicBool::new(false),
            client_closed: Arc::clone(&self.closed),
        });

        self.senders
            .lock()
            .map_err(|_| lock_poisoned())?
            .push(Arc::clone(&sender));

        Ok(sender)
    }

    async fn close(&self) -> Result<(), QueueError> {
        self.closed.store(true, Ordering::SeqCst);

        let senders = std::mem::take(&mut *self.senders.lock().map_err(|_| lock_poisoned())?);
        for sender in senders {
            sender.close().await?;
        }

        debug!("In-memory client closed");
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn provider_type(&self) -> ProviderType {
        ProviderType::InMemory
    }
}

// ============================================================================
// In-Memory Sender
// ============================================================================

/// Sender publishing to a single in-memory queue
pub struct InMemorySender {
    queue_name: QueueName,
    storage: Arc<RwLock<QueueStorage>>,
    config: InMemoryConfig,
    closed: AtomicBool,
    client_closed: Arc<AtomicBool>,
}

impl InMemorySender {
    fn ensure_open(&self) -> Result<(), QueueError> {
        if self.is_closed() {
            return Err(QueueError::ClientClosed {
                entity: format!("sender for queue '{}'", self.queue_name),
            });
        }
        Ok(())
    }

    fn limits(&self) -> BatchLimits {
        let limits = BatchLimits::by_size(self.config.max_batch_size_in_bytes);
        match self.config.max_messages_per_batch {
            Some(max) => limits.with_max_messages(max),
            None => limits,
        }
    }
}

#[async_trait]
impl QueueSender for InMemorySender {
    fn create_message_batch(&self) -> Result<MessageBatch, QueueError> {
        self.ensure_open()?;
        Ok(MessageBatch::new(self.limits(), in_memory_message_size))
    }

    async fn send_message_batch(&self, batch: MessageBatch) -> Result<(), QueueError> {
        self.ensure_open()?;

        if batch.size_in_bytes() > self.config.max_batch_size_in_bytes {
            return Err(QueueError::BatchTooLarge {
                size: batch.size_in_bytes(),
                max_size: self.config.max_batch_size_in_bytes,
            });
        }

        if batch.is_empty() {
            debug!(queue = %self.queue_name, "Ignoring empty batch");
            return Ok(());
        }

        let mut storage = self.storage.write().map_err(|_| lock_poisoned())?;
        let queue = storage.queues.entry(self.queue_name.clone()).or_default();

        if queue.messages.len() + batch.len() > self.config.max_queue_size {
            return Err(QueueError::ProviderError {
                provider: ProviderType::InMemory.to_string(),
                code: "QuotaExceeded".to_string(),
                message: format!(
                    "queue '{}' cannot hold more than {} messages",
                    self.queue_name, self.config.max_queue_size
                ),
                transient: false,
            });
        }

        queue.batches_received += 1;
        let batch_number = queue.batches_received;
        let enqueued_at = Utc::now();
        let count = batch.len();

        for message in batch.into_messages() {
            queue.next_sequence_number += 1;
            queue.messages.push(DeliveredMessage {
                sequence_number: queue.next_sequence_number,
                batch_number,
                enqueued_at,
                message,
            });
        }

        debug!(
            queue = %self.queue_name,
            batch = batch_number,
            messages = count,
            "Stored batch in memory"
        );
        Ok(())
    }

    async fn close(&self) -> Result<(), QueueError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst) || self.client_closed.load(Ordering::SeqCst)
    }

    fn queue_name(&self) -> &QueueName {
        &self.queue_name
    }
}
