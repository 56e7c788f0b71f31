//! Client traits and the client factory.
//!
//! A [`QueueClient`] owns the connection to a messaging namespace. Senders
//! for individual queues are created from it and share its connection. Both
//! are long-lived, safe to share between tasks, and must be closed explicitly
//! when the application shuts down.

use crate::batch::MessageBatch;
use crate::error::QueueError;
use crate::message::QueueName;
use crate::provider::{ProviderConfig, ProviderType};
use crate::providers::{AzureServiceBusClient, InMemoryClient};
use async_trait::async_trait;
use std::sync::Arc;

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;

/// Connection to a messaging namespace
#[async_trait]
pub trait QueueClient: Send + Sync {
    /// Create a sender publishing to `queue`
    fn create_sender(&self, queue: &QueueName) -> Result<Arc<dyn QueueSender>, QueueError>;

    /// Close the connection and every sender created from it
    async fn close(&self) -> Result<(), QueueError>;

    /// Check whether the client has been closed
    fn is_closed(&self) -> bool;

    /// Get provider type
    fn provider_type(&self) -> ProviderType;
}

/// Publishes message batches to a single queue
#[async_trait]
pub trait QueueSender: Send + Sync {
    /// Create an empty batch sized for this sender's queue.
    ///
    /// Local operation; no network traffic.
    fn create_message_batch(&self) -> Result<MessageBatch, QueueError>;

    /// Deliver every message of the batch atomically, or fail
    async fn send_message_batch(&self, batch: MessageBatch) -> Result<(), QueueError>;

    /// Close the sender; later operations fail with [`QueueError::ClientClosed`]
    async fn close(&self) -> Result<(), QueueError>;

    /// Check whether the sender has been closed
    fn is_closed(&self) -> bool;

    /// Queue this sender publishes to
    fn queue_name(&self) -> &QueueName;
}

/// Factory for creating queue clients with appropriate providers
pub struct QueueClientFactory;

impl QueueClientFactory {
    /// Open a queue client from configuration
    pub fn create_client(config: ProviderConfig) -> Result<Arc<dyn QueueClient>, QueueError> {
        config.validate()?;

        let client: Arc<dyn QueueClient> = match config {
            ProviderConfig::AzureServiceBus(azure_config) => {
                Arc::new(AzureServiceBusClient::new(azure_config)?)
            }
            ProviderConfig::InMemory(in_memory_config) => {
                Arc::new(InMemoryClient::new(in_memory_config))
            }
        };

        tracing::info!(provider = %client.provider_type(), "Queue client opened");
        Ok(client)
    }

    /// Create test client with in-memory provider
    pub fn create_test_client() -> Arc<InMemoryClient> {
        Arc::new(InMemoryClient::default())
    }
}
