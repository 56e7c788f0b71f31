//! # Queue Runtime
//!
//! Provider-agnostic queue client runtime for publishing messages in
//! size-bounded batches, with Azure Service Bus and in-memory implementations.
//!
//! This library provides:
//! - Validated queue names and message types
//! - Size-bounded message batches whose capacity is decided by the provider
//! - Client and sender traits with explicit lifecycle (`close`)
//! - An Azure Service Bus provider speaking the REST batch-send API
//! - An in-memory provider for tests and local development
//!
//! ## Module Organization
//!
//! - [`error`] - Error types for all queue operations
//! - [`message`] - Message structures and identifiers
//! - [`batch`] - Size-bounded message batches
//! - [`provider`] - Provider types and configuration
//! - [`client`] - Client and sender traits plus the client factory
//! - [`providers`] - Concrete provider implementations

pub mod batch;
pub mod client;
pub mod error;
pub mod message;
pub mod provider;
pub mod providers;

// Re-export commonly used types at crate root for convenience
pub use batch::{BatchLimits, MessageBatch};
pub use client::{QueueClient, QueueClientFactory, QueueSender};
pub use error::{ConfigurationError, QueueError, SerializationError, ValidationError};
pub use message::{Message, MessageId, QueueName};
pub use provider::{
    AzureServiceBusConfig, InMemoryConfig, ProviderConfig, ProviderType,
    ServiceBusConnectionString,
};
pub use providers::{AzureServiceBusClient, InMemoryClient};

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
