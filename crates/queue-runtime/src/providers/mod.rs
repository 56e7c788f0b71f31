//! Queue provider implementations.
//!
//! This module contains concrete implementations of the `QueueClient` and
//! `QueueSender` traits for different queue backends.

pub mod azure;
pub mod memory;

pub use azure::{AzureServiceBusClient, AzureServiceBusSender};
pub use memory::{DeliveredMessage, InMemoryClient, InMemorySender};
