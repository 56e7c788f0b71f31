//! Configuration types for the HTTP service

use crate::errors::ConfigError;
use queue_runtime::{ProviderConfig, QueueName};
use serde::{Deserialize, Serialize};

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;

/// Paths served by the router itself; the trigger may not shadow them
const RESERVED_PATHS: &[&str] = &["/health", "/ready", "/metrics"];

/// Service configuration
///
/// Every field has a default, so an empty configuration source produces a
/// service publishing to an in-memory `reservations` queue.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ServiceConfig {
    /// HTTP server settings
    pub server: ServerConfig,

    /// Target queue and provider
    pub queue: QueueConfig,

    /// Messages published per trigger
    pub producer: ProducerConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl ServiceConfig {
    /// Validate the whole configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.validate()?;
        self.queue.validate()?;
        Ok(())
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Graceful shutdown timeout in seconds
    pub shutdown_timeout_seconds: u64,

    /// Path of the producer trigger endpoint
    pub trigger_path: String,

    /// Enable CORS
    pub enable_cors: bool,

    /// Enable compression
    pub enable_compression: bool,
}

impl ServerConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::Missing {
                key: "server.host".to_string(),
            });
        }

        if self.shutdown_timeout_seconds == 0 {
            return Err(ConfigError::Invalid {
                message: "server.shutdown_timeout_seconds must be greater than zero".to_string(),
            });
        }

        if !self.trigger_path.starts_with('/') || self.trigger_path.len() < 2 {
            return Err(ConfigError::Invalid {
                message: format!(
                    "server.trigger_path must be an absolute path, got '{}'",
                    self.trigger_path
                ),
            });
        }

        if RESERVED_PATHS.contains(&self.trigger_path.as_str()) {
            return Err(ConfigError::Invalid {
                message: format!(
                    "server.trigger_path '{}' collides with a built-in endpoint",
                    self.trigger_path
                ),
            });
        }

        Ok(())
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            shutdown_timeout_seconds: 30,
            trigger_path: "/api/producer".to_string(),
            enable_cors: true,
            enable_compression: true,
        }
    }
}

/// Queue configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Name of the queue receiving the messages
    pub queue_name: String,

    /// Queue provider and its connection settings
    pub provider: ProviderConfig,
}

impl QueueConfig {
    /// Parsed queue name
    pub fn queue_name(&self) -> Result<QueueName, ConfigError> {
        QueueName::new(self.queue_name.clone()).map_err(|e| ConfigError::Invalid {
            message: format!("queue.queue_name: {}", e),
        })
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let queue = self.queue_name()?;
        self.provider.validate()?;

        if let ProviderConfig::AzureServiceBus(azure) = &self.provider {
            let connection = azure.parsed_connection_string()?;
            if let Some(entity) = connection.entity_path() {
                if entity != queue.as_str() {
                    return Err(ConfigError::Invalid {
                        message: format!(
                            "connection string is scoped to '{}' but queue.queue_name is '{}'",
                            entity, queue
                        ),
                    });
                }
            }
        }

        Ok(())
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            queue_name: "reservations".to_string(),
            provider: ProviderConfig::default(),
        }
    }
}

/// Producer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProducerConfig {
    /// Reservation ids published on every trigger, in order
    pub reservation_ids: Vec<u64>,
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            reservation_ids: vec![1],
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Logging level
    pub level: String,

    /// Enable JSON structured logging
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}
