//! Provider types and configuration.

use crate::error::ConfigurationError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use url::Url;

/// Enumeration of supported queue providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProviderType {
    AzureServiceBus,
    InMemory,
}

impl ProviderType {
    /// Provider name used in logs and error reports
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AzureServiceBus => "AzureServiceBus",
            Self::InMemory => "InMemory",
        }
    }

    /// Default maximum batch payload size for the provider
    pub fn default_max_batch_size(&self) -> usize {
        match self {
            Self::AzureServiceBus => 256 * 1024, // Standard tier REST batch limit
            Self::InMemory => 256 * 1024,
        }
    }
}

impl fmt::Display for ProviderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Provider-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProviderConfig {
    AzureServiceBus(AzureServiceBusConfig),
    InMemory(InMemoryConfig),
}

impl ProviderConfig {
    /// Provider type this configuration creates
    pub fn provider_type(&self) -> ProviderType {
        match self {
            Self::AzureServiceBus(_) => ProviderType::AzureServiceBus,
            Self::InMemory(_) => ProviderType::InMemory,
        }
    }

    /// Validate provider settings
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        match self {
            Self::AzureServiceBus(config) => config.validate(),
            Self::InMemory(config) => config.validate(),
        }
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self::InMemory(InMemoryConfig::default())
    }
}

// ============================================================================
// Azure Service Bus
// ============================================================================

/// Azure Service Bus configuration
///
/// The connection string carries the shared access key, so it is redacted
/// from `Debug` output.
#[derive(Clone, Serialize, Deserialize)]
pub struct AzureServiceBusConfig {
    /// Connection string of the namespace (or of a single entity)
    pub connection_string: String,

    /// Maximum REST payload size of a single batch in bytes
    #[serde(default = "default_azure_max_batch_size")]
    pub max_batch_size_in_bytes: usize,

    /// Maximum number of messages in a single batch
    #[serde(default = "default_azure_max_messages_per_batch")]
    pub max_messages_per_batch: Option<usize>,

    /// HTTP request timeout in seconds
    #[serde(default = "default_request_timeout_seconds")]
    pub request_timeout_seconds: u64,

    /// Lifetime of generated SAS tokens in seconds
    #[serde(default = "default_token_lifetime_seconds")]
    pub token_lifetime_seconds: u64,
}

fn default_azure_max_batch_size() -> usize {
    ProviderType::AzureServiceBus.default_max_batch_size()
}

fn default_azure_max_messages_per_batch() -> Option<usize> {
    Some(4500)
}

fn default_request_timeout_seconds() -> u64 {
    30
}

fn default_token_lifetime_seconds() -> u64 {
    3600
}

impl AzureServiceBusConfig {
    /// Create configuration from a connection string with default limits
    pub fn new(connection_string: impl Into<String>) -> Self {
        Self {
            connection_string: connection_string.into(),
            max_batch_size_in_bytes: default_azure_max_batch_size(),
            max_messages_per_batch: default_azure_max_messages_per_batch(),
            request_timeout_seconds: default_request_timeout_seconds(),
            token_lifetime_seconds: default_token_lifetime_seconds(),
        }
    }

    /// Parse the configured connection string
    pub fn parsed_connection_string(&self) -> Result<ServiceBusConnectionString, ConfigurationError> {
        self.connection_string.parse()
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        self.parsed_connection_string()?;

        if self.max_batch_size_in_bytes == 0 {
            return Err(ConfigurationError::Invalid {
                message: "max_batch_size_in_bytes must be greater than zero".to_string(),
            });
        }

        if self.max_messages_per_batch == Some(0) {
            return Err(ConfigurationError::Invalid {
                message: "max_messages_per_batch must be greater than zero".to_string(),
            });
        }

        if self.request_timeout_seconds == 0 || self.token_lifetime_seconds == 0 {
            return Err(ConfigurationError::Invalid {
                message: "request and token lifetimes must be greater than zero".to_string(),
            });
        }

        Ok(())
    }
}

impl fmt::Debug for AzureServiceBusConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AzureServiceBusConfig")
            .field("connection_string", &"<REDACTED>")
            .field("max_batch_size_in_bytes", &self.max_batch_size_in_bytes)
            .field("max_messages_per_batch", &self.max_messages_per_batch)
            .field("request_timeout_seconds", &self.request_timeout_seconds)
            .field("token_lifetime_seconds", &self.token_lifetime_seconds)
            .finish()
    }
}

/// Parsed Service Bus connection string
///
/// Format: `Endpoint=sb://<namespace>/;SharedAccessKeyName=<name>;SharedAccessKey=<key>[;EntityPath=<queue>]`
///
/// `sb://` endpoints are addressed over HTTPS. `http://` and `https://`
/// endpoints are used as given, which allows local emulators.
#[derive(Clone, PartialEq, Eq)]
pub struct ServiceBusConnectionString {
    endpoint: Url,
    shared_access_key_name: String,
    shared_access_key: String,
    entity_path: Option<String>,
}

impl ServiceBusConnectionString {
    /// Base HTTP endpoint of the namespace, always ending with `/`
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Name of the shared access policy
    pub fn shared_access_key_name(&self) -> &str {
        &self.shared_access_key_name
    }

    /// Shared access key used to sign tokens
    pub fn shared_access_key(&self) -> &str {
        &self.shared_access_key
    }

    /// Entity the connection string is scoped to, if any
    pub fn entity_path(&self) -> Option<&str> {
        self.entity_path.as_deref()
    }

    fn parse_endpoint(raw: &str) -> Result<Url, ConfigurationError> {
        let raw = raw.trim();
        let candidate = if let Some(rest) = raw.strip_prefix("sb://") {
            format!("https://{}", rest)
        } else if raw.starts_with("https://") || raw.starts_with("http://") {
            raw.to_string()
        } else {
            return Err(ConfigurationError::Invalid {
                message: format!("Endpoint must use sb://, https:// or http://: {}", raw),
            });
        };

        let mut url = Url::parse(&candidate).map_err(|e| ConfigurationError::Parsing {
            message: format!("Invalid Endpoint: {}", e),
        })?;

        if url.host_str().is_none() {
            return Err(ConfigurationError::Invalid {
                message: "Endpoint has no host".to_string(),
            });
        }

        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }

        Ok(url)
    }
}

impl FromStr for ServiceBusConnectionString {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut endpoint = None;
        let mut key_name = None;
        let mut key = None;
        let mut entity_path = None;

        for part in s.split(';').map(str::trim).filter(|p| !p.is_empty()) {
            let (name, value) = part.split_once('=').ok_or_else(|| ConfigurationError::Parsing {
                message: "connection string entries must be key=value pairs".to_string(),
            })?;

            match name.trim().to_ascii_lowercase().as_str() {
                "endpoint" => endpoint = Some(Self::parse_endpoint(value)?),
                "sharedaccesskeyname" => key_name = Some(value.trim().to_string()),
                "sharedaccesskey" => key = Some(value.trim().to_string()),
                "entitypath" => entity_path = Some(value.trim().to_string()),
                // Other settings (TransportType, etc.) do not apply to REST
                _ => {}
            }
        }

        let endpoint = endpoint.ok_or_else(|| ConfigurationError::Missing {
            key: "Endpoint".to_string(),
        })?;
        let shared_access_key_name = key_name
            .filter(|v| !v.is_empty())
            .ok_or_else(|| ConfigurationError::Missing {
                key: "SharedAccessKeyName".to_string(),
            })?;
        let shared_access_key = key
            .filter(|v| !v.is_empty())
            .ok_or_else(|| ConfigurationError::Missing {
                key: "SharedAccessKey".to_string(),
            })?;

        Ok(Self {
            endpoint,
            shared_access_key_name,
            shared_access_key,
            entity_path: entity_path.filter(|v| !v.is_empty()),
        })
    }
}

impl fmt::Debug for ServiceBusConnectionString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceBusConnectionString")
            .field("endpoint", &self.endpoint.as_str())
            .field("shared_access_key_name", &self.shared_access_key_name)
            .field("shared_access_key", &"<REDACTED>")
            .field("entity_path", &self.entity_path)
            .finish()
    }
}

// ============================================================================
// In-Memory
// ============================================================================

/// In-memory provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InMemoryConfig {
    /// Maximum encoded size of a single batch in bytes
    pub max_batch_size_in_bytes: usize,

    /// Maximum number of messages in a single batch
    pub max_messages_per_batch: Option<usize>,

    /// Maximum number of messages a queue holds before sends are rejected
    pub max_queue_size: usize,
}

impl InMemoryConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.max_batch_size_in_bytes == 0 {
            return Err(ConfigurationError::Invalid {
                message: "max_batch_size_in_bytes must be greater than zero".to_string(),
            });
        }

        if self.max_messages_per_batch == Some(0) {
            return Err(ConfigurationError::Invalid {
                message: "max_messages_per_batch must be greater than zero".to_string(),
            });
        }

        Ok(())
    }
}

impl Default for InMemoryConfig {
    fn default() -> Self {
        Self {
            max_batch_size_in_bytes: ProviderType::InMemory.default_max_batch_size(),
            max_messages_per_batch: None,
            max_queue_size: 10000,
        }
    }
}

#[cfg(test)]
#[path = "provider_tests.rs"]
mod tests;
