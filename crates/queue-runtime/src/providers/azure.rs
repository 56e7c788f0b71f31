//! Azure Service Bus provider implementation using the HTTP REST API.
//!
//! This module publishes message batches to Service Bus queues with direct
//! HTTP calls instead of an AMQP SDK:
//! - **Batch send**: `POST {endpoint}/{queue}/messages` with the
//!   `application/vnd.microsoft.servicebus.json` batch format
//! - **SAS authentication**: tokens signed with the connection string's shared
//!   access key, regenerated for every request
//! - **Exact batch sizing**: a message's size in a batch is the length of its
//!   JSON entry in the request payload, so a batch that fits locally also
//!   fits the service's payload limit
//! - **Error classification**: HTTP status codes are mapped onto
//!   [`QueueError`] variants with correct transience
//!
//! ## Message Encoding
//!
//! The REST batch format carries bodies as strings. UTF-8 bodies are sent as
//! is; any other body is base64-encoded and tagged with the user property
//! `body-encoding = base64`.
//!
//! ## Example
//!
//! ```no_run
//! use queue_runtime::{AzureServiceBusConfig, ProviderConfig, QueueClientFactory, QueueName};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AzureServiceBusConfig::new(std::env::var("SERVICEBUS_CONNECTION_STRING")?);
//! let client = QueueClientFactory::create_client(ProviderConfig::AzureServiceBus(config))?;
//! let sender = client.create_sender(&"reservations".parse::<QueueName>()?)?;
//! # Ok(())
//! # }
//! ```

use crate::batch::{BatchLimits, MessageBatch};
use crate::client::{QueueClient, QueueSender};
use crate::error::{ConfigurationError, QueueError, SerializationError};
use crate::message::{Message, QueueName};
use crate::provider::{AzureServiceBusConfig, ProviderType, ServiceBusConnectionString};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client as HttpClient, StatusCode};
use serde::Serialize;
use sha2::Sha256;
use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

#[cfg(test)]
#[path = "azure_tests.rs"]
mod tests;

/// Content type of the REST batch-send payload
const BATCH_CONTENT_TYPE: &str = "application/vnd.microsoft.servicebus.json";

/// Bytes taken by the `[` `]` around the batch payload
const BATCH_FRAMING_OVERHEAD: usize = 2;

/// User property marking a base64-encoded body
const BODY_ENCODING_PROPERTY: &str = "body-encoding";

type HmacSha256 = Hmac<Sha256>;

// ============================================================================
// SAS Token Signing
// ============================================================================

/// Shared Access Signature generator for Service Bus REST requests
///
/// Token format:
/// `SharedAccessSignature sr={uri}&sig={signature}&se={expiry}&skn={key name}`
/// where the signature is `base64(HMAC-SHA256(key, "{uri}\n{expiry}"))` and
/// `uri` is the URL-encoded resource URI.
#[derive(Clone)]
struct SasTokenSigner {
    key_name: String,
    key: String,
    lifetime: chrono::Duration,
}

impl SasTokenSigner {
    fn new(connection: &ServiceBusConnectionString, lifetime_seconds: u64) -> Self {
        Self {
            key_name: connection.shared_access_key_name().to_string(),
            key: connection.shared_access_key().to_string(),
            lifetime: chrono::Duration::seconds(lifetime_seconds as i64),
        }
    }

    /// Generate a token for `resource_uri` valid from `now` for the configured lifetime
    fn generate(&self, resource_uri: &str, now: DateTime<Utc>) -> Result<String, QueueError> {
        let expiry = (now + self.lifetime).timestamp();
        self.token_with_expiry(resource_uri, expiry)
    }

    fn token_with_expiry(&self, resource_uri: &str, expiry: i64) -> Result<String, QueueError> {
        let encoded_uri = urlencoding::encode(resource_uri);
        let string_to_sign = format!("{}\n{}", encoded_uri, expiry);

        let mut mac = HmacSha256::new_from_slice(self.key.as_bytes()).map_err(|e| {
            QueueError::ConfigurationError(ConfigurationError::Invalid {
                message: format!("Shared access key cannot be used for signing: {}", e),
            })
        })?;
        mac.update(string_to_sign.as_bytes());
        let signature = STANDARD.encode(mac.finalize().into_bytes());

        Ok(format!(
            "SharedAccessSignature sr={}&sig={}&se={}&skn={}",
            encoded_uri,
            urlencoding::encode(&signature),
            expiry,
            urlencoding::encode(&self.key_name)
        ))
    }
}

// ============================================================================
// REST Wire Format
// ============================================================================

/// One entry of the REST batch payload
#[derive(Serialize)]
struct RestMessage<'a> {
    #[serde(rename = "Body")]
    body: Cow<'a, str>,

    #[serde(rename = "BrokerProperties", skip_serializing_if = "BrokerProperties::is_empty")]
    broker_properties: BrokerProperties<'a>,

    #[serde(rename = "UserProperties", skip_serializing_if = "HashMap::is_empty")]
    user_properties: HashMap<&'a str, &'a str>,
}

#[derive(Serialize, Default)]
#[serde(rename_all = "PascalCase")]
struct BrokerProperties<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    message_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    correlation_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    content_type: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    time_to_live: Option<f64>,
}

impl BrokerProperties<'_> {
    fn is_empty(&self) -> bool {
        self.message_id.is_none()
            && self.correlation_id.is_none()
            && self.content_type.is_none()
            && self.time_to_live.is_none()
    }
}

impl<'a> RestMessage<'a> {
    fn from_message(message: &'a Message) -> Self {
        let mut user_properties: HashMap<&'a str, &'a str> = message
            .properties
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();

        let body = match message.body_as_str() {
            Some(text) => Cow::Borrowed(text),
            None => {
                user_properties.insert(BODY_ENCODING_PROPERTY, "base64");
                Cow::Owned(STANDARD.encode(&message.body))
            }
        };

        Self {
            body,
            broker_properties: BrokerProperties {
                message_id: message.message_id.as_ref().map(|id| id.as_str()),
                correlation_id: message.correlation_id.as_deref(),
                content_type: message.content_type.as_deref(),
                time_to_live: message.time_to_live.map(|ttl| ttl.as_secs_f64()),
            },
            user_properties,
        }
    }
}

/// Size of a message's entry in the batch payload, separator included
fn rest_message_size(message: &Message) -> usize {
    serde_json::to_vec(&RestMessage::from_message(message))
        .map(|entry| entry.len() + 1)
        // An entry that cannot be encoded never fits a batch
        .unwrap_or(usize::MAX)
}

fn encode_batch(messages: &[Message]) -> Result<Vec<u8>, QueueError> {
    let entries: Vec<RestMessage<'_>> = messages.iter().map(RestMessage::from_message).collect();
    serde_json::to_vec(&entries).map_err(|e| QueueError::SerializationError(SerializationError::JsonError(e)))
}

/// Extract the `<Detail>` text from a Service Bus XML error body
fn parse_error_detail(body: &str) -> Option<String> {
    use quick_xml::events::Event;
    use quick_xml::Reader;

    let mut reader = Reader::from_str(body);
    reader.trim_text(true);

    let mut in_detail = false;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) if e.name().as_ref() == b"Detail" => in_detail = true,
            Ok(Event::Text(e)) if in_detail => {
                return e.unescape().ok().map(|s| s.into_owned());
            }
            Ok(Event::Eof) | Err(_) => return None,
            _ => {}
        }
        buf.clear();
    }
}

// ============================================================================
// Azure Service Bus Client
// ============================================================================

/// Azure Service Bus client owning the HTTP connection pool
///
/// Senders created from the client share its HTTP client and credentials.
/// The client is safe to share between tasks.
pub struct AzureServiceBusClient {
    http_client: HttpClient,
    connection: ServiceBusConnectionString,
    config: AzureServiceBusConfig,
    closed: Arc<AtomicBool>,
    senders: Mutex<Vec<Arc<AzureServiceBusSender>>>,
}

impl AzureServiceBusClient {
    /// Create new Azure Service Bus client
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - The connection string is malformed or misses credentials
    /// - The HTTP client cannot be created
    pub fn new(config: AzureServiceBusConfig) -> Result<Self, QueueError> {
        config.validate()?;
        let connection = config.parsed_connection_string()?;

        let http_client = HttpClient::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .build()
            .map_err(|e| QueueError::ConnectionFailed {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        debug!(
            endpoint = %connection.endpoint(),
            key_name = %connection.shared_access_key_name(),
            "Created Azure Service Bus client"
        );

        Ok(Self {
            http_client,
            connection,
            config,
            closed: Arc::new(AtomicBool::new(false)),
            senders: Mutex::new(Vec::new()),
        })
    }

    fn batch_limits(&self) -> BatchLimits {
        let limits = BatchLimits::by_size(self.config.max_batch_size_in_bytes)
            .with_framing_overhead(BATCH_FRAMING_OVERHEAD);
        match self.config.max_messages_per_batch {
            Some(max) => limits.with_max_messages(max),
            None => limits,
        }
    }

    fn lock_poisoned() -> QueueError {
        QueueError::ProviderError {
            provider: ProviderType::AzureServiceBus.to_string(),
            code: "LockPoisoned".to_string(),
            message: "sender registry lock was poisoned".to_string(),
            transient: false,
        }
    }
}

#[async_trait]
impl QueueClient for AzureServiceBusClient {
    fn create_sender(&self, queue: &QueueName) -> Result<Arc<dyn QueueSender>, QueueError> {
        if self.is_closed() {
            return Err(QueueError::ClientClosed {
                entity: "Service Bus client".to_string(),
            });
        }

        if let Some(entity) = self.connection.entity_path() {
            if entity != queue.as_str() {
                return Err(QueueError::ConfigurationError(ConfigurationError::Invalid {
                    message: format!(
                        "connection string is scoped to '{}' but sender targets '{}'",
                        entity, queue
                    ),
                }));
            }
        }

        let queue_url = self
            .connection
            .endpoint()
            .join(&format!("{}/", queue))
            .map_err(|e| {
                QueueError::ConfigurationError(ConfigurationError::Invalid {
                    message: format!("Cannot build URL for queue '{}': {}", queue, e),
                })
            })?;
        let messages_url = queue_url.join("messages").map_err(|e| {
            QueueError::ConfigurationError(ConfigurationError::Invalid {
                message: format!("Cannot build URL for queue '{}': {}", queue, e),
            })
        })?;
        let resource_uri = queue_url.as_str().trim_end_matches('/').to_lowercase();

        let sender = Arc::new(AzureServiceBusSender {
            queue_name: queue.clone(),
            messages_url,
            resource_uri,
            http_client: self.http_client.clone(),
            signer: SasTokenSigner::new(&self.connection, self.config.token_lifetime_seconds),
            limits: self.batch_limits(),
            request_timeout: Duration::from_secs(self.config.request_timeout_seconds),
            closed: AtomicBool::new(false),
            client_closed: Arc::clone(&self.closed),
        });

        self.senders
            .lock()
            .map_err(|_| Self::lock_poisoned())?
            .push(Arc::clone(&sender));

        debug!(queue = %queue, "Created Service Bus sender");
        Ok(sender)
    }

    async fn close(&self) -> Result<(), QueueError> {
        self.closed.store(true, Ordering::SeqCst);

        let senders = std::mem::take(&mut *self.senders.lock().map_err(|_| Self::lock_poisoned())?);
        for sender in senders {
            sender.close().await?;
        }

        debug!("Service Bus client closed");
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn provider_type(&self) -> ProviderType {
        ProviderType::AzureServiceBus
    }
}

// ============================================================================
// Azure Service Bus Sender
// ============================================================================

/// Sender publishing batches to a single Service Bus queue
pub struct AzureServiceBusSender {
    queue_name: QueueName,
    messages_url: Url,
    resource_uri: String,
    http_client: HttpClient,
    signer: SasTokenSigner,
    limits: BatchLimits,
    request_timeout: Duration,
    closed: AtomicBool,
    client_closed: Arc<AtomicBool>,
}

impl AzureServiceBusSender {
    fn ensure_open(&self) -> Result<(), QueueError> {
        if self.is_closed() {
            return Err(QueueError::ClientClosed {
                entity: format!("sender for queue '{}'", self.queue_name),
            });
        }
        Ok(())
    }

    /// Map a failed HTTP exchange onto a queue error
    fn classify_request_error(&self, error: reqwest::Error) -> QueueError {
        if error.is_timeout() {
            QueueError::Timeout {
                duration: self.request_timeout,
            }
        } else if error.is_connect() {
            QueueError::ConnectionFailed {
                message: format!("Connection failed: {}", error),
            }
        } else {
            QueueError::ConnectionFailed {
                message: format!("HTTP request failed: {}", error),
            }
        }
    }

    /// Map a non-success HTTP status onto a queue error
    fn classify_status(&self, status: StatusCode, body: &str, payload_size: usize) -> QueueError {
        let detail = parse_error_detail(body).unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("unknown error")
                .to_string()
        });
        let provider = ProviderType::AzureServiceBus.to_string();

        match status {
            StatusCode::UNAUTHORIZED => QueueError::AuthenticationFailed { message: detail },
            StatusCode::FORBIDDEN => QueueError::PermissionDenied {
                operation: format!("send to '{}': {}", self.queue_name, detail),
            },
            StatusCode::NOT_FOUND => QueueError::QueueNotFound {
                queue_name: self.queue_name.to_string(),
            },
            StatusCode::PAYLOAD_TOO_LARGE => QueueError::BatchTooLarge {
                size: payload_size,
                max_size: self.limits.max_size_in_bytes,
            },
            StatusCode::TOO_MANY_REQUESTS | StatusCode::SERVICE_UNAVAILABLE => {
                QueueError::ProviderError {
                    provider,
                    code: "ServerBusy".to_string(),
                    message: detail,
                    transient: true,
                }
            }
            s if s.is_server_error() => QueueError::ProviderError {
                provider,
                code: s.as_u16().to_string(),
                message: detail,
                transient: true,
            },
            s => QueueError::ProviderError {
                provider,
                code: s.as_u16().to_string(),
                message: detail,
                transient: false,
            },
        }
    }
}

#[async_trait]
impl QueueSender for AzureServiceBusSender {
    fn create_message_batch(&self) -> Result<MessageBatch, QueueError> {
        self.ensure_open()?;
        Ok(MessageBatch::new(self.limits, rest_message_size))
    }

    async fn send_message_batch(&self, batch: MessageBatch) -> Result<(), QueueError> {
        self.ensure_open()?;

        if batch.is_empty() {
            debug!(queue = %self.queue_name, "Ignoring empty batch");
            return Ok(());
        }

        let message_count = batch.len();
        let payload = encode_batch(batch.messages())?;
        let payload_size = payload.len();
        let token = self.signer.generate(&self.resource_uri, Utc::now())?;

        debug!(
            queue = %self.queue_name,
            messages = message_count,
            bytes = payload_size,
            "Sending batch to Service Bus"
        );

        let response = self
            .http_client
            .post(self.messages_url.clone())
            .header(AUTHORIZATION, token)
            .header(CONTENT_TYPE, BATCH_CONTENT_TYPE)
            .body(payload)
            .send()
            .await
            .map_err(|e| self.classify_request_error(e))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        let error = self.classify_status(status, &body, payload_size);
        warn!(
            queue = %self.queue_name,
            status = status.as_u16(),
            error = %error,
            "Service Bus rejected batch"
        );
        Err(error)
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
