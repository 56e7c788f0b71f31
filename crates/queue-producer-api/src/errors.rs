//! Error types for the HTTP service

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use queue_producer_core::PublishError;
use queue_runtime::{ConfigurationError, QueueError};
use tracing::{error, warn};

#[cfg(test)]
#[path = "errors_tests.rs"]
mod tests;

/// Retry-After used for transient failures without a provider hint
const DEFAULT_RETRY_AFTER_SECONDS: u64 = 5;

/// Producer trigger errors with HTTP status code mapping
///
/// - `500 Internal Server Error`: the configured messages cannot be built or
///   one of them can never fit a batch. Retrying does not help.
/// - `502 Bad Gateway`: the queue service rejected the batch permanently
///   (authentication, missing queue, quota)
/// - `503 Service Unavailable`: the queue service is temporarily unavailable
///   or the service is shutting down. Includes `Retry-After` when transient.
///
/// Every error body reports how many messages reached the queue, since batches
/// sent before a failure are not rolled back.
#[derive(Debug, thiserror::Error)]
pub enum ProducerHandlerError {
    /// The configured messages could not be built
    #[error("Failed to create messages: {0}")]
    MessageCreation(#[source] QueueError),

    /// Publishing stopped before every message was sent
    #[error("Publish failed: {0}")]
    Publish(#[from] PublishError),
}

impl ProducerHandlerError {
    /// Messages that reached the queue before the failure
    pub fn messages_sent(&self) -> usize {
        match self {
            Self::MessageCreation(_) => 0,
            Self::Publish(e) => e.messages_sent(),
        }
    }

    /// HTTP status this error maps to
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::MessageCreation(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Publish(PublishError::OversizedMessage { .. }) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::Publish(e) => match e.queue_error() {
                Some(QueueError::ClientClosed { .. }) => StatusCode::SERVICE_UNAVAILABLE,
                _ if e.is_transient() => StatusCode::SERVICE_UNAVAILABLE,
                _ => StatusCode::BAD_GATEWAY,
            },
        }
    }

    fn retry_after_seconds(&self) -> Option<u64> {
        match self {
            Self::Publish(e) if e.is_transient() => Some(
                e.retry_after()
                    .map(|d| d.as_secs().max(1))
                    .unwrap_or(DEFAULT_RETRY_AFTER_SECONDS),
            ),
            _ => None,
        }
    }
}

impl IntoResponse for ProducerHandlerError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let retry_after = self.retry_after_seconds();
        let messages_sent = self.messages_sent();

        let (message, position) = match &self {
            Self::MessageCreation(e) => {
                // Log detailed error server-side but return generic message to client
                error!(error = %e, "Failed to create reservation messages");
                (
                    "Internal server error occurred. Please try again later.".to_string(),
                    None,
                )
            }
            Self::Publish(PublishError::OversizedMessage { position, .. }) => {
                error!(error = %self, "Configured message can never be sent");
                (self.to_string(), Some(*position))
            }
            Self::Publish(e) => {
                let message = match e.queue_error() {
                    Some(cause) => format!("{}: {}", self, cause),
                    None => self.to_string(),
                };
                if e.is_transient() {
                    warn!(error = %message, messages_sent, "Transient publish failure");
                } else {
                    error!(error = %message, messages_sent, "Publish failed");
                }
                (message, None)
            }
        };

        // Build JSON error response
        let mut body = serde_json::json!({
            "error": message,
            "status": status.as_u16(),
            "messages_sent": messages_sent,
            "timestamp": chrono::Utc::now().to_rfc3339(),
        });
        if let Some(position) = position {
            body["position"] = serde_json::json!(position);
        }

        let mut response = (status, Json(body)).into_response();

        // Add Retry-After header for retryable errors
        if let Some(retry_seconds) = retry_after {
            if let Ok(header_value) = retry_seconds.to_string().parse() {
                response.headers_mut().insert("Retry-After", header_value);
            }
        }

        response
    }
}

/// Service-level errors
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Failed to bind to address {address}: {message}")]
    BindFailed { address: String, message: String },

    #[error("Server failed: {message}")]
    ServerFailed { message: String },

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Missing required configuration: {key}")]
    Missing { key: String },

    #[error("Invalid queue provider configuration: {0}")]
    Provider(#[from] ConfigurationError),
}
