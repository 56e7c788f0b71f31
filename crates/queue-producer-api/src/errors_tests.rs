//! Tests for HTTP error mapping.

use super::*;
use std::time::Duration;

fn transport(source: QueueError) -> ProducerHandlerError {
    ProducerHandlerError::Publish(PublishError::Transport {
        messages_sent: 2,
        batches_sent: 1,
        source,
    })
}

async fn json_body(response: Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[test]
fn test_status_codes_follow_error_classification() {
    let oversized = ProducerHandlerError::Publish(PublishError::OversizedMessage {
        position: 1,
        size_in_bytes: 300,
        max_size_in_bytes: 256,
        messages_sent: 0,
    });
    let throttled = transport(QueueError::ProviderError {
        provider: "AzureServiceBus".to_string(),
        code: "ServerBusy".to_string(),
        message: "throttled".to_string(),
        transient: true,
    });
    let unauthorized = transport(QueueError::AuthenticationFailed {
        message: "ExpiredToken".to_string(),
    });
    let closed = ProducerHandlerError::Publish(PublishError::BatchUnavailable {
        messages_sent: 0,
        source: QueueError::ClientClosed {
            entity: "sender".to_string(),
        },
    });

    assert_eq!(oversized.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(throttled.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(unauthorized.status_code(), StatusCode::BAD_GATEWAY);
    assert_eq!(closed.status_code(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_transient_error_response_has_retry_after_and_progress() {
    // Arrange
    let error = transport(QueueError::ConnectionFailed {
        message: "reset".to_string(),
    });

    // Act
    let response = error.into_response();

    // Assert
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(response.headers().get("Retry-After").unwrap(), "5");
    let body = json_body(response).await;
    assert_eq!(body["status"], 503);
    assert_eq!(body["messages_sent"], 2);
    assert!(body["timestamp"].is_string());
}

#[tokio::test]
async fn test_oversized_error_response_reports_position() {
    let error = ProducerHandlerError::Publish(PublishError::OversizedMessage {
        position: 3,
        size_in_bytes: 300,
        max_size_in_bytes: 256,
        messages_sent: 2,
    });

    let response = error.into_response();

    assert!(response.headers().get("Retry-After").is_none());
    let body = json_body(response).await;
    assert_eq!(body["position"], 3);
    assert_eq!(body["messages_sent"], 2);
}

#[tokio::test]
async fn test_message_creation_error_hides_details() {
    let error = ProducerHandlerError::MessageCreation(QueueError::ValidationError(
        queue_runtime::ValidationError::Required {
            field: "body".to_string(),
        },
    ));

    let response = error.into_response();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = json_body(response).await;
    assert_eq!(
        body["error"],
        "Internal server error occurred. Please try again later."
    );
    assert_eq!(body["messages_sent"], 0);
}

#[test]
fn test_sub_second_retry_hint_rounds_up() {
    let error = transport(QueueError::Timeout {
        duration: Duration::from_millis(100),
    });

    assert_eq!(error.retry_after_seconds(), Some(1));
}

#[tokio::test]
async fn test_publish_error_body_names_queue_cause_once() {
    // Arrange
    let error = transport(QueueError::AuthenticationFailed {
        message: "ExpiredToken".to_string(),
    });

    // Act
    let response = error.into_response();

    // Assert
    let body = json_body(response).await;
    let message = body["error"].as_str().unwrap();
    assert!(message.starts_with("Publish failed: batch send failed after 2 messages"));
    assert_eq!(message.matches("ExpiredToken").count(), 1);
}
