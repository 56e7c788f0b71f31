//! Tests for batch packing and the publisher lifecycle.

use super::*;
use async_trait::async_trait;
use queue_runtime::{
    BatchLimits, InMemoryClient, InMemoryConfig, MessageBatch, ProviderType,
};
use std::sync::atomic::AtomicUsize;
use std::sync::Mutex;

// ============================================================================
// Test Doubles
// ============================================================================

fn body_size(message: &Message) -> usize {
    message.body.len()
}

/// Sender that sizes messages by body length and records every batch sent
struct RecordingSender {
    queue_name: QueueName,
    limits: BatchLimits,
    batches: Mutex<Vec<Vec<String>>>,
    batches_created: AtomicUsize,
    fail_send_number: Option<usize>,
    closed: AtomicBool,
}

impl RecordingSender {
    fn with_capacity(max_size_in_bytes: usize) -> Self {
        Self::with_limits(BatchLimits::by_size(max_size_in_bytes))
    }

    fn with_limits(limits: BatchLimits) -> Self {
        Self {
            queue_name: "reservations".parse().unwrap(),
            limits,
            batches: Mutex::new(Vec::new()),
            batches_created: AtomicUsize::new(0),
            fail_send_number: None,
            closed: AtomicBool::new(false),
        }
    }

    /// Fail the n-th send call (1-based) with a timeout
    fn failing_on_send(mut self, send_number: usize) -> Self {
        self.fail_send_number = Some(send_number);
        self
    }

    fn sent_batches(&self) -> Vec<Vec<String>> {
        self.batches.lock().unwrap().clone()
    }

    fn sent_bodies(&self) -> Vec<String> {
        self.sent_batches().into_iter().flatten().collect()
    }

    fn batches_created(&self) -> usize {
        self.batches_created.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl QueueSender for RecordingSender {
    fn create_message_batch(&self) -> Result<MessageBatch, QueueError> {
        if self.is_closed() {
            return Err(QueueError::ClientClosed {
                entity: "recording sender".to_string(),
            });
        }
        self.batches_created.fetch_add(1, Ordering::SeqCst);
        Ok(MessageBatch::new(self.limits, body_size))
    }

    async fn send_message_batch(&self, batch: MessageBatch) -> Result<(), QueueError> {
        let mut batches = self.batches.lock().unwrap();
        if self.fail_send_number == Some(batches.len() + 1) {
            return Err(QueueError::Timeout {
                duration: std::time::Duration::from_secs(30),
            });
        }

        batches.push(
            batch
                .messages()
                .iter()
                .map(|m| m.body_as_str().unwrap().to_string())
                .collect(),
        );
        Ok(())
    }

    async fn close(&self) -> Result<(), QueueError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn queue_name(&self) -> &QueueName {
        &self.queue_name
    }
}

fn messages(bodies: &[&str]) -> Vec<Message> {
    bodies.iter().map(|b| Message::from_text(b)).collect()
}

fn strings(bodies: &[&str]) -> Vec<String> {
    bodies.iter().map(|b| b.to_string()).collect()
}

// ============================================================================
// Batch Packer Tests
// ============================================================================

mod publish_all_tests {
    use super::*;

    #[tokio::test]
    async fn test_all_fitting_messages_are_sent_in_order() {
        // Arrange
        let sender = RecordingSender::with_capacity(25);
        let bodies = ["aaaaaaaaa1", "aaaaaaaaa2", "aaaaaaaaa3", "aaaaaaaaa4", "aaaaaaaaa5"];

        // Act
        let report = publish_all(&sender, messages(&bodies)).await.unwrap();

        // Assert
        assert_eq!(report.messages_sent, 5);
        assert_eq!(report.batches_sent, 3);
        assert_eq!(report.queue_name.as_str(), "reservations");
        assert_eq!(sender.sent_bodies(), strings(&bodies));
        assert_eq!(
            sender.sent_batches(),
            vec![
                strings(&["aaaaaaaaa1", "aaaaaaaaa2"]),
                strings(&["aaaaaaaaa3", "aaaaaaaaa4"]),
                strings(&["aaaaaaaaa5"]),
            ]
        );
    }

    #[tokio::test]
    async fn test_empty_input_creates_no_batches() {
        let sender = RecordingSender::with_capacity(25);

        let report = publish_all(&sender, Vec::new()).await.unwrap();

        assert_eq!(report.messages_sent, 0);
        assert_eq!(report.batches_sent, 0);
        assert_eq!(sender.batches_created(), 0);
        assert!(sender.sent_batches().is_empty());
    }

    #[tokio::test]
    async fn test_messages_within_capacity_use_one_batch() {
        let sender = RecordingSender::with_limits(BatchLimits::by_size(1024).with_max_messages(3));

        let report = publish_all(&sender, messages(&["m1", "m2", "m3"])).await.unwrap();

        assert_eq!(report.batches_sent, 1);
        assert_eq!(sender.sent_batches(), vec![strings(&["m1", "m2", "m3"])]);
    }

    #[tokio::test]
    async fn test_overflow_starts_new_batch_with_rejected_message() {
        // Arrange
        let sender = RecordingSender::with_limits(BatchLimits::by_size(1024).with_max_messages(2));

        // Act
        let report = publish_all(&sender, messages(&["m1", "m2", "m3"])).await.unwrap();

        // Assert
        assert_eq!(report.messages_sent, 3);
        assert_eq!(
            sender.sent_batches(),
            vec![strings(&["m1", "m2"]), strings(&["m3"])]
        );
    }

    #[tokio::test]
    async fn test_smaller_later_message_is_not_pulled_forward() {
        let sender = RecordingSender::with_capacity(10);

        publish_all(&sender, messages(&["123456", "12345", "1"])).await.unwrap();

        assert_eq!(
            sender.sent_batches(),
            vec![strings(&["123456"]), strings(&["12345", "1"])]
        );
    }

    #[tokio::test]
    async fn test_oversized_message_stops_publishing() {
        // Arrange
        let sender = RecordingSender::with_capacity(25);
        let oversized = "x".repeat(100);
        let bodies = ["aaaaaaaaa1", "aaaaaaaaa2", oversized.as_str(), "aaaaaaaaa4"];

        // Act
        let result = publish_all(&sender, messages(&bodies)).await;

        // Assert
        match result {
            Err(PublishError::OversizedMessage {
                position,
                size_in_bytes,
                max_size_in_bytes,
                messages_sent,
            }) => {
                assert_eq!(position, 3);
                assert_eq!(size_in_bytes, 100);
                assert_eq!(max_size_in_bytes, 25);
                assert_eq!(messages_sent, 2);
            }
            other => panic!("Expected OversizedMessage, got {:?}", other),
        }
        assert_eq!(sender.sent_bodies(), strings(&["aaaaaaaaa1", "aaaaaaaaa2"]));
    }

    #[tokio::test]
    async fn test_single_oversized_message_sends_nothing() {
        let sender = RecordingSender::with_capacity(4);

        let result = publish_all(&sender, messages(&["too large"])).await;

        match result {
            Err(error @ PublishError::OversizedMessage { position: 1, .. }) => {
                assert_eq!(error.messages_sent(), 0);
            }
            other => panic!("Expected OversizedMessage at position 1, got {:?}", other),
        }
        assert!(sender.sent_batches().is_empty());
    }

    #[tokio::test]
    async fn test_send_failure_is_passed_through_with_progress() {
        // Arrange
        let sender = RecordingSender::with_limits(BatchLimits::by_size(1024).with_max_messages(2))
            .failing_on_send(2);

        // Act
        let result = publish_all(&sender, messages(&["m1", "m2", "m3", "m4", "m5"])).await;

        // Assert
        match result {
            Err(PublishError::Transport {
                messages_sent,
                batches_sent,
                source: QueueError::Timeout { .. },
            }) => {
                assert_eq!(messages_sent, 2);
                assert_eq!(batches_sent, 1);
            }
            other => panic!("Expected Transport timeout, got {:?}", other),
        }
        assert_eq!(sender.sent_batches(), vec![strings(&["m1", "m2"])]);
        assert_eq!(sender.batches_created(), 2, "No batch after the failed send");
    }

    #[tokio::test]
    async fn test_closed_sender_reports_batch_unavailable() {
        let sender = RecordingSender::with_capacity(25);
        sender.close().await.unwrap();

        let result = publish_all(&sender, messages(&["m1"])).await;

        assert!(matches!(
            result,
            Err(PublishError::BatchUnavailable {
                messages_sent: 0,
                source: QueueError::ClientClosed { .. },
            })
        ));
    }

    #[tokio::test]
    async fn test_in_memory_queue_receives_batches_in_order() {
        // Arrange
        let client = InMemoryClient::new(InMemoryConfig {
            max_batch_size_in_bytes: 4,
            ..Default::default()
        });
        let queue: QueueName = "reservations".parse().unwrap();
        let sender = client.create_sender(&queue).unwrap();

        // Act
        let report = publish_all(sender.as_ref(), messages(&["ab", "cd", "ef"]))
            .await
            .unwrap();

        // Assert
        assert_eq!(report.batches_sent, 2);
        let delivered: Vec<_> = client
            .delivered_messages(&queue)
            .into_iter()
            .map(|d| (d.batch_number, d.message.body_as_str().unwrap().to_string()))
            .collect();
        assert_eq!(
            delivered,
            vec![
                (1, "ab".to_string()),
                (1, "cd".to_string()),
                (2, "ef".to_string()),
            ]
        );
    }
}

// ============================================================================
// Message Publisher Tests
// ============================================================================

mod message_publisher_tests {
    use super::*;

    /// Client whose close always fails
    struct FailingCloseClient {
        sender: Arc<RecordingSender>,
        close_calls: AtomicUsize,
    }

    #[async_trait]
    impl QueueClient for FailingCloseClient {
        fn create_sender(&self, _queue: &QueueName) -> Result<Arc<dyn QueueSender>, QueueError> {
            let sender: Arc<dyn QueueSender> = self.sender.clone();
            Ok(sender)
        }

        async fn close(&self) -> Result<(), QueueError> {
            self.close_calls.fetch_add(1, Ordering::SeqCst);
            Err(QueueError::ConnectionFailed {
                message: "connection reset during close".to_string(),
            })
        }

        fn is_closed(&self) -> bool {
            false
        }

        fn provider_type(&self) -> ProviderType {
            ProviderType::InMemory
        }
    }

    fn in_memory_publisher() -> (Arc<InMemoryClient>, MessagePublisher) {
        let client = Arc::new(InMemoryClient::default());
        let publisher =
            MessagePublisher::connect(client.clone(), "reservations".parse().unwrap()).unwrap();
        (client, publisher)
    }

    #[tokio::test]
    async fn test_publish_delivers_to_queue() {
        // Arrange
        let (client, publisher) = in_memory_publisher();

        // Act
        let report = publisher.publish(messages(&["m1", "m2"])).await.unwrap();

        // Assert
        assert_eq!(report.messages_sent, 2);
        assert_eq!(report.batches_sent, 1);
        assert_eq!(client.message_count(publisher.queue_name()), 2);
        assert!(publisher.is_ready());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_publishes_share_one_sender() {
        // Arrange
        let client = Arc::new(InMemoryClient::new(InMemoryConfig {
            max_messages_per_batch: Some(3),
            ..Default::default()
        }));
        let publisher = Arc::new(
            MessagePublisher::connect(client.clone(), "reservations".parse().unwrap()).unwrap(),
        );
        let callers = 4;
        let per_caller = 10;

        // Act
        let mut tasks = tokio::task::JoinSet::new();
        for caller in 0..callers {
            let publisher = Arc::clone(&publisher);
            tasks.spawn(async move {
                let bodies: Vec<String> = (0..per_caller)
                    .map(|i| format!("c{}-{:02}", caller, i))
                    .collect();
                let refs: Vec<&str> = bodies.iter().map(String::as_str).collect();
                publisher.publish(messages(&refs)).await
            });
        }

        let mut reports = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            reports.push(joined.unwrap().unwrap());
        }

        // Assert
        assert_eq!(reports.len(), callers);
        assert!(reports.iter().all(|r| r.messages_sent == per_caller));

        let delivered: Vec<String> = client
            .delivered_messages(publisher.queue_name())
            .into_iter()
            .map(|d| d.message.body_as_str().unwrap().to_string())
            .collect();
        assert_eq!(delivered.len(), callers * per_caller);

        for caller in 0..callers {
            let prefix = format!("c{}-", caller);
            let own: Vec<&String> = delivered.iter().filter(|b| b.starts_with(&prefix)).collect();
            let expected: Vec<String> = (0..per_caller)
                .map(|i| format!("c{}-{:02}", caller, i))
                .collect();
            assert_eq!(own, expected.iter().collect::<Vec<_>>());
        }
    }

    #[tokio::test]
    async fn test_shutdown_closes_client_and_rejects_publish() {
        let (client, publisher) = in_memory_publisher();

        publisher.shutdown().await;
        let result = publisher.publish(messages(&["late"])).await;

        assert!(client.is_closed());
        assert!(!publisher.is_ready());
        assert!(matches!(result, Err(PublishError::BatchUnavailable { .. })));
    }

    #[tokio::test]
    async fn test_shutdown_is_idempotent_and_tolerates_close_failure() {
        // Arrange
        let sender = Arc::new(RecordingSender::with_capacity(25));
        let client = Arc::new(FailingCloseClient {
            sender: sender.clone(),
            close_calls: AtomicUsize::new(0),
        });
        let publisher =
            MessagePublisher::connect(client.clone(), "reservations".parse().unwrap()).unwrap();

        // Act
        publisher.shutdown().await;
        publisher.shutdown().await;

        // Assert
        assert!(sender.is_closed());
        assert_eq!(client.close_calls.load(Ordering::SeqCst), 1);
        assert!(!publisher.is_ready());
    }

    #[tokio::test]
    async fn test_connect_fails_on_closed_client() {
        let client = Arc::new(InMemoryClient::default());
        client.close().await.unwrap();

        let result = MessagePublisher::connect(client, "reservations".parse().unwrap());

        assert!(matches!(result, Err(QueueError::ClientClosed { .. })));
    }
}
