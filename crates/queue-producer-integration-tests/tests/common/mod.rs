//! Common test utilities for queue-producer-api integration tests
//!
//! This module provides:
//! - A scripted queue client whose sends succeed or fail in a given order
//! - Builders for application state backed by in-memory or scripted clients
//! - Request and response helpers for driving the router

use axum::{
    body::Body,
    http::{Method, Request},
    response::Response,
};
use queue_producer_api::{create_router, AppState, ServiceConfig, ServiceMetrics};
use queue_producer_core::MessagePublisher;
use queue_runtime::{
    BatchLimits, InMemoryClient, InMemoryConfig, Message, MessageBatch, ProviderType, QueueClient,
    QueueError, QueueName, QueueSender,
};
use std::collections::VecDeque;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};
use tower::ServiceExt; // For `oneshot`

// ============================================================================
// Scripted Queue Client
// ============================================================================

/// Outcome of one scripted send
#[derive(Clone, Copy)]
#[allow(dead_code)]
pub enum SendOutcome {
    Accept,
    Reject(fn() -> QueueError),
}

/// Sender that plays back a script of send outcomes
///
/// Sends beyond the end of the script are accepted. Batches are sized by body
/// length so tests control packing exactly.
pub struct ScriptedSender {
    queue_name: QueueName,
    limits: BatchLimits,
    script: Mutex<VecDeque<SendOutcome>>,
    accepted: Mutex<Vec<Vec<Message>>>,
    attempts: Mutex<usize>,
    closed: AtomicBool,
}

impl ScriptedSender {
    #[allow(dead_code)]
    pub fn accepted_batches(&self) -> Vec<Vec<Message>> {
        self.accepted.lock().unwrap().clone()
    }

    #[allow(dead_code)]
    pub fn attempts(&self) -> usize {
        *self.attempts.lock().unwrap()
    }
}

fn body_size(message: &Message) -> usize {
    message.body.len()
}

#[async_trait::async_trait]
impl QueueSender for ScriptedSender {
    fn create_message_batch(&self) -> Result<MessageBatch, QueueError> {
        Ok(MessageBatch::new(self.limits, body_size))
    }

    async fn send_message_batch(&self, batch: MessageBatch) -> Result<(), QueueError> {
        *self.attempts.lock().unwrap() += 1;
        let outcome = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(SendOutcome::Accept);

        match outcome {
            SendOutcome::Accept => {
                self.accepted.lock().unwrap().push(batch.into_messages());
                Ok(())
            }
            SendOutcome::Reject(error) => Err(error()),
        }
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

/// Client handing out a single scripted sender
pub struct ScriptedClient {
    sender: Arc<ScriptedSender>,
    closed: AtomicBool,
}

impl ScriptedClient {
    #[allow(dead_code)]
    pub fn new(queue: &str, limits: BatchLimits, script: Vec<SendOutcome>) -> Self {
        Self {
            sender: Arc::new(ScriptedSender {
                queue_name: queue.parse().unwrap(),
                limits,
                script: Mutex::new(script.into()),
                accepted: Mutex::new(Vec::new()),
                attempts: Mutex::new(0),
                closed: AtomicBool::new(false),
            }),
            closed: AtomicBool::new(false),
        }
    }

    #[allow(dead_code)]
    pub fn sender(&self) -> Arc<ScriptedSender> {
        Arc::clone(&self.sender)
    }
}

#[async_trait::async_trait]
impl QueueClient for ScriptedClient {
    fn create_sender(&self, _queue: &QueueName) -> Result<Arc<dyn QueueSender>, QueueError> {
        let sender: Arc<dyn QueueSender> = self.sender.clone();
        Ok(sender)
    }

    async fn close(&self) -> Result<(), QueueError> {
        self.closed.store(true, Ordering::SeqCst);
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
// Application State Builders
// ============================================================================

/// Build application state around an already opened client
#[allow(dead_code)]
pub fn create_app_state(config: ServiceConfig, client: Arc<dyn QueueClient>) -> AppState {
    let queue = config.queue.queue_name().unwrap();
    let publisher = Arc::new(MessagePublisher::connect(client, queue).unwrap());
    AppState::new(config, publisher, ServiceMetrics::new().unwrap())
}

/// Default configuration backed by an in-memory queue
#[allow(dead_code)]
pub fn create_in_memory_app_state(in_memory: InMemoryConfig) -> (Arc<InMemoryClient>, AppState) {
    let client = Arc::new(InMemoryClient::new(in_memory));
    let state = create_app_state(ServiceConfig::default(), client.clone());
    (client, state)
}

/// Configuration publishing `reservation_ids` through a scripted client
#[allow(dead_code)]
pub fn create_scripted_app_state(
    reservation_ids: Vec<u64>,
    limits: BatchLimits,
    script: Vec<SendOutcome>,
) -> (Arc<ScriptedSender>, AppState) {
    let mut config = ServiceConfig::default();
    config.producer.reservation_ids = reservation_ids;

    let client = ScriptedClient::new(&config.queue.queue_name, limits, script);
    let sender = client.sender();
    let state = create_app_state(config, Arc::new(client));
    (sender, state)
}

#[allow(dead_code)]
pub fn reservations_queue() -> QueueName {
    "reservations".parse().unwrap()
}

// ============================================================================
// Request Helpers
// ============================================================================

/// Send a bodiless request through a fresh router
#[allow(dead_code)]
pub async fn send_request(state: AppState, method: Method, uri: &str) -> Response {
    create_router(state)
        .oneshot(
            Request::builder()
                .method(method)
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap()
}

#[allow(dead_code)]
pub async fn json_body(response: Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[allow(dead_code)]
pub async fn text_body(response: Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}
