//! # Queue Producer HTTP Service
//!
//! HTTP server that publishes reservation messages to a queue when triggered.
//!
//! This service provides:
//! - The producer trigger endpoint (`GET`/`POST`, default `/api/producer`)
//! - Liveness and readiness endpoints
//! - A Prometheus metrics endpoint
//!
//! The queue client and sender are opened once at start-up, shared by all
//! requests through [`AppState`], and closed after the server has drained.

pub mod config;
pub mod errors;
pub mod metrics;
pub mod responses;

pub use config::{LoggingConfig, ProducerConfig, QueueConfig, ServerConfig, ServiceConfig};
pub use errors::{ConfigError, ProducerHandlerError, ServiceError};
pub use metrics::ServiceMetrics;
pub use responses::{HealthResponse, ReadinessResponse, TriggerResponse};

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use queue_producer_core::{MessagePublisher, PublishReport, ReservationMessageFactory};
use std::{
    future::{Future, IntoFuture},
    net::SocketAddr,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};
use tokio::net::TcpListener;
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, instrument, warn};

// ============================================================================
// Application State
// ============================================================================

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Configuration for the service
    pub config: ServiceConfig,

    /// Publisher owning the queue client and sender
    pub publisher: Arc<MessagePublisher>,

    /// Builds the messages sent per trigger
    pub message_factory: Arc<ReservationMessageFactory>,

    /// Metrics collector for observability
    pub metrics: Arc<ServiceMetrics>,

    /// Set once shutdown has been requested
    pub shutting_down: Arc<AtomicBool>,
}

impl AppState {
    /// Create new application state
    pub fn new(
        config: ServiceConfig,
        publisher: Arc<MessagePublisher>,
        metrics: Arc<ServiceMetrics>,
    ) -> Self {
        let message_factory = Arc::new(ReservationMessageFactory::new(
            config.producer.reservation_ids.clone(),
        ));

        Self {
            config,
            publisher,
            message_factory,
            metrics,
            shutting_down: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Whether the service should receive traffic
    pub fn is_ready(&self) -> bool {
        !self.shutting_down.load(Ordering::SeqCst) && self.publisher.is_ready()
    }
}

// ============================================================================
// HTTP Server
// ============================================================================

/// Create HTTP router with all endpoints
pub fn create_router(state: AppState) -> Router {
    let trigger_routes = Router::new().route(
        &state.config.server.trigger_path,
        get(handle_trigger).post(handle_trigger),
    );

    let health_routes = Router::new()
        .route("/health", get(handle_health_check))
        .route("/ready", get(handle_readiness_check));

    let observability_routes = Router::new().route("/metrics", get(metrics_endpoint));

    let mut router = Router::new()
        .merge(trigger_routes)
        .merge(health_routes)
        .merge(observability_routes);

    if state.config.server.enable_compression {
        router = router.layer(CompressionLayer::new());
    }
    if state.config.server.enable_cors {
        router = router.layer(CorsLayer::permissive());
    }

    router
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start HTTP server
///
/// Binds the configured address, serves until SIGINT or SIGTERM, drains
/// in-flight requests, then shuts the publisher down.
pub async fn start_server(
    config: ServiceConfig,
    publisher: Arc<MessagePublisher>,
) -> Result<(), ServiceError> {
    let metrics = ServiceMetrics::new().map_err(|e| {
        ServiceError::Configuration(ConfigError::Invalid {
            message: format!("Failed to initialize metrics: {}", e),
        })
    })?;

    let address = format!("{}:{}", config.server.host, config.server.port);
    let addr: SocketAddr = address.parse().map_err(|e| {
        ServiceError::Configuration(ConfigError::Invalid {
            message: format!("Invalid listen address '{}': {}", address, e),
        })
    })?;

    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| ServiceError::BindFailed {
            address: addr.to_string(),
            message: e.to_string(),
        })?;

    info!("Starting HTTP server on {}", addr);

    let state = AppState::new(config, publisher, metrics);
    serve(listener, state, shutdown_signal()).await
}

/// Serve `state` on `listener` until `shutdown` resolves
///
/// After `shutdown` resolves, readiness turns false, new connections are
/// refused and in-flight requests get `server.shutdown_timeout_seconds` to
/// finish. The publisher is shut down afterwards in every case.
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> Result<(), ServiceError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let shutdown_timeout = Duration::from_secs(state.config.server.shutdown_timeout_seconds);
    let publisher = Arc::clone(&state.publisher);
    let shutting_down = Arc::clone(&state.shutting_down);
    let (drain_started, mut drain_rx) = tokio::sync::watch::channel(false);

    let app = create_router(state);

    let server = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown.await;
            shutting_down.store(true, Ordering::SeqCst);
            info!(
                "Shutdown requested, draining requests with {}s timeout",
                shutdown_timeout.as_secs()
            );
            let _ = drain_started.send(true);
        })
        .into_future();

    let drain_deadline = async move {
        if drain_rx.wait_for(|started| *started).await.is_err() {
            std::future::pending::<()>().await;
        }
        tokio::time::sleep(shutdown_timeout).await;
    };

    let result = tokio::select! {
        result = server => result.map_err(|e| ServiceError::ServerFailed {
            message: e.to_string(),
        }),
        _ = drain_deadline => {
            warn!(
                timeout_seconds = shutdown_timeout.as_secs(),
                "Graceful shutdown timed out; abandoning in-flight requests"
            );
            Ok(())
        }
    };

    publisher.shutdown().await;

    info!("HTTP server shutdown complete");
    result
}

/// Resolve on SIGINT (Ctrl+C) or, on Unix, SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT (Ctrl+C)"),
        _ = terminate => info!("Received SIGTERM"),
    }
}

// ============================================================================
// Producer Handlers
// ============================================================================

/// Publish the configured reservation messages
///
/// No request body or parameters are read. The response reports how many
/// messages and batches were sent; on failure the error body reports how many
/// messages reached the queue before the failure.
#[instrument(skip(state), fields(queue = %state.publisher.queue_name()))]
pub async fn handle_trigger(
    State(state): State<AppState>,
) -> Result<Json<TriggerResponse>, ProducerHandlerError> {
    info!("Creating reservation ...");

    let started = Instant::now();
    let outcome = publish_reservations(&state).await;
    let elapsed = started.elapsed();

    match outcome {
        Ok(report) => {
            state
                .metrics
                .record_trigger_success(elapsed, report.messages_sent, report.batches_sent);
            Ok(Json(TriggerResponse::from(report)))
        }
        Err(e) => {
            state
                .metrics
                .record_trigger_failure(elapsed, e.messages_sent());
            Err(e)
        }
    }
}

async fn publish_reservations(state: &AppState) -> Result<PublishReport, ProducerHandlerError> {
    let messages = state
        .message_factory
        .create_messages()
        .map_err(ProducerHandlerError::MessageCreation)?;

    Ok(state.publisher.publish(messages).await?)
}

// ============================================================================
// Health Check Handlers
// ============================================================================

/// Basic health check endpoint
#[instrument(skip(_state))]
async fn handle_health_check(State(_state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: chrono::Utc::now(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Readiness check for Kubernetes
#[instrument(skip(state))]
async fn handle_readiness_check(State(state): State<AppState>) -> (StatusCode, Json<ReadinessResponse>) {
    let ready = state.is_ready();

    let response = ReadinessResponse {
        ready,
        queue: state.publisher.queue_name().to_string(),
        timestamp: chrono::Utc::now(),
    };

    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status, Json(response))
}

// ============================================================================
// Observability Handlers
// ============================================================================

/// Prometheus metrics endpoint
#[instrument(skip_all)]
async fn metrics_endpoint(State(state): State<AppState>) -> Response {
    match state.metrics.render() {
        Ok(body) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "Failed to encode metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
