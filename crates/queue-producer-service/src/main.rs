//! # Queue Producer Service
//!
//! Binary entry point for the queue producer HTTP service.
//!
//! This executable:
//! - Loads configuration from files and environment
//! - Initializes logging
//! - Opens the queue client and the publisher for the configured queue
//! - Starts the HTTP server from queue-producer-api
//!
//! Exit codes: 1 bind failure, 2 server failure, 3 configuration error,
//! 4 queue connection failure.

mod settings;

use clap::Parser;
use queue_producer_api::{start_server, LoggingConfig, ServiceError};
use queue_producer_core::MessagePublisher;
use queue_runtime::QueueClientFactory;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Publishes reservation messages to a queue on every HTTP trigger
#[derive(Debug, Parser)]
#[command(name = "queue-producer", version, about)]
struct Args {
    /// YAML configuration file applied after the default locations
    #[arg(long, env = "QP_CONFIG_FILE")]
    config_file: Option<PathBuf>,

    /// Validate the configuration and exit
    #[arg(long)]
    check_config: bool,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Logging settings come from the configuration, so load it first and
    // report a load failure once logging is up.
    let loaded = settings::load_config(args.config_file.as_deref());
    init_tracing(loaded.as_ref().map(|c| &c.logging).ok());

    info!("Starting Queue Producer Service");

    if let Some(path) = &args.config_file {
        info!(path = %path.display(), "Using explicit configuration file");
    }

    let service_config = match loaded {
        Ok(config) => config,
        Err(e) => {
            error!(
                error = %e,
                "Could not load service configuration; aborting. \
                 Fix the configuration and restart."
            );
            std::process::exit(3);
        }
    };

    if let Err(e) = service_config.validate() {
        error!(error = %e, "Service configuration is invalid; aborting");
        std::process::exit(3);
    }

    if args.check_config {
        info!("Configuration is valid");
        return;
    }

    let queue = match service_config.queue.queue_name() {
        Ok(queue) => queue,
        Err(e) => {
            error!(error = %e, "Service configuration is invalid; aborting");
            std::process::exit(3);
        }
    };

    // -------------------------------------------------------------------------
    // Open the queue client and sender once for the lifetime of the process.
    // They are closed by the server after it has drained.
    // -------------------------------------------------------------------------
    let client = match QueueClientFactory::create_client(service_config.queue.provider.clone()) {
        Ok(client) => client,
        Err(e) => {
            error!(error = %e, "Failed to open queue client; aborting");
            std::process::exit(4);
        }
    };

    let publisher = match MessagePublisher::connect(Arc::clone(&client), queue) {
        Ok(publisher) => Arc::new(publisher),
        Err(e) => {
            error!(error = %e, "Failed to open queue sender; aborting");
            if let Err(close_error) = client.close().await {
                warn!(error = %close_error, "Failed to close queue client");
            }
            std::process::exit(4);
        }
    };

    info!(
        host = %service_config.server.host,
        port = service_config.server.port,
        queue = %publisher.queue_name(),
        trigger_path = %service_config.server.trigger_path,
        "Starting HTTP server"
    );

    if let Err(e) = start_server(service_config, publisher).await {
        error!("Failed to start server: {}", e);

        let exit_code = match e {
            ServiceError::BindFailed { .. } => 1,
            ServiceError::ServerFailed { .. } => 2,
            ServiceError::Configuration(_) => 3,
        };

        std::process::exit(exit_code);
    }
}

// ============================================================================
// Private helpers
// ============================================================================

/// Install the global tracing subscriber
///
/// `RUST_LOG` takes precedence; otherwise the workspace crates log at the
/// configured level.
fn init_tracing(logging: Option<&LoggingConfig>) {
    let level = logging.map_or("info", |l| l.level.as_str());
    let json_format = logging.is_some_and(|l| l.json_format);

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directives(level)))
        .unwrap_or_else(|_| EnvFilter::new(default_directives("info")));

    let (json_layer, plain_layer) = if json_format {
        (Some(fmt::layer().json()), None)
    } else {
        (None, Some(fmt::layer()))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(json_layer)
        .with(plain_layer)
        .init();
}

fn default_directives(level: &str) -> String {
    format!(
        "queue_producer_service={level},queue_producer_api={level},queue_producer_core={level},queue_runtime={level},tower_http=debug"
    )
}
