//! tasklink server
//!
//! Webhook service keeping the CRM and the work tracker in eventual
//! agreement. Receives change events from both systems, acknowledges
//! immediately, and hands them to the reconciliation worker.

mod config;
mod payloads;
mod routes;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use config::Config;
use sqlx::postgres::PgPoolOptions;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use tasklink_connector_crm::CrmClient;
use tasklink_connector_tracker::TrackerClient;
use tasklink_db::PgSyncRegistry;
use tasklink_sync::ReconciliationWorker;

#[tokio::main]
async fn main() {
    // Load configuration (fail-fast on missing required values)
    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    init_logging(&config.rust_log);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        host = %config.host,
        port = config.port,
        recheck_window_secs = config.recheck_window_secs,
        "Starting tasklink server"
    );

    // Create database connection pool
    let pool = match PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(5))
        .connect(&config.database_url)
        .await
    {
        Ok(pool) => {
            info!("Database connection established");
            pool
        }
        Err(e) => {
            eprintln!("Failed to connect to database: {e}");
            std::process::exit(1);
        }
    };

    let crm = match CrmClient::new(config.crm_config()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Invalid CRM configuration: {e}");
            std::process::exit(1);
        }
    };
    let tracker = match TrackerClient::new(config.tracker_config()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Invalid tracker configuration: {e}");
            std::process::exit(1);
        }
    };

    let registry = PgSyncRegistry::new(pool);
    let worker = Arc::new(ReconciliationWorker::new(
        Arc::new(registry),
        Arc::new(crm),
        Arc::new(tracker),
        config.sync_config(),
    ));

    let app = routes::router(worker);

    // Bind and serve
    let addr: SocketAddr = match config.bind_addr().parse() {
        Ok(a) => a,
        Err(e) => {
            tracing::error!("Invalid bind address '{}': {e}", config.bind_addr());
            std::process::exit(1);
        }
    };

    info!(%addr, "Server listening");

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!("Failed to bind to address {addr}: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        tracing::error!("Server error: {e}");
        std::process::exit(1);
    }

    info!("Server shutdown complete");
}

/// Initialize the tracing subscriber with JSON logging.
fn init_logging(filter: &str) {
    let filter_layer = match EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(filter))
    {
        Ok(f) => f,
        Err(e) => {
            eprintln!("FATAL: Failed to create log filter: {e}");
            std::process::exit(1);
        }
    };

    let fmt_layer = fmt::layer()
        .json()
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(filter_layer)
        .init();

    info!(filter = %filter, "Logging initialized");
}

/// Graceful shutdown signal handler.
///
/// Parked rechecks are lost on shutdown; the next event for an affected
/// object retriggers reconciliation, so nothing stays permanently stale.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {e}");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
