//! pg-eventlog server entry point.
//!
//! Starts the Axum HTTP server with REST and WebSocket endpoints.

use std::time::Duration;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use pg_eventlog::api;
use pg_eventlog::app_state::AppState;
use pg_eventlog::bootstrap;
use pg_eventlog::config::BackendConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load configuration
    let config = BackendConfig::from_env().context("invalid configuration")?;
    tracing::info!(
        addr = %config.listen_addr,
        storage = ?config.storage_mode,
        "starting pg-eventlog"
    );

    // Build stores, broker and backend
    let backend = bootstrap::build_backend(&config)
        .await
        .context("failed to start event log backend")?;
    tracing::info!(node_id = %backend.node_id(), "node identity");

    // Build application state and router
    let app_state = AppState {
        backend: backend.clone(),
        delivery_buffer: config.delivery_buffer,
    };
    let app = api::build_app(app_state, Duration::from_secs(config.request_timeout_secs));

    // Start server
    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.listen_addr))?;
    tracing::info!(addr = %config.listen_addr, "server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    backend.shutdown();
    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
