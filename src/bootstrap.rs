//! Wiring of stores, transport, broker and backend from configuration.

use std::sync::Arc;
use std::time::Duration;

use sqlx::postgres::PgPoolOptions;

use crate::backend::Backend;
use crate::broker::{Broker, BrokerError};
use crate::config::{BackendConfig, ConfigError, StorageMode};
use crate::persistence::{
    EventStore, InMemoryEventStore, InMemorySnapshotStore, PostgresStore, SnapshotStore, StoreError,
};
use crate::transport::{MemoryTransport, Notifier, PgListenConnection, PgNotifier, TransportError};

/// Startup failure.
#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    /// Configuration is unusable.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The connection pool could not be created.
    #[error("database connection failed: {0}")]
    Database(#[from] sqlx::Error),

    /// Migrations failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The broker's dedicated connection could not be opened.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The broker did not start.
    #[error(transparent)]
    Broker(#[from] BrokerError),
}

/// Builds a backend for the configured storage mode.
///
/// # Errors
///
/// Returns [`BootstrapError`] if the database is unreachable, migrations
/// fail, or the broker cannot start listening.
pub async fn build_backend(config: &BackendConfig) -> Result<Backend, BootstrapError> {
    match config.storage_mode {
        StorageMode::Memory => {
            tracing::warn!("STORAGE_MODE=memory: events are not durable and not shared between processes");
            memory_backend().await
        }
        StorageMode::Postgres => postgres_backend(config).await,
    }
}

/// Builds a backend over in-process stores and notification hub.
///
/// # Errors
///
/// Returns [`BootstrapError::Broker`] if the broker cannot start.
pub async fn memory_backend() -> Result<Backend, BootstrapError> {
    let transport = MemoryTransport::new();
    let notifier: Arc<dyn Notifier> = Arc::new(transport.clone());
    let broker = Broker::start(Box::new(transport.connect()), notifier).await?;

    let events: Arc<dyn EventStore> = Arc::new(InMemoryEventStore::new());
    let snapshots: Arc<dyn SnapshotStore> = Arc::new(InMemorySnapshotStore::new());
    Ok(Backend::builder(broker, events, snapshots).build())
}

async fn postgres_backend(config: &BackendConfig) -> Result<Backend, BootstrapError> {
    let url = config
        .database_url
        .as_deref()
        .ok_or(ConfigError::Missing("DATABASE_URL"))?;

    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .min_connections(config.database_min_connections)
        .acquire_timeout(Duration::from_secs(config.database_connect_timeout_secs))
        .connect(url)
        .await?;
    tracing::info!(
        max_connections = config.database_max_connections,
        "database pool connected"
    );

    let store = Arc::new(PostgresStore::new(pool.clone()));
    if config.database_run_migrations {
        store.migrate().await?;
        tracing::info!("database migrations applied");
    }

    let connection = PgListenConnection::connect(&pool).await?;
    let notifier: Arc<dyn Notifier> = Arc::new(PgNotifier::new(pool));
    let broker = Broker::start(Box::new(connection), notifier).await?;

    let events: Arc<dyn EventStore> = Arc::clone(&store) as Arc<dyn EventStore>;
    let snapshots: Arc<dyn SnapshotStore> = store;
    Ok(Backend::builder(broker, events, snapshots).build())
}
