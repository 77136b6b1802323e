//! Server configuration loaded from environment variables.
//!
//! Follows 12-factor style: all settings come from environment variables
//! (or a `.env` file via `dotenvy`).

use std::net::SocketAddr;
use std::str::FromStr;

/// Where events and snapshots are stored, and which notification transport
/// the broker uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageMode {
    /// PostgreSQL tables plus `LISTEN`/`NOTIFY`.
    Postgres,
    /// Process-local stores and notification hub. Nothing survives a
    /// restart and nothing is shared between processes.
    Memory,
}

impl FromStr for StorageMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(Self::Postgres),
            "memory" => Ok(Self::Memory),
            other => Err(ConfigError::Invalid {
                key: "STORAGE_MODE",
                value: other.to_string(),
            }),
        }
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A variable is set to a value that cannot be used.
    #[error("invalid value {value:?} for {key}")]
    Invalid {
        /// Variable name.
        key: &'static str,
        /// Rejected value.
        value: String,
    },

    /// A variable required by the selected storage mode is missing.
    #[error("{0} must be set when STORAGE_MODE=postgres")]
    Missing(&'static str),
}

/// Top-level server configuration.
///
/// Loaded once at startup via [`BackendConfig::from_env`].
#[derive(Debug, Clone)]
pub struct BackendConfig {
    /// Socket address to bind the HTTP server to (e.g. `0.0.0.0:3000`).
    pub listen_addr: SocketAddr,

    /// Storage and transport backing the event log.
    pub storage_mode: StorageMode,

    /// PostgreSQL connection string. Required in [`StorageMode::Postgres`].
    pub database_url: Option<String>,

    /// Maximum number of database connections in the pool.
    pub database_max_connections: u32,

    /// Minimum idle connections in the pool.
    pub database_min_connections: u32,

    /// Timeout in seconds for acquiring a database connection.
    pub database_connect_timeout_secs: u64,

    /// Whether to apply pending migrations at startup.
    pub database_run_migrations: bool,

    /// Capacity of each WebSocket subscription's delivery channel.
    pub delivery_buffer: usize,

    /// Per-request timeout for the REST surface.
    pub request_timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
            storage_mode: StorageMode::Postgres,
            database_url: None,
            database_max_connections: 10,
            database_min_connections: 2,
            database_connect_timeout_secs: 5,
            database_run_migrations: true,
            delivery_buffer: 256,
            request_timeout_secs: 30,
        }
    }
}

impl BackendConfig {
    /// Loads configuration from environment variables.
    ///
    /// Falls back to defaults when a numeric or boolean variable is unset
    /// or unparsable. Calls `dotenvy::dotenv().ok()` to optionally load a
    /// `.env` file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if `LISTEN_ADDR` or `STORAGE_MODE`
    /// cannot be parsed, and [`ConfigError::Missing`] if `DATABASE_URL` is
    /// unset in postgres mode.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a configuration from an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Same as [`BackendConfig::from_env`].
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let listen_addr = match lookup("LISTEN_ADDR") {
            Some(value) => value.parse().map_err(|_| ConfigError::Invalid {
                key: "LISTEN_ADDR",
                value,
            })?,
            None => defaults.listen_addr,
        };

        let storage_mode = match lookup("STORAGE_MODE") {
            Some(value) => value.parse()?,
            None => defaults.storage_mode,
        };

        let database_url = lookup("DATABASE_URL").filter(|url| !url.is_empty());
        if storage_mode == StorageMode::Postgres && database_url.is_none() {
            return Err(ConfigError::Missing("DATABASE_URL"));
        }

        Ok(Self {
            listen_addr,
            storage_mode,
            database_url,
            database_max_connections: parse_or(&lookup, "DATABASE_MAX_CONNECTIONS", defaults.database_max_connections),
            database_min_connections: parse_or(&lookup, "DATABASE_MIN_CONNECTIONS", defaults.database_min_connections),
            database_connect_timeout_secs: parse_or(
                &lookup,
                "DATABASE_CONNECT_TIMEOUT_SECS",
                defaults.database_connect_timeout_secs,
            ),
            database_run_migrations: parse_bool_or(&lookup, "DATABASE_RUN_MIGRATIONS", defaults.database_run_migrations),
            delivery_buffer: parse_or(&lookup, "DELIVERY_BUFFER", defaults.delivery_buffer).max(1),
            request_timeout_secs: parse_or(&lookup, "REQUEST_TIMEOUT_SECS", defaults.request_timeout_secs),
        })
    }
}

/// Parses a variable as `T`, returning `default` on missing or invalid
/// values.
fn parse_or<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    lookup(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

/// Parses a variable as a boolean. Accepts `"true"`, `"1"`, `"false"`,
/// `"0"` (case-insensitive). Returns `default` otherwise.
fn parse_bool_or(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: bool) -> bool {
    match lookup(key).map(|v| v.to_ascii_lowercase()).as_deref() {
        Some("true" | "1") => true,
        Some("false" | "0") => false,
        _ => default,
    }
}
