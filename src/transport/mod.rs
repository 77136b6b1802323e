//! Notification transport: channel-addressed publish/subscribe.
//!
//! The broker needs two capabilities from the transport:
//!
//! - a [`ListenConnection`]: the one connection that executes `LISTEN` /
//!   `UNLISTEN` and blocks waiting for notifications addressed to it;
//! - a [`Notifier`]: fire-and-forget publishing from any task.
//!
//! Delivery is at-least-once and best-effort to currently registered
//! listeners; payloads are advisory and never durable.

pub mod memory;
pub mod postgres;

use std::fmt;

use async_trait::async_trait;

pub use memory::{MemoryConnection, MemoryTransport};
pub use postgres::{PgListenConnection, PgNotifier};

/// A notification received on a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// Channel the notification was published on.
    pub channel: String,
    /// Advisory payload; empty when the publisher sent none.
    pub payload: String,
}

impl Notification {
    /// Creates a notification.
    #[must_use]
    pub fn new(channel: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            payload: payload.into(),
        }
    }
}

/// Transport failure.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    /// The listening connection is gone.
    #[error("notification connection lost")]
    ConnectionLost,

    /// Database error while listening or publishing.
    #[error("database error: {0}")]
    Database(String),
}

/// The single connection owned by the broker poll loop.
///
/// Only the poll loop calls these methods, so `&mut self` is enough.
#[async_trait]
pub trait ListenConnection: Send + fmt::Debug + 'static {
    /// Starts receiving notifications on `channel`.
    async fn listen(&mut self, channel: &str) -> Result<(), TransportError>;

    /// Stops receiving notifications on `channel`.
    async fn unlisten(&mut self, channel: &str) -> Result<(), TransportError>;

    /// Blocks until at least one notification arrives, then returns it
    /// together with every other notification already buffered.
    async fn wait(&mut self) -> Result<Vec<Notification>, TransportError>;

    /// Releases the connection.
    async fn close(self: Box<Self>) -> Result<(), TransportError>;
}

/// Fire-and-forget publisher usable from any task.
#[async_trait]
pub trait Notifier: Send + Sync + fmt::Debug + 'static {
    /// Asks the transport to broadcast on `channel`. Returns once the
    /// request is accepted, not when it is delivered.
    async fn notify(&self, channel: &str, payload: Option<&str>) -> Result<(), TransportError>;
}
