//! In-process notification hub.
//!
//! [`MemoryTransport`] behaves like a single database server: every
//! [`MemoryConnection`] has its own set of listened channels, and
//! [`Notifier::notify`] fans out to each connection listening on the
//! channel. It also records every `LISTEN`/`UNLISTEN` command so tests can
//! count administrative traffic.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::{ListenConnection, Notification, Notifier, TransportError};

#[derive(Debug)]
struct Endpoint {
    channels: HashSet<String>,
    sender: mpsc::UnboundedSender<Notification>,
}

#[derive(Debug, Default)]
struct Hub {
    next_connection: u64,
    endpoints: HashMap<u64, Endpoint>,
    listen_commands: HashMap<String, usize>,
    unlisten_commands: HashMap<String, usize>,
}

/// Shared handle to an in-process notification hub.
#[derive(Debug, Clone, Default)]
pub struct MemoryTransport {
    hub: Arc<Mutex<Hub>>,
}

impl MemoryTransport {
    /// Creates a hub with no connections.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a new listening connection.
    #[must_use]
    pub fn connect(&self) -> MemoryConnection {
        let (sender, receiver) = mpsc::unbounded_channel();
        let mut hub = self.hub.lock();
        hub.next_connection = hub.next_connection.wrapping_add(1);
        let id = hub.next_connection;
        hub.endpoints.insert(
            id,
            Endpoint {
                channels: HashSet::new(),
                sender,
            },
        );
        MemoryConnection {
            id,
            hub: Arc::clone(&self.hub),
            receiver,
        }
    }

    /// Number of `LISTEN` commands executed for `channel`.
    #[must_use]
    pub fn listen_count(&self, channel: &str) -> usize {
        self.hub.lock().listen_commands.get(channel).copied().unwrap_or(0)
    }

    /// Number of `UNLISTEN` commands executed for `channel`.
    #[must_use]
    pub fn unlisten_count(&self, channel: &str) -> usize {
        self.hub
            .lock()
            .unlisten_commands
            .get(channel)
            .copied()
            .unwrap_or(0)
    }

    /// Returns `true` if any open connection listens on `channel`.
    #[must_use]
    pub fn is_listening(&self, channel: &str) -> bool {
        self.hub
            .lock()
            .endpoints
            .values()
            .any(|e| e.channels.contains(channel))
    }

    /// Drops every open connection, as if the server went away. Blocked
    /// [`ListenConnection::wait`] calls fail with
    /// [`TransportError::ConnectionLost`].
    pub fn sever(&self) {
        let dropped = std::mem::take(&mut self.hub.lock().endpoints);
        tracing::debug!(connections = dropped.len(), "memory transport severed");
    }
}

#[async_trait]
impl Notifier for MemoryTransport {
    async fn notify(&self, channel: &str, payload: Option<&str>) -> Result<(), TransportError> {
        let hub = self.hub.lock();
        for endpoint in hub.endpoints.values() {
            if endpoint.channels.contains(channel) {
                let _ = endpoint
                    .sender
                    .send(Notification::new(channel, payload.unwrap_or("")));
            }
        }
        Ok(())
    }
}

/// One listening connection on a [`MemoryTransport`].
#[derive(Debug)]
pub struct MemoryConnection {
    id: u64,
    hub: Arc<Mutex<Hub>>,
    receiver: mpsc::UnboundedReceiver<Notification>,
}

#[async_trait]
impl ListenConnection for MemoryConnection {
    async fn listen(&mut self, channel: &str) -> Result<(), TransportError> {
        let mut guard = self.hub.lock();
        let hub = &mut *guard;
        let endpoint = hub
            .endpoints
            .get_mut(&self.id)
            .ok_or(TransportError::ConnectionLost)?;
        endpoint.channels.insert(channel.to_string());
        *hub.listen_commands.entry(channel.to_string()).or_insert(0) += 1;
        Ok(())
    }

    async fn unlisten(&mut self, channel: &str) -> Result<(), TransportError> {
        let mut guard = self.hub.lock();
        let hub = &mut *guard;
        let endpoint = hub
            .endpoints
            .get_mut(&self.id)
            .ok_or(TransportError::ConnectionLost)?;
        endpoint.channels.remove(channel);
        *hub.unlisten_commands.entry(channel.to_string()).or_insert(0) += 1;
        Ok(())
    }

    async fn wait(&mut self) -> Result<Vec<Notification>, TransportError> {
        let first = self
            .receiver
            .recv()
            .await
            .ok_or(TransportError::ConnectionLost)?;
        let mut batch = vec![first];
        while let Ok(next) = self.receiver.try_recv() {
            batch.push(next);
        }
        Ok(batch)
    }

    async fn close(self: Box<Self>) -> Result<(), TransportError> {
        self.hub.lock().endpoints.remove(&self.id);
        Ok(())
    }
}
