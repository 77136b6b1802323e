//! Registered channels and their listener sets.

use std::collections::HashMap;
use std::fmt;

use futures_util::FutureExt;
use futures_util::future::Shared;
use tokio::sync::{mpsc, oneshot};

use super::BrokerError;
use crate::transport::Notification;

/// Receives every notification dispatched on a channel.
pub type Listener = mpsc::UnboundedSender<Notification>;

/// Identifies one listener within the broker.
pub(crate) type ListenerId = u64;

/// Resolves once the channel's `LISTEN` has executed on the broker's
/// connection, not merely been queued.
///
/// Every listener that joins a channel while its `LISTEN` is pending
/// shares the same signal.
#[derive(Clone)]
pub struct RegistrationSignal {
    inner: Shared<oneshot::Receiver<()>>,
}

impl RegistrationSignal {
    fn pending() -> (Self, oneshot::Sender<()>) {
        let (done, rx) = oneshot::channel();
        (Self { inner: rx.shared() }, done)
    }

    /// A signal that has already failed.
    pub(crate) fn failed() -> Self {
        let (signal, done) = Self::pending();
        drop(done);
        signal
    }

    /// Waits for the registration to take effect.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::Closed`] if the broker stopped or failed
    /// before executing the `LISTEN`.
    pub async fn wait(self) -> Result<(), BrokerError> {
        self.inner.await.map_err(|_| BrokerError::Closed)
    }
}

impl fmt::Debug for RegistrationSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistrationSignal")
            .field("resolved", &self.inner.peek().is_some())
            .finish()
    }
}

#[derive(Debug)]
struct Channel {
    listeners: HashMap<ListenerId, Listener>,
    registration: RegistrationSignal,
}

/// What the caller must do after [`ChannelTable::add`].
#[derive(Debug)]
pub(crate) enum Joined {
    /// The channel already had listeners; share its signal.
    Existing(RegistrationSignal),
    /// First listener: the caller must queue a `LISTEN` completing `done`.
    First {
        signal: RegistrationSignal,
        done: oneshot::Sender<()>,
    },
    /// The broker has terminated; the listener was not added.
    Terminated,
}

/// Channel name to listener set.
///
/// A channel exists exactly while its listener set is non-empty.
#[derive(Debug, Default)]
pub(crate) struct ChannelTable {
    channels: HashMap<String, Channel>,
    terminated: bool,
}

impl ChannelTable {
    pub(crate) fn add(&mut self, name: &str, id: ListenerId, listener: Listener) -> Joined {
        if self.terminated {
            return Joined::Terminated;
        }
        if let Some(channel) = self.channels.get_mut(name) {
            channel.listeners.insert(id, listener);
            return Joined::Existing(channel.registration.clone());
        }

        let (signal, done) = RegistrationSignal::pending();
        let mut listeners = HashMap::new();
        listeners.insert(id, listener);
        self.channels.insert(
            name.to_string(),
            Channel {
                listeners,
                registration: signal.clone(),
            },
        );
        Joined::First { signal, done }
    }

    /// Removes a listener. Returns `true` if it was the channel's last one,
    /// in which case the channel is gone and the caller must queue the
    /// `UNLISTEN`.
    pub(crate) fn remove(&mut self, name: &str, id: ListenerId) -> bool {
        let Some(channel) = self.channels.get_mut(name) else {
            return false;
        };
        if channel.listeners.remove(&id).is_none() || !channel.listeners.is_empty() {
            return false;
        }
        self.channels.remove(name);
        true
    }

    /// Copies the current listener set of `name`.
    pub(crate) fn listeners(&self, name: &str) -> Vec<Listener> {
        self.channels
            .get(name)
            .map(|c| c.listeners.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Drops every listener and refuses new ones.
    pub(crate) fn terminate(&mut self) -> usize {
        self.terminated = true;
        let dropped = self.channels.len();
        self.channels.clear();
        dropped
    }

    pub(crate) fn len(&self) -> usize {
        self.channels.len()
    }
}
