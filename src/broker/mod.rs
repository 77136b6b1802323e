//! Notification channel broker.
//!
//! The [`Broker`] owns exactly one [`ListenConnection`]. A single poll
//! task blocks on that connection waiting for notifications; it is the
//! only code that ever runs `LISTEN`/`UNLISTEN`.
//!
//! Other tasks reach the connection through a command queue. The blocking
//! wait can only be released by a notification arriving on the connection,
//! so every enqueue is paired with a `NOTIFY` on a private control channel
//! the connection listens on. The poll loop then wakes, drains the whole
//! queue in FIFO order, checks for shutdown, and finally dispatches the
//! notifications it woke up with.
//!
//! ```text
//! listen()/unregister() ──push──▶ CommandQueue
//!         └──notify(control)──▶ transport ──▶ wait() ─┐
//!                                                     ▼
//!                          poll task: drain queue ▶ LISTEN/UNLISTEN
//!                                     dispatch    ▶ listener senders
//! ```
//!
//! Any transport error in the poll task is fatal: the broker moves to
//! [`BrokerState::Failed`], drops every listener, and fails every pending
//! registration. Shutdown races are not guaranteed to deliver.

pub mod channel;
pub(crate) mod command;
mod poll;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::watch;
use uuid::Uuid;

pub use channel::{Listener, RegistrationSignal};
use channel::{ChannelTable, Joined, ListenerId};
use command::{Command, CommandQueue};

use crate::transport::{ListenConnection, Notification, Notifier, TransportError};

/// Broker failure.
#[derive(Debug, Clone, thiserror::Error)]
pub enum BrokerError {
    /// The transport failed.
    #[error("notification transport failed: {0}")]
    Transport(#[from] TransportError),

    /// The broker stopped before the request took effect.
    #[error("notification broker is closed")]
    Closed,
}

/// Lifecycle of the poll loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrokerState {
    /// The poll loop is running.
    Running,
    /// `close` completed.
    Stopped,
    /// The poll loop died on a transport error.
    Failed(String),
}

impl BrokerState {
    /// Returns `true` while the poll loop is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }
}

#[derive(Debug)]
struct BrokerInner {
    control_channel: String,
    channels: Mutex<ChannelTable>,
    commands: Mutex<CommandQueue>,
    notifier: Arc<dyn Notifier>,
    next_listener: AtomicU64,
    state: watch::Receiver<BrokerState>,
    runtime: Handle,
}

impl BrokerInner {
    fn schedule(&self, command: Command) -> bool {
        self.commands.lock().push(command)
    }

    /// Provokes a notification on the control channel so the poll loop
    /// returns from its blocking wait. Runs on the runtime the broker was
    /// started on, so callers outside any runtime still wake it.
    fn wake(&self) {
        let notifier = Arc::clone(&self.notifier);
        let channel = self.control_channel.clone();
        self.runtime.spawn(async move {
            if let Err(e) = notifier.notify(&channel, None).await {
                tracing::warn!(error = %e, "failed to wake notification broker");
            }
        });
    }

    fn remove_listener(&self, channel: &str, id: ListenerId) {
        let scheduled = {
            let mut channels = self.channels.lock();
            channels.remove(channel, id)
                && self.schedule(Command::Unlisten {
                    channel: channel.to_string(),
                })
        };
        if scheduled {
            tracing::debug!(channel, "last listener removed, UNLISTEN queued");
            self.wake();
        }
    }

    fn dispatch(&self, notification: &Notification) {
        let listeners = self.channels.lock().listeners(&notification.channel);
        for listener in listeners {
            let _ = listener.send(notification.clone());
        }
    }

    /// Drops every listener and discards queued commands.
    fn terminate(&self) {
        let discarded = self.commands.lock().close();
        let dropped = self.channels.lock().terminate();
        tracing::debug!(discarded, dropped, "notification broker released its channels");
    }
}

impl Drop for BrokerInner {
    fn drop(&mut self) {
        self.commands.get_mut().close();
        if self.state.borrow().is_running() {
            self.wake();
        }
    }
}

/// Handle that keeps a listener registered. Dropping it, or calling
/// [`ListenHandle::unregister`], removes the listener; removing the last
/// listener of a channel queues its `UNLISTEN`.
#[derive(Debug)]
#[must_use = "dropping a ListenHandle unregisters the listener"]
pub struct ListenHandle {
    broker: Weak<BrokerInner>,
    channel: String,
    id: ListenerId,
    active: bool,
}

impl ListenHandle {
    fn detached(channel: &str) -> Self {
        Self {
            broker: Weak::new(),
            channel: channel.to_string(),
            id: 0,
            active: false,
        }
    }

    /// Returns the channel this handle is registered on.
    #[must_use]
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Removes the listener.
    pub fn unregister(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if !std::mem::replace(&mut self.active, false) {
            return;
        }
        if let Some(broker) = self.broker.upgrade() {
            broker.remove_listener(&self.channel, self.id);
        }
    }
}

impl Drop for ListenHandle {
    fn drop(&mut self) {
        self.release();
    }
}

/// Notification channel broker over one dedicated connection.
///
/// Cheap to clone; clones share the poll loop. The loop ends when
/// [`Broker::close`] is called, when the last clone is dropped, or on the
/// first transport error.
#[derive(Debug, Clone)]
pub struct Broker {
    inner: Arc<BrokerInner>,
}

impl Broker {
    /// Starts the poll loop on `connection`.
    ///
    /// The connection starts listening on a private control channel before
    /// the loop is spawned. Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::Transport`] if the control channel cannot be
    /// listened on.
    pub async fn start(
        mut connection: Box<dyn ListenConnection>,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self, BrokerError> {
        let control_channel = format!("broker_{}", Uuid::new_v4().simple());
        connection.listen(&control_channel).await?;

        let (state_tx, state_rx) = watch::channel(BrokerState::Running);
        let inner = Arc::new(BrokerInner {
            control_channel,
            channels: Mutex::new(ChannelTable::default()),
            commands: Mutex::new(CommandQueue::new()),
            notifier,
            next_listener: AtomicU64::new(1),
            state: state_rx,
            runtime: Handle::current(),
        });

        tracing::info!("notification broker started");
        tracing::debug!(control_channel = %inner.control_channel, "broker control channel listening");
        inner
            .runtime
            .spawn(poll::run(Arc::downgrade(&inner), connection, state_tx));
        Ok(Self { inner })
    }

    /// Registers `listener` on `channel`.
    ///
    /// Returns a signal that resolves once the channel's `LISTEN` has
    /// executed, and the handle that keeps the listener registered. Only
    /// the first listener of a channel queues a `LISTEN`; later ones share
    /// its signal. Once the broker has terminated, or when `channel` is the
    /// broker's own control channel, the signal fails immediately and the
    /// listener is dropped.
    pub fn listen(&self, channel: &str, listener: Listener) -> (RegistrationSignal, ListenHandle) {
        if channel == self.inner.control_channel {
            tracing::warn!(channel, "refusing to listen on the broker control channel");
            return (RegistrationSignal::failed(), ListenHandle::detached(channel));
        }
        let id = self.inner.next_listener.fetch_add(1, Ordering::Relaxed);

        let (signal, queued) = {
            let mut channels = self.inner.channels.lock();
            match channels.add(channel, id, listener) {
                Joined::Existing(signal) => (signal, false),
                Joined::First { signal, done } => {
                    let queued = self.inner.schedule(Command::Listen {
                        channel: channel.to_string(),
                        done,
                    });
                    (signal, queued)
                }
                Joined::Terminated => {
                    return (RegistrationSignal::failed(), ListenHandle::detached(channel));
                }
            }
        };

        if queued {
            tracing::debug!(channel, "first listener added, LISTEN queued");
            self.inner.wake();
        }

        let handle = ListenHandle {
            broker: Arc::downgrade(&self.inner),
            channel: channel.to_string(),
            id,
            active: true,
        };
        (signal, handle)
    }

    /// Publishes on `channel`. Returns once the transport accepted the
    /// request; delivery is not awaited.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::Transport`] if the transport rejected it.
    pub async fn notify(&self, channel: &str, payload: Option<&str>) -> Result<(), BrokerError> {
        self.inner.notifier.notify(channel, payload).await?;
        Ok(())
    }

    /// Stops the poll loop and releases the connection. Idempotent.
    ///
    /// Queued commands are discarded; their registration signals fail.
    pub fn close(&self) {
        let discarded = {
            let mut commands = self.inner.commands.lock();
            if !commands.is_open() {
                return;
            }
            commands.close()
        };
        tracing::info!(discarded, "closing notification broker");
        self.inner.wake();
    }

    /// Returns the current lifecycle state.
    #[must_use]
    pub fn state(&self) -> BrokerState {
        self.inner.state.borrow().clone()
    }

    /// Returns `true` while the poll loop is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.inner.state.borrow().is_running()
    }

    /// Waits until the poll loop has exited and returns the final state.
    pub async fn stopped(&self) -> BrokerState {
        let mut state = self.inner.state.clone();
        let _ = state.wait_for(|s| !s.is_running()).await;
        let final_state = state.borrow().clone();
        final_state
    }

    /// Returns the private channel used to wake the poll loop.
    #[must_use]
    pub fn control_channel(&self) -> &str {
        &self.inner.control_channel
    }

    /// Returns the number of channels with at least one listener.
    #[must_use]
    pub fn channel_count(&self) -> usize {
        self.inner.channels.lock().len()
    }
}
