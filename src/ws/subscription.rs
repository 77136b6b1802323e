//! Per-connection subscription manager.
//!
//! Each subscription gets its own delivery channel. A forwarding task
//! moves its deliveries into the connection's outbound queue, tagged with
//! the log and a per-subscription generation. Deliveries already queued
//! when a subscription is removed or replaced no longer match a live
//! generation and are dropped by [`SubscriptionManager::accept`].

use std::collections::HashMap;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::backend::SubscriptionHandle;
use crate::domain::{Delivery, LogId};

/// A delivery in the connection's outbound queue.
#[derive(Debug)]
pub struct Routed {
    log_id: LogId,
    generation: u64,
    delivery: Delivery,
}

#[derive(Debug)]
struct ActiveSubscription {
    _handle: SubscriptionHandle,
    generation: u64,
    forwarder: JoinHandle<()>,
}

impl Drop for ActiveSubscription {
    fn drop(&mut self) {
        self.forwarder.abort();
    }
}

/// Manages the log subscriptions of a single WebSocket connection.
///
/// Dropping the manager cancels every subscription it holds.
#[derive(Debug)]
pub struct SubscriptionManager {
    subscriptions: HashMap<LogId, ActiveSubscription>,
    outbound: mpsc::Sender<Routed>,
    buffer: usize,
    next_generation: u64,
}

impl SubscriptionManager {
    /// Creates an empty manager forwarding into `outbound`. `buffer` is the
    /// capacity of each subscription's delivery channel.
    #[must_use]
    pub fn new(outbound: mpsc::Sender<Routed>, buffer: usize) -> Self {
        Self {
            subscriptions: HashMap::new(),
            outbound,
            buffer: buffer.max(1),
            next_generation: 0,
        }
    }

    /// Creates the delivery channel for a new subscription.
    #[must_use]
    pub fn channel(&self) -> (mpsc::Sender<Delivery>, mpsc::Receiver<Delivery>) {
        mpsc::channel(self.buffer)
    }

    /// Takes ownership of a subscription and starts forwarding `deliveries`.
    /// An existing subscription to the same log is cancelled.
    pub fn insert(&mut self, handle: SubscriptionHandle, mut deliveries: mpsc::Receiver<Delivery>) {
        let log_id = handle.log_id().clone();
        self.next_generation += 1;
        let generation = self.next_generation;

        let outbound = self.outbound.clone();
        let tag = log_id.clone();
        let forwarder = tokio::spawn(async move {
            while let Some(delivery) = deliveries.recv().await {
                let routed = Routed {
                    log_id: tag.clone(),
                    generation,
                    delivery,
                };
                if outbound.send(routed).await.is_err() {
                    break;
                }
            }
        });
        let previous = self.subscriptions.insert(
            log_id,
            ActiveSubscription {
                _handle: handle,
                generation,
                forwarder,
            },
        );
        if previous.is_some() {
            tracing::debug!("replaced existing ws subscription");
        }
    }

    /// Cancels the subscription to `log_id`. Returns `false` if there was
    /// none.
    pub fn remove(&mut self, log_id: &LogId) -> bool {
        self.subscriptions.remove(log_id).is_some()
    }

    /// Unwraps `routed` if the subscription that produced it is still the
    /// live one for its log. Returns `None` for leftovers of a removed or
    /// replaced subscription.
    #[must_use]
    pub fn accept(&self, routed: Routed) -> Option<Delivery> {
        let live = self
            .subscriptions
            .get(&routed.log_id)
            .is_some_and(|active| active.generation == routed.generation);
        if !live {
            tracing::trace!(log_id = %routed.log_id, "dropping delivery of a closed ws subscription");
            return None;
        }
        Some(routed.delivery)
    }

    /// Returns `true` if the connection is subscribed to `log_id`.
    #[must_use]
    pub fn contains(&self, log_id: &LogId) -> bool {
        self.subscriptions.contains_key(log_id)
    }

    /// Returns the number of subscribed logs.
    #[must_use]
    pub fn count(&self) -> usize {
        self.subscriptions.len()
    }
}
