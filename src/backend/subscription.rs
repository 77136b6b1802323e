//! Subscription task and catch-up scan.
//!
//! Each subscription runs as its own task. It waits for the broker to
//! confirm the log's `LISTEN`, runs one catch-up scan unconditionally, and
//! then runs another scan for every wake-up the broker dispatches.
//! Wake-ups that pile up while a scan runs collapse into one follow-up
//! scan, since a scan always reads everything past the cursor. A consumer
//! that drops its receiver ends the task right away, without waiting for
//! the next wake-up.
//!
//! Scans of the same log hold that log's lock, so a slow consumer stalls
//! the other subscribers of its log, but never subscribers of other logs.

use std::sync::{Arc, Weak};

use tokio::sync::{Mutex as AsyncMutex, mpsc, watch};

use super::BackendInner;
use crate::broker::RegistrationSignal;
use crate::domain::{Delivery, LogId, SequenceId};
use crate::transport::Notification;

pub(crate) type SubscriptionId = u64;

/// Lifecycle of a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    /// Waiting for the broker to execute the log's `LISTEN`.
    Pending,
    /// Receiving catch-up scans.
    Active,
    /// Terminal.
    Cancelled,
}

/// The receiving side of the consumer channel is gone.
#[derive(Debug)]
struct ConsumerGone;

pub(crate) struct SubscriptionTask {
    pub(crate) backend: Arc<BackendInner>,
    pub(crate) log_id: LogId,
    pub(crate) id: SubscriptionId,
    pub(crate) cursor: SequenceId,
    pub(crate) log_lock: Arc<AsyncMutex<()>>,
    pub(crate) consumer: mpsc::Sender<Delivery>,
    pub(crate) state: Arc<watch::Sender<SubscriptionState>>,
}

impl SubscriptionTask {
    pub(crate) async fn run(
        mut self,
        registration: RegistrationSignal,
        mut wakeups: mpsc::UnboundedReceiver<Notification>,
    ) {
        if let Err(e) = registration.wait().await {
            tracing::debug!(log_id = %self.log_id, error = %e, "subscription never became active");
            self.finish();
            return;
        }
        self.state.send_if_modified(|state| {
            let activate = *state == SubscriptionState::Pending;
            if activate {
                *state = SubscriptionState::Active;
            }
            activate
        });

        // Events appended before the LISTEN took effect produced no
        // notification this subscription could see.
        if self.is_active() && self.catch_up().await.is_ok() {
            let consumer = self.consumer.clone();
            loop {
                tokio::select! {
                    wakeup = wakeups.recv() => {
                        if wakeup.is_none() {
                            break;
                        }
                    }
                    () = consumer.closed() => {
                        tracing::debug!(log_id = %self.log_id, subscription = self.id, "consumer dropped");
                        break;
                    }
                }
                while wakeups.try_recv().is_ok() {}
                if !self.is_active() || self.catch_up().await.is_err() {
                    break;
                }
            }
        }
        self.finish();
    }

    fn is_active(&self) -> bool {
        *self.state.borrow() == SubscriptionState::Active
    }

    async fn catch_up(&mut self) -> Result<(), ConsumerGone> {
        let _serialized = self.log_lock.lock().await;

        let records = match self.backend.events.query_after(&self.log_id, self.cursor).await {
            Ok(records) => records,
            Err(e) => {
                tracing::warn!(log_id = %self.log_id, cursor = %self.cursor, error = %e, "catch-up scan failed");
                let delivery = Delivery::Error {
                    log_id: self.log_id.clone(),
                    message: e.to_string(),
                };
                return self.consumer.send(delivery).await.map_err(|_| ConsumerGone);
            }
        };

        let mut delivered = 0usize;
        for record in records {
            if record.sequence_id <= self.cursor {
                continue;
            }
            let sequence_id = record.sequence_id;
            self.consumer
                .send(Delivery::Event(record))
                .await
                .map_err(|_| ConsumerGone)?;
            self.cursor = sequence_id;
            delivered += 1;
        }

        if delivered > 0 {
            tracing::debug!(log_id = %self.log_id, delivered, cursor = %self.cursor, "catch-up delivered");
        }
        Ok(())
    }

    fn finish(&self) {
        self.state.send_replace(SubscriptionState::Cancelled);
        self.backend.remove_subscription(&self.log_id, self.id);
    }
}

/// Keeps a subscription alive. Dropping it, or calling
/// [`SubscriptionHandle::cancel`], cancels the subscription.
///
/// Cancelling stops future catch-up scans; a scan already running
/// finishes.
#[derive(Debug)]
#[must_use = "dropping a SubscriptionHandle cancels the subscription"]
pub struct SubscriptionHandle {
    pub(crate) backend: Weak<BackendInner>,
    pub(crate) log_id: LogId,
    pub(crate) id: SubscriptionId,
    pub(crate) state: Arc<watch::Sender<SubscriptionState>>,
}

impl SubscriptionHandle {
    /// Returns the subscribed log.
    #[must_use]
    pub fn log_id(&self) -> &LogId {
        &self.log_id
    }

    /// Returns the current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SubscriptionState {
        *self.state.borrow()
    }

    /// Waits until the subscription leaves [`SubscriptionState::Pending`]
    /// and returns the new state.
    pub async fn activated(&self) -> SubscriptionState {
        let mut state = self.state.subscribe();
        let _ = state
            .wait_for(|s| *s != SubscriptionState::Pending)
            .await;
        let current = *state.borrow();
        current
    }

    /// Cancels the subscription.
    pub fn cancel(self) {
        drop(self);
    }

    fn release(&self) {
        let previous = self.state.send_replace(SubscriptionState::Cancelled);
        if previous == SubscriptionState::Cancelled {
            return;
        }
        if let Some(backend) = self.backend.upgrade() {
            backend.remove_subscription(&self.log_id, self.id);
        }
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.release();
    }
}
