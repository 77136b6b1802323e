//! Handle to one event log.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use uuid::Uuid;

use super::Backend;
use super::subscription::{SubscriptionHandle, SubscriptionState, SubscriptionTask};
use crate::domain::{Delivery, EventRecord, LogId, SequenceId};
use crate::error::BackendError;

/// A named log on a [`Backend`].
///
/// Cheap to create and clone; every handle for the same log id is
/// interchangeable.
#[derive(Debug, Clone)]
pub struct EventLog {
    pub(super) backend: Backend,
    pub(super) log_id: LogId,
}

impl EventLog {
    /// Returns the log id.
    #[must_use]
    pub fn log_id(&self) -> &LogId {
        &self.log_id
    }

    /// Stores an event, then sends a best-effort wake-up on the log's
    /// channel.
    ///
    /// Returns once the event is durably stored; it never waits for any
    /// subscriber's catch-up. A failed wake-up is logged, not returned:
    /// the event is delivered by the next successful notification.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::DuplicateEvent`] if `event_id` is already
    /// used in this log, or [`BackendError::Store`] on store failure.
    pub async fn submit(&self, event_id: Uuid, payload: &[u8]) -> Result<SequenceId, BackendError> {
        let inner = &self.backend.inner;
        let sequence_id = inner.events.append(&self.log_id, event_id, payload).await?;
        tracing::debug!(log_id = %self.log_id, %event_id, %sequence_id, "event stored");

        if let Err(e) = inner.broker.notify(self.log_id.as_str(), None).await {
            tracing::warn!(log_id = %self.log_id, error = %e, "wake-up notification failed");
        }
        Ok(sequence_id)
    }

    /// Subscribes `consumer` to every event stored after `resume_after`
    /// (or to every event of the log when `None`).
    ///
    /// Events arrive on `consumer` in increasing sequence order, without
    /// gaps or duplicates. A failed catch-up scan arrives as
    /// [`Delivery::Error`] and the subscription stays active. If the
    /// consumer's receiver is dropped, the subscription cancels itself.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::InvalidLogId`] if the log id collides with
    /// the broker's control channel,
    /// [`BackendError::ResumePointNotFound`] if `resume_after` is
    /// not an event of this log, [`BackendError::BrokerUnavailable`] if the
    /// broker is not running, or [`BackendError::Store`] if the resume
    /// point lookup fails. Nothing is registered in any of these cases.
    pub async fn subscribe(
        &self,
        resume_after: Option<Uuid>,
        consumer: mpsc::Sender<Delivery>,
    ) -> Result<SubscriptionHandle, BackendError> {
        let inner = &self.backend.inner;
        if self.log_id.as_str() == inner.broker.control_channel() {
            return Err(BackendError::InvalidLogId(format!(
                "{} is reserved by the notification broker",
                self.log_id
            )));
        }
        let cursor = self.resolve_cursor(resume_after).await?;

        let broker_state = inner.broker.state();
        if !broker_state.is_running() {
            return Err(BackendError::BrokerUnavailable(format!("{broker_state:?}")));
        }

        let (wake_tx, wake_rx) = mpsc::unbounded_channel();
        let (id, registration, log_lock) = inner.add_subscription(&self.log_id, wake_tx);
        let state = Arc::new(watch::Sender::new(SubscriptionState::Pending));

        let task = SubscriptionTask {
            backend: Arc::clone(inner),
            log_id: self.log_id.clone(),
            id,
            cursor,
            log_lock,
            consumer,
            state: Arc::clone(&state),
        };
        tokio::spawn(task.run(registration, wake_rx));

        tracing::debug!(log_id = %self.log_id, subscription = id, %cursor, "subscribed");
        Ok(SubscriptionHandle {
            backend: Arc::downgrade(inner),
            log_id: self.log_id.clone(),
            id,
            state,
        })
    }

    /// Runs one catch-up query without subscribing: every event stored
    /// after `resume_after`, in sequence order.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::ResumePointNotFound`] for an unknown resume
    /// point or [`BackendError::Store`] on store failure.
    pub async fn read_after(&self, resume_after: Option<Uuid>) -> Result<Vec<EventRecord>, BackendError> {
        let cursor = self.resolve_cursor(resume_after).await?;
        Ok(self.backend.inner.events.query_after(&self.log_id, cursor).await?)
    }

    /// Drops events stored before `older_than` once a snapshot covers them.
    ///
    /// Delegates to the configured [`super::LogTruncator`]. Without one this
    /// is a no-op and every event is retained.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::Store`] if the truncator fails.
    pub async fn truncate(&self, older_than: Uuid) -> Result<(), BackendError> {
        match &self.backend.inner.truncator {
            Some(truncator) => {
                truncator.truncate(&self.log_id, older_than).await?;
                tracing::info!(log_id = %self.log_id, %older_than, "log truncated");
            }
            None => {
                tracing::warn!(log_id = %self.log_id, "no truncator configured, events retained");
            }
        }
        Ok(())
    }

    async fn resolve_cursor(&self, resume_after: Option<Uuid>) -> Result<SequenceId, BackendError> {
        let Some(event_id) = resume_after else {
            return Ok(SequenceId::ORIGIN);
        };
        self.backend
            .inner
            .events
            .find_sequence_id(&self.log_id, event_id)
            .await?
            .ok_or_else(|| BackendError::ResumePointNotFound {
                log_id: self.log_id.clone(),
                event_id,
            })
    }
}
