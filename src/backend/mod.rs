//! Event Log Backend.
//!
//! Implements submit, subscribe, snapshot load and snapshot replace on top
//! of the [`Broker`] and the two stores. The backend owns the per-log
//! subscriber table: the first subscription of a log registers on the
//! log's channel, and the broker-level handle is released only when the
//! log's last subscription goes away.
//!
//! Cursors live here, not in the broker, so a subscriber that resubscribes
//! with its last seen event id loses nothing when the broker is restarted.

mod event_log;
mod extension;
mod subscription;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, mpsc};
use uuid::Uuid;

pub use event_log::EventLog;
pub use extension::{LogTruncator, MembershipEvent, MembershipListener};
pub use subscription::{SubscriptionHandle, SubscriptionState};
use subscription::SubscriptionId;

use crate::broker::{Broker, BrokerState, ListenHandle, RegistrationSignal};
use crate::domain::{LogId, Snapshot};
use crate::error::BackendError;
use crate::persistence::{CasOutcome, EventStore, InsertOutcome, SnapshotStore};
use crate::transport::Notification;

/// Subscriptions of one log.
#[derive(Debug)]
struct LogGroup {
    lock: Arc<AsyncMutex<()>>,
    subscriptions: HashMap<SubscriptionId, ListenHandle>,
}

#[derive(Debug)]
pub(crate) struct BackendInner {
    node_id: Uuid,
    broker: Broker,
    events: Arc<dyn EventStore>,
    snapshots: Arc<dyn SnapshotStore>,
    truncator: Option<Arc<dyn LogTruncator>>,
    logs: Mutex<HashMap<LogId, LogGroup>>,
    next_subscription: AtomicU64,
    membership: Mutex<HashMap<u64, Arc<dyn MembershipListener>>>,
    next_membership: AtomicU64,
}

impl BackendInner {
    /// Registers a new subscription on `log_id` and returns its id, the
    /// broker registration signal and the log's scan lock.
    fn add_subscription(
        &self,
        log_id: &LogId,
        wakeups: mpsc::UnboundedSender<Notification>,
    ) -> (SubscriptionId, RegistrationSignal, Arc<AsyncMutex<()>>) {
        let id = self.next_subscription.fetch_add(1, Ordering::Relaxed);

        let mut logs = self.logs.lock();
        let group = logs.entry(log_id.clone()).or_insert_with(|| LogGroup {
            lock: Arc::new(AsyncMutex::new(())),
            subscriptions: HashMap::new(),
        });
        let (signal, handle) = self.broker.listen(log_id.as_str(), wakeups);
        group.subscriptions.insert(id, handle);
        (id, signal, Arc::clone(&group.lock))
    }

    /// Removes a subscription. Removing the last one of a log drops the
    /// log's entry. No-op if the subscription is already gone.
    pub(crate) fn remove_subscription(&self, log_id: &LogId, id: SubscriptionId) {
        let mut logs = self.logs.lock();
        let Some(group) = logs.get_mut(log_id) else {
            return;
        };
        let Some(handle) = group.subscriptions.remove(&id) else {
            return;
        };
        handle.unregister();
        if group.subscriptions.is_empty() {
            logs.remove(log_id);
            tracing::debug!(%log_id, "last subscription removed");
        }
    }
}

/// Builder for [`Backend`].
#[derive(Debug)]
pub struct BackendBuilder {
    broker: Broker,
    events: Arc<dyn EventStore>,
    snapshots: Arc<dyn SnapshotStore>,
    node_id: Option<Uuid>,
    truncator: Option<Arc<dyn LogTruncator>>,
}

impl BackendBuilder {
    /// Sets the node identity. A random one is generated otherwise.
    #[must_use]
    pub fn node_id(mut self, node_id: Uuid) -> Self {
        self.node_id = Some(node_id);
        self
    }

    /// Installs the collaborator [`EventLog::truncate`] delegates to.
    #[must_use]
    pub fn truncator(mut self, truncator: Arc<dyn LogTruncator>) -> Self {
        self.truncator = Some(truncator);
        self
    }

    /// Builds the backend.
    #[must_use]
    pub fn build(self) -> Backend {
        let node_id = self.node_id.unwrap_or_else(Uuid::new_v4);
        tracing::info!(%node_id, "event log backend ready");
        Backend {
            inner: Arc::new(BackendInner {
                node_id,
                broker: self.broker,
                events: self.events,
                snapshots: self.snapshots,
                truncator: self.truncator,
                logs: Mutex::new(HashMap::new()),
                next_subscription: AtomicU64::new(1),
                membership: Mutex::new(HashMap::new()),
                next_membership: AtomicU64::new(1),
            }),
        }
    }
}

/// Keeps a membership listener registered; dropping it removes the
/// listener.
#[derive(Debug)]
#[must_use = "dropping a MembershipRegistration removes the listener"]
pub struct MembershipRegistration {
    backend: Weak<BackendInner>,
    id: u64,
}

impl Drop for MembershipRegistration {
    fn drop(&mut self) {
        if let Some(backend) = self.backend.upgrade() {
            backend.membership.lock().remove(&self.id);
        }
    }
}

/// The event log backend.
///
/// Cheap to clone; clones share stores, broker and subscriber table.
#[derive(Debug, Clone)]
pub struct Backend {
    inner: Arc<BackendInner>,
}

impl Backend {
    /// Starts building a backend over a running broker and the two stores.
    #[must_use]
    pub fn builder(
        broker: Broker,
        events: Arc<dyn EventStore>,
        snapshots: Arc<dyn SnapshotStore>,
    ) -> BackendBuilder {
        BackendBuilder {
            broker,
            events,
            snapshots,
            node_id: None,
            truncator: None,
        }
    }

    /// Returns this node's identity.
    #[must_use]
    pub fn node_id(&self) -> Uuid {
        self.inner.node_id
    }

    /// Returns a handle to `log_id`. Idempotent; nothing is stored or
    /// registered until the handle is used.
    #[must_use]
    pub fn open_log(&self, log_id: LogId) -> EventLog {
        EventLog {
            backend: self.clone(),
            log_id,
        }
    }

    /// Returns the latest snapshot of `log_id`, or `None` if it has none.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::Store`] on store failure.
    pub async fn load_latest_snapshot(&self, log_id: &LogId) -> Result<Option<Snapshot>, BackendError> {
        Ok(self.inner.snapshots.find(log_id).await?)
    }

    /// Replaces the snapshot of `log_id`.
    ///
    /// Without `expected_snapshot_id` the snapshot must not exist yet
    /// (first writer wins). With it, the stored snapshot is replaced only
    /// if its id still equals `expected_snapshot_id`.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::SnapshotExists`] when an insert finds a
    /// snapshot, [`BackendError::SnapshotMismatch`] when another writer
    /// already advanced it, or [`BackendError::Store`] on store failure.
    /// On either conflict the caller should reload and retry.
    pub async fn replace_snapshot(
        &self,
        log_id: &LogId,
        expected_snapshot_id: Option<Uuid>,
        new_snapshot_id: Uuid,
        payload: &[u8],
    ) -> Result<(), BackendError> {
        let snapshot = Snapshot::new(new_snapshot_id, payload);
        let snapshots = &self.inner.snapshots;

        match expected_snapshot_id {
            None => match snapshots.insert_if_absent(log_id, &snapshot).await? {
                InsertOutcome::Inserted => {}
                InsertOutcome::AlreadyExists => {
                    return Err(BackendError::SnapshotExists(log_id.clone()));
                }
            },
            Some(expected) => match snapshots.compare_and_swap(log_id, expected, &snapshot).await? {
                CasOutcome::Swapped => {}
                CasOutcome::Mismatch => {
                    return Err(BackendError::SnapshotMismatch {
                        log_id: log_id.clone(),
                        expected,
                    });
                }
            },
        }

        tracing::info!(%log_id, snapshot_id = %new_snapshot_id, "snapshot replaced");
        Ok(())
    }

    /// Registers a membership listener.
    ///
    /// Membership propagation is not implemented by this backend; listeners
    /// only receive events passed to [`Backend::publish_membership`].
    pub fn add_membership_listener(&self, listener: Arc<dyn MembershipListener>) -> MembershipRegistration {
        let id = self.inner.next_membership.fetch_add(1, Ordering::Relaxed);
        self.inner.membership.lock().insert(id, listener);
        MembershipRegistration {
            backend: Arc::downgrade(&self.inner),
            id,
        }
    }

    /// Hands `event` to every registered membership listener.
    pub fn publish_membership(&self, event: MembershipEvent) {
        let listeners: Vec<_> = self.inner.membership.lock().values().map(Arc::clone).collect();
        for listener in listeners {
            listener.on_membership_change(event);
        }
    }

    /// Returns the broker's lifecycle state.
    #[must_use]
    pub fn broker_state(&self) -> BrokerState {
        self.inner.broker.state()
    }

    /// Returns the number of live subscriptions on `log_id`.
    #[must_use]
    pub fn subscription_count(&self, log_id: &LogId) -> usize {
        self.inner
            .logs
            .lock()
            .get(log_id)
            .map_or(0, |group| group.subscriptions.len())
    }

    /// Closes the broker. Live subscriptions end once its poll loop exits.
    pub fn shutdown(&self) {
        self.inner.broker.close();
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::indexing_slicing)]
mod tests {
    use std::collections::HashSet;
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::time::timeout;

    use super::*;
    use crate::domain::{Delivery, EventRecord};
    use crate::persistence::{InMemoryEventStore, InMemorySnapshotStore, StoreError};
    use crate::transport::{MemoryTransport, Notifier};

    struct Harness {
        backend: Backend,
        transport: MemoryTransport,
        events: Arc<InMemoryEventStore>,
    }

    async fn harness() -> Harness {
        harness_with(|builder| builder).await
    }

    async fn harness_with(configure: impl FnOnce(BackendBuilder) -> BackendBuilder) -> Harness {
        let transport = MemoryTransport::new();
        let notifier: Arc<dyn Notifier> = Arc::new(transport.clone());
        let Ok(broker) = Broker::start(Box::new(transport.connect()), notifier).await else {
            panic!("broker failed to start");
        };
        let events = Arc::new(InMemoryEventStore::new());
        let event_store: Arc<dyn EventStore> = Arc::clone(&events) as Arc<dyn EventStore>;
        let backend = configure(Backend::builder(
            broker,
            event_store,
            Arc::new(InMemorySnapshotStore::new()),
        ))
        .build();
        Harness {
            backend,
            transport,
            events,
        }
    }

    fn log_id(name: &str) -> LogId {
        let Ok(log_id) = LogId::new(name) else {
            panic!("invalid log id {name}");
        };
        log_id
    }

    async fn submit(log: &EventLog, payload: &str) -> (Uuid, crate::domain::SequenceId) {
        let event_id = Uuid::new_v4();
        let Ok(sequence_id) = log.submit(event_id, payload.as_bytes()).await else {
            panic!("submit failed");
        };
        (event_id, sequence_id)
    }

    async fn subscribe(
        log: &EventLog,
        resume_after: Option<Uuid>,
    ) -> (SubscriptionHandle, mpsc::Receiver<Delivery>) {
        let (tx, rx) = mpsc::channel(64);
        let Ok(handle) = log.subscribe(resume_after, tx).await else {
            panic!("subscribe failed");
        };
        assert_eq!(handle.activated().await, SubscriptionState::Active);
        (handle, rx)
    }

    async fn next_event(rx: &mut mpsc::Receiver<Delivery>) -> EventRecord {
        match timeout(Duration::from_secs(5), rx.recv()).await {
            Ok(Some(Delivery::Event(record))) => record,
            other => panic!("expected an event, got {other:?}"),
        }
    }

    async fn eventually(mut condition: impl FnMut() -> bool) {
        let waited = timeout(Duration::from_secs(5), async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await;
        assert!(waited.is_ok(), "condition not reached in time");
    }

    #[tokio::test]
    async fn open_log_is_idempotent() {
        let h = harness().await;
        let a = h.backend.open_log(log_id("L"));
        let b = h.backend.open_log(log_id("L"));
        assert_eq!(a.log_id(), b.log_id());
        assert_eq!(h.transport.listen_count("L"), 0);
    }

    #[tokio::test]
    async fn event_stored_before_subscribe_is_delivered_by_first_catch_up() {
        let h = harness().await;
        let log = h.backend.open_log(log_id("L"));
        let (a, _) = submit(&log, "x").await;

        let (_handle, mut rx) = subscribe(&log, None).await;
        let record = next_event(&mut rx).await;
        assert_eq!(record.event_id, a);
        assert_eq!(record.payload, b"x");
    }

    #[tokio::test]
    async fn resume_after_excludes_the_resume_point() {
        let h = harness().await;
        let log = h.backend.open_log(log_id("L"));
        let (_e1, _) = submit(&log, "1").await;
        let (e2, _) = submit(&log, "2").await;
        let (e3, _) = submit(&log, "3").await;

        let (_handle, mut rx) = subscribe(&log, Some(e2)).await;
        assert_eq!(next_event(&mut rx).await.event_id, e3);

        let (e4, _) = submit(&log, "4").await;
        assert_eq!(next_event(&mut rx).await.event_id, e4);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn delivers_every_event_once_in_order_under_concurrent_submits() {
        let h = harness().await;
        let log = h.backend.open_log(log_id("orders"));
        let (_early, _) = submit(&log, "early").await;
        let (_handle, mut rx) = subscribe(&log, None).await;

        let mut producers = Vec::new();
        for p in 0..4 {
            let log = log.clone();
            producers.push(tokio::spawn(async move {
                let mut ids = Vec::new();
                for i in 0..25 {
                    let id = Uuid::new_v4();
                    if log.submit(id, format!("{p}-{i}").as_bytes()).await.is_ok() {
                        ids.push(id);
                    }
                }
                ids
            }));
        }
        let mut expected = HashSet::new();
        for producer in producers {
            let Ok(ids) = producer.await else {
                panic!("producer panicked");
            };
            expected.extend(ids);
        }
        assert_eq!(expected.len(), 100);

        let first = next_event(&mut rx).await;
        let mut last = first.sequence_id;
        let mut seen = HashSet::new();
        for _ in 0..100 {
            let record = next_event(&mut rx).await;
            assert!(record.sequence_id > last, "out of order or duplicate delivery");
            last = record.sequence_id;
            assert!(seen.insert(record.event_id));
        }
        assert_eq!(seen, expected);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(rx.try_recv().is_err(), "unexpected extra delivery");
    }

    #[tokio::test]
    async fn unknown_resume_point_fails_without_side_effects() {
        let h = harness().await;
        let log = h.backend.open_log(log_id("L"));
        let (tx, _rx) = mpsc::channel(1);
        let missing = Uuid::new_v4();

        let result = log.subscribe(Some(missing), tx).await;
        assert!(matches!(
            result,
            Err(BackendError::ResumePointNotFound { event_id, .. }) if event_id == missing
        ));
        assert_eq!(h.backend.subscription_count(log.log_id()), 0);
        assert_eq!(h.transport.listen_count("L"), 0);
    }

    #[tokio::test]
    async fn resume_point_of_another_log_is_not_found() {
        let h = harness().await;
        let other = h.backend.open_log(log_id("other"));
        let (foreign, _) = submit(&other, "x").await;

        let log = h.backend.open_log(log_id("L"));
        let (tx, _rx) = mpsc::channel(1);
        assert!(matches!(
            log.subscribe(Some(foreign), tx).await,
            Err(BackendError::ResumePointNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn duplicate_event_id_is_rejected() {
        let h = harness().await;
        let log = h.backend.open_log(log_id("L"));
        let (id, _) = submit(&log, "x").await;
        assert!(matches!(
            log.submit(id, b"y").await,
            Err(BackendError::DuplicateEvent { .. })
        ));
        assert_eq!(h.events.len(log.log_id()), 1);
    }

    #[tokio::test]
    async fn subscriptions_share_one_listen_per_log() {
        let h = harness().await;
        let log = h.backend.open_log(log_id("L"));
        let (first, _rx1) = subscribe(&log, None).await;
        let (second, _rx2) = subscribe(&log, None).await;
        assert_eq!(h.backend.subscription_count(log.log_id()), 2);
        assert_eq!(h.transport.listen_count("L"), 1);

        first.cancel();
        assert_eq!(h.backend.subscription_count(log.log_id()), 1);
        second.cancel();
        assert_eq!(h.backend.subscription_count(log.log_id()), 0);
        eventually(|| h.transport.unlisten_count("L") == 1).await;
    }

    #[tokio::test]
    async fn resubscribe_right_after_cancelling_last_subscriber_keeps_receiving() {
        let h = harness().await;
        let log = h.backend.open_log(log_id("L"));
        let (first, _rx1) = subscribe(&log, None).await;

        first.cancel();
        let (_second, mut rx2) = subscribe(&log, None).await;

        let (id, _) = submit(&log, "after").await;
        assert_eq!(next_event(&mut rx2).await.event_id, id);
        assert!(h.transport.is_listening("L"));
    }

    #[tokio::test]
    async fn subscribe_cancel_churn_balances_listen_and_unlisten() {
        let h = harness().await;
        let log = h.backend.open_log(log_id("churn"));

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let log = log.clone();
            tasks.push(tokio::spawn(async move {
                for _ in 0..20 {
                    let (tx, _rx) = mpsc::channel(1);
                    if let Ok(handle) = log.subscribe(None, tx).await {
                        tokio::task::yield_now().await;
                        handle.cancel();
                    }
                }
            }));
        }
        for task in tasks {
            assert!(task.await.is_ok());
        }

        assert_eq!(h.backend.subscription_count(log.log_id()), 0);
        eventually(|| {
            h.transport.listen_count("churn") == h.transport.unlisten_count("churn")
                && !h.transport.is_listening("churn")
        })
        .await;
    }

    #[tokio::test]
    async fn store_error_is_delivered_and_subscription_stays_active() {
        let h = harness().await;
        let log = h.backend.open_log(log_id("L"));
        let (handle, mut rx) = subscribe(&log, None).await;

        h.events.set_read_failure(Some("disk on fire".to_string()));
        let (first, _) = submit(&log, "1").await;
        match timeout(Duration::from_secs(5), rx.recv()).await {
            Ok(Some(Delivery::Error { message, .. })) => assert!(message.contains("disk on fire")),
            other => panic!("expected a delivery error, got {other:?}"),
        }
        assert_eq!(handle.state(), SubscriptionState::Active);

        h.events.set_read_failure(None);
        let (second, _) = submit(&log, "2").await;
        assert_eq!(next_event(&mut rx).await.event_id, first);
        assert_eq!(next_event(&mut rx).await.event_id, second);
    }

    #[tokio::test]
    async fn dropping_the_receiver_cancels_the_subscription() {
        let h = harness().await;
        let log = h.backend.open_log(log_id("L"));
        let (handle, rx) = subscribe(&log, None).await;
        drop(rx);

        submit(&log, "x").await;
        eventually(|| handle.state() == SubscriptionState::Cancelled).await;
        assert_eq!(h.backend.subscription_count(log.log_id()), 0);
    }

    #[tokio::test]
    async fn dropping_the_receiver_cancels_without_a_wakeup() {
        let h = harness().await;
        let log = h.backend.open_log(log_id("L"));
        let (handle, rx) = subscribe(&log, None).await;
        drop(rx);

        eventually(|| handle.state() == SubscriptionState::Cancelled).await;
        assert_eq!(h.backend.subscription_count(log.log_id()), 0);
        eventually(|| h.transport.unlisten_count("L") == 1).await;
    }

    #[tokio::test]
    async fn stalled_consumer_only_blocks_its_own_log() {
        let h = harness().await;
        let a = h.backend.open_log(log_id("A"));
        let b = h.backend.open_log(log_id("B"));
        let (e1, _) = submit(&a, "1").await;
        let (e2, _) = submit(&a, "2").await;

        // Room for one delivery: the first scan sends e1 then waits on e2
        // while holding the scan lock of log A.
        let (tx1, mut rx1) = mpsc::channel(1);
        let capacity = tx1.clone();
        let Ok(stalled) = a.subscribe(None, tx1).await else {
            panic!("subscribe failed");
        };
        assert_eq!(stalled.activated().await, SubscriptionState::Active);
        eventually(|| capacity.capacity() == 0).await;

        let (_second, mut rx2) = subscribe(&a, None).await;
        assert!(
            timeout(Duration::from_millis(200), rx2.recv()).await.is_err(),
            "second subscriber of A scanned while A was stalled"
        );

        let (_other, mut rx3) = subscribe(&b, None).await;
        let (on_b, _) = submit(&b, "b").await;
        assert_eq!(next_event(&mut rx3).await.event_id, on_b);

        assert_eq!(next_event(&mut rx1).await.event_id, e1);
        assert_eq!(next_event(&mut rx1).await.event_id, e2);
        assert_eq!(next_event(&mut rx2).await.event_id, e1);
        assert_eq!(next_event(&mut rx2).await.event_id, e2);
    }

    #[tokio::test]
    async fn control_channel_cannot_be_subscribed() {
        let h = harness().await;
        let control = h.backend.inner.broker.control_channel().to_string();
        let log = h.backend.open_log(log_id(&control));
        let (tx, _rx) = mpsc::channel(1);

        assert!(matches!(
            log.subscribe(None, tx).await,
            Err(BackendError::InvalidLogId(_))
        ));
        assert_eq!(h.backend.subscription_count(log.log_id()), 0);
        assert_eq!(h.transport.listen_count(&control), 1);
        assert!(h.transport.is_listening(&control));

        // The broker still wakes for ordinary subscriptions.
        let other = h.backend.open_log(log_id("L"));
        let (_handle, mut rx) = subscribe(&other, None).await;
        let (id, _) = submit(&other, "x").await;
        assert_eq!(next_event(&mut rx).await.event_id, id);
    }

    #[tokio::test]
    async fn cancelled_subscription_receives_nothing_more() {
        let h = harness().await;
        let log = h.backend.open_log(log_id("L"));
        let (handle, mut rx) = subscribe(&log, None).await;
        handle.cancel();

        submit(&log, "x").await;
        match timeout(Duration::from_secs(5), rx.recv()).await {
            Ok(None) => {}
            other => panic!("expected the channel to close, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn broker_death_ends_subscriptions() {
        let h = harness().await;
        let log = h.backend.open_log(log_id("L"));
        let (handle, mut rx) = subscribe(&log, None).await;

        h.transport.sever();
        eventually(|| matches!(h.backend.broker_state(), BrokerState::Failed(_))).await;
        eventually(|| handle.state() == SubscriptionState::Cancelled).await;
        match timeout(Duration::from_secs(5), rx.recv()).await {
            Ok(None) => {}
            other => panic!("expected the channel to close, got {other:?}"),
        }

        let (tx, _rx) = mpsc::channel(1);
        assert!(matches!(
            log.subscribe(None, tx).await,
            Err(BackendError::BrokerUnavailable(_))
        ));
        // Stores keep working without the broker.
        assert!(log.submit(Uuid::new_v4(), b"y").await.is_ok());
    }

    #[tokio::test]
    async fn shutdown_stops_the_broker() {
        let h = harness().await;
        h.backend.shutdown();
        eventually(|| h.backend.broker_state() == BrokerState::Stopped).await;
    }

    #[tokio::test]
    async fn read_after_returns_one_catch_up() {
        let h = harness().await;
        let log = h.backend.open_log(log_id("L"));
        let (e1, _) = submit(&log, "1").await;
        let (e2, _) = submit(&log, "2").await;

        let Ok(all) = log.read_after(None).await else {
            panic!("read failed");
        };
        assert_eq!(all.iter().map(|r| r.event_id).collect::<Vec<_>>(), vec![e1, e2]);

        let Ok(tail) = log.read_after(Some(e1)).await else {
            panic!("read failed");
        };
        assert_eq!(tail.len(), 1);
        assert_eq!(tail[0].event_id, e2);
    }

    #[tokio::test]
    async fn snapshot_insert_then_compare_and_swap() {
        let h = harness().await;
        let l = log_id("L");
        let (n1, n2) = (Uuid::new_v4(), Uuid::new_v4());

        assert!(matches!(h.backend.load_latest_snapshot(&l).await, Ok(None)));
        assert!(h.backend.replace_snapshot(&l, None, n1, b"p1").await.is_ok());
        assert!(matches!(
            h.backend.replace_snapshot(&l, None, n2, b"p1b").await,
            Err(BackendError::SnapshotExists(_))
        ));
        assert!(h.backend.replace_snapshot(&l, Some(n1), n2, b"p2").await.is_ok());

        let Ok(Some(snapshot)) = h.backend.load_latest_snapshot(&l).await else {
            panic!("snapshot missing");
        };
        assert_eq!(snapshot, Snapshot::new(n2, b"p2".to_vec()));
    }

    #[tokio::test]
    async fn stale_compare_and_swap_is_reported() {
        let h = harness().await;
        let l = log_id("L");
        let n1 = Uuid::new_v4();
        assert!(h.backend.replace_snapshot(&l, None, n1, b"p1").await.is_ok());

        let a = {
            let backend = h.backend.clone();
            let l = l.clone();
            tokio::spawn(async move { backend.replace_snapshot(&l, Some(n1), Uuid::new_v4(), b"a").await })
        };
        let b = {
            let backend = h.backend.clone();
            let l = l.clone();
            tokio::spawn(async move { backend.replace_snapshot(&l, Some(n1), Uuid::new_v4(), b"b").await })
        };
        let (Ok(a), Ok(b)) = (a.await, b.await) else {
            panic!("writer panicked");
        };

        let successes = [&a, &b].iter().filter(|r| r.is_ok()).count();
        let mismatches = [&a, &b]
            .iter()
            .filter(|r| matches!(r, Err(BackendError::SnapshotMismatch { .. })))
            .count();
        assert_eq!(successes, 1);
        assert_eq!(mismatches, 1);
    }

    #[derive(Debug, Default)]
    struct RecordingTruncator {
        calls: Mutex<Vec<(LogId, Uuid)>>,
    }

    #[async_trait]
    impl LogTruncator for RecordingTruncator {
        async fn truncate(&self, log_id: &LogId, older_than: Uuid) -> Result<(), StoreError> {
            self.calls.lock().push((log_id.clone(), older_than));
            Ok(())
        }
    }

    #[tokio::test]
    async fn truncate_without_truncator_retains_events() {
        let h = harness().await;
        let log = h.backend.open_log(log_id("L"));
        submit(&log, "x").await;
        assert!(log.truncate(Uuid::new_v4()).await.is_ok());
        assert_eq!(h.events.len(log.log_id()), 1);
    }

    #[tokio::test]
    async fn truncate_delegates_to_truncator() {
        let truncator = Arc::new(RecordingTruncator::default());
        let installed: Arc<dyn LogTruncator> = Arc::clone(&truncator) as Arc<dyn LogTruncator>;
        let h = harness_with(|builder| builder.truncator(installed)).await;
        let log = h.backend.open_log(log_id("L"));
        let cutoff = Uuid::new_v4();

        assert!(log.truncate(cutoff).await.is_ok());
        assert_eq!(truncator.calls.lock().as_slice(), &[(log_id("L"), cutoff)]);
    }

    #[derive(Debug, Default)]
    struct RecordingMembership {
        events: Mutex<Vec<MembershipEvent>>,
    }

    impl MembershipListener for RecordingMembership {
        fn on_membership_change(&self, event: MembershipEvent) {
            self.events.lock().push(event);
        }
    }

    #[tokio::test]
    async fn membership_listener_receives_until_registration_dropped() {
        let node = Uuid::new_v4();
        let h = harness_with(|builder| builder.node_id(node)).await;
        assert_eq!(h.backend.node_id(), node);

        let listener = Arc::new(RecordingMembership::default());
        let registration =
            h.backend.add_membership_listener(Arc::clone(&listener) as Arc<dyn MembershipListener>);
        h.backend.publish_membership(MembershipEvent::Joined { node_id: node });
        drop(registration);
        h.backend.publish_membership(MembershipEvent::Left { node_id: node });

        assert_eq!(
            listener.events.lock().as_slice(),
            &[MembershipEvent::Joined { node_id: node }]
        );
    }
}
