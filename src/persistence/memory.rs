//! In-memory stores for tests and single-process deployments.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use uuid::Uuid;

use super::{CasOutcome, EventStore, InsertOutcome, SnapshotStore, StoreError};
use crate::domain::{EventRecord, LogId, SequenceId, Snapshot};

#[derive(Debug, Default)]
struct EventTable {
    last_sequence: i64,
    logs: HashMap<LogId, Vec<EventRecord>>,
}

/// In-memory [`EventStore`].
///
/// Sequence ids come from one counter shared by all logs, so they are
/// globally unique like a database sequence.
#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    table: Mutex<EventTable>,
    read_failure: RwLock<Option<String>>,
}

impl InMemoryEventStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent `query_after` fail with `message`, or
    /// restores normal reads when `None`.
    pub fn set_read_failure(&self, message: Option<String>) {
        *self.read_failure.write() = message;
    }

    /// Returns the number of events stored in `log_id`.
    #[must_use]
    pub fn len(&self, log_id: &LogId) -> usize {
        self.table.lock().logs.get(log_id).map_or(0, Vec::len)
    }

    /// Returns `true` if `log_id` holds no events.
    #[must_use]
    pub fn is_empty(&self, log_id: &LogId) -> bool {
        self.len(log_id) == 0
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn append(
        &self,
        log_id: &LogId,
        event_id: Uuid,
        payload: &[u8],
    ) -> Result<SequenceId, StoreError> {
        let mut table = self.table.lock();
        if table
            .logs
            .get(log_id)
            .is_some_and(|events| events.iter().any(|e| e.event_id == event_id))
        {
            return Err(StoreError::DuplicateEvent {
                log_id: log_id.clone(),
                event_id,
            });
        }

        table.last_sequence = table.last_sequence.saturating_add(1);
        let sequence_id = SequenceId::new(table.last_sequence);
        table.logs.entry(log_id.clone()).or_default().push(EventRecord {
            sequence_id,
            event_id,
            log_id: log_id.clone(),
            payload: payload.to_vec(),
        });
        Ok(sequence_id)
    }

    async fn find_sequence_id(
        &self,
        log_id: &LogId,
        event_id: Uuid,
    ) -> Result<Option<SequenceId>, StoreError> {
        let table = self.table.lock();
        Ok(table.logs.get(log_id).and_then(|events| {
            events
                .iter()
                .find(|e| e.event_id == event_id)
                .map(|e| e.sequence_id)
        }))
    }

    async fn query_after(
        &self,
        log_id: &LogId,
        after: SequenceId,
    ) -> Result<Vec<EventRecord>, StoreError> {
        if let Some(message) = self.read_failure.read().clone() {
            return Err(StoreError::Database(message));
        }
        let table = self.table.lock();
        Ok(table
            .logs
            .get(log_id)
            .map(|events| {
                events
                    .iter()
                    .filter(|e| e.sequence_id > after)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

/// In-memory [`SnapshotStore`].
#[derive(Debug, Default)]
pub struct InMemorySnapshotStore {
    rows: Mutex<HashMap<LogId, Snapshot>>,
}

impl InMemorySnapshotStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SnapshotStore for InMemorySnapshotStore {
    async fn find(&self, log_id: &LogId) -> Result<Option<Snapshot>, StoreError> {
        Ok(self.rows.lock().get(log_id).cloned())
    }

    async fn insert_if_absent(
        &self,
        log_id: &LogId,
        snapshot: &Snapshot,
    ) -> Result<InsertOutcome, StoreError> {
        let mut rows = self.rows.lock();
        if rows.contains_key(log_id) {
            return Ok(InsertOutcome::AlreadyExists);
        }
        rows.insert(log_id.clone(), snapshot.clone());
        Ok(InsertOutcome::Inserted)
    }

    async fn compare_and_swap(
        &self,
        log_id: &LogId,
        expected_id: Uuid,
        replacement: &Snapshot,
    ) -> Result<CasOutcome, StoreError> {
        let mut rows = self.rows.lock();
        match rows.get_mut(log_id) {
            Some(current) if current.snapshot_id == expected_id => {
                *current = replacement.clone();
                Ok(CasOutcome::Swapped)
            }
            _ => Ok(CasOutcome::Mismatch),
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    fn log(name: &str) -> LogId {
        let Ok(id) = LogId::new(name) else {
            panic!("valid log id");
        };
        id
    }

    #[tokio::test]
    async fn sequence_ids_increase_across_logs() {
        let store = InMemoryEventStore::new();
        let Ok(a) = store.append(&log("a"), Uuid::new_v4(), b"1").await else {
            panic!("append failed");
        };
        let Ok(b) = store.append(&log("b"), Uuid::new_v4(), b"2").await else {
            panic!("append failed");
        };
        let Ok(c) = store.append(&log("a"), Uuid::new_v4(), b"3").await else {
            panic!("append failed");
        };
        assert!(a < b && b < c);
    }

    #[tokio::test]
    async fn query_after_is_exclusive_and_scoped_to_log() {
        let store = InMemoryEventStore::new();
        let first = Uuid::new_v4();
        let Ok(cursor) = store.append(&log("L"), first, b"x").await else {
            panic!("append failed");
        };
        let _ = store.append(&log("other"), Uuid::new_v4(), b"noise").await;
        let second = Uuid::new_v4();
        let _ = store.append(&log("L"), second, b"y").await;

        let Ok(events) = store.query_after(&log("L"), cursor).await else {
            panic!("query failed");
        };
        assert_eq!(events.len(), 1);
        assert_eq!(events.first().map(|e| e.event_id), Some(second));

        let Ok(all) = store.query_after(&log("L"), SequenceId::ORIGIN).await else {
            panic!("query failed");
        };
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn duplicate_event_id_in_same_log_is_rejected() {
        let store = InMemoryEventStore::new();
        let id = Uuid::new_v4();
        assert!(store.append(&log("L"), id, b"x").await.is_ok());
        let dup = store.append(&log("L"), id, b"x").await;
        assert!(matches!(dup, Err(StoreError::DuplicateEvent { .. })));
        // Same id in another log is fine.
        assert!(store.append(&log("M"), id, b"x").await.is_ok());
        assert_eq!(store.len(&log("L")), 1);
    }

    #[tokio::test]
    async fn find_sequence_id_is_scoped_to_log() {
        let store = InMemoryEventStore::new();
        let id = Uuid::new_v4();
        let Ok(seq) = store.append(&log("L"), id, b"x").await else {
            panic!("append failed");
        };
        assert_eq!(store.find_sequence_id(&log("L"), id).await.ok(), Some(Some(seq)));
        assert_eq!(store.find_sequence_id(&log("M"), id).await.ok(), Some(None));
    }

    #[tokio::test]
    async fn injected_read_failure() {
        let store = InMemoryEventStore::new();
        store.set_read_failure(Some("disk on fire".to_string()));
        assert!(store.query_after(&log("L"), SequenceId::ORIGIN).await.is_err());
        store.set_read_failure(None);
        assert!(store.query_after(&log("L"), SequenceId::ORIGIN).await.is_ok());
    }

    #[tokio::test]
    async fn snapshot_insert_then_cas() {
        let store = InMemorySnapshotStore::new();
        let l = log("L");
        let n1 = Snapshot::new(Uuid::new_v4(), "p1");
        let n2 = Snapshot::new(Uuid::new_v4(), "p2");

        assert_eq!(store.insert_if_absent(&l, &n1).await.ok(), Some(InsertOutcome::Inserted));
        assert_eq!(
            store.insert_if_absent(&l, &n2).await.ok(),
            Some(InsertOutcome::AlreadyExists)
        );
        assert_eq!(
            store.compare_and_swap(&l, n2.snapshot_id, &n2).await.ok(),
            Some(CasOutcome::Mismatch)
        );
        assert_eq!(
            store.compare_and_swap(&l, n1.snapshot_id, &n2).await.ok(),
            Some(CasOutcome::Swapped)
        );
        assert_eq!(store.find(&l).await.ok(), Some(Some(n2)));
    }

    #[tokio::test]
    async fn cas_on_missing_row_is_mismatch() {
        let store = InMemorySnapshotStore::new();
        let snap = Snapshot::new(Uuid::new_v4(), "p");
        assert_eq!(
            store.compare_and_swap(&log("L"), Uuid::new_v4(), &snap).await.ok(),
            Some(CasOutcome::Mismatch)
        );
        assert_eq!(store.find(&log("L")).await.ok(), Some(None));
    }
}
