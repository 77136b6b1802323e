//! Persistence layer: the event store and the snapshot store.
//!
//! The backend only sees the [`EventStore`] and [`SnapshotStore`] traits.
//! [`postgres`] implements both over `sqlx::PgPool`; [`memory`] keeps
//! everything in process for tests and `STORAGE_MODE=memory`.

pub mod memory;
pub mod models;
pub mod postgres;

use std::fmt;

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::{EventRecord, LogId, SequenceId, Snapshot};

pub use memory::{InMemoryEventStore, InMemorySnapshotStore};
pub use postgres::PostgresStore;

/// Error type for store operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    /// The event id is already used in this log.
    #[error("event {event_id} already exists in log {log_id}")]
    DuplicateEvent {
        /// Log the append targeted.
        log_id: LogId,
        /// The reused id.
        event_id: Uuid,
    },

    /// A stored row could not be turned back into a domain value.
    #[error("corrupt row: {0}")]
    CorruptRow(String),

    /// Database error.
    #[error("database error: {0}")]
    Database(String),
}

/// Result of a first-writer-wins snapshot insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// The row was created.
    Inserted,
    /// A snapshot already existed; nothing was written.
    AlreadyExists,
}

/// Result of a compare-and-swap snapshot update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CasOutcome {
    /// The expected id matched and the row was replaced.
    Swapped,
    /// No row with the expected id; nothing was written.
    Mismatch,
}

/// Append-only store of event rows.
///
/// Implementations must assign sequence ids that are strictly increasing
/// within a log and must not let a reader observe a later id of a log
/// before an earlier one.
#[async_trait]
pub trait EventStore: Send + Sync + fmt::Debug + 'static {
    /// Appends an event and returns its assigned sequence id.
    async fn append(
        &self,
        log_id: &LogId,
        event_id: Uuid,
        payload: &[u8],
    ) -> Result<SequenceId, StoreError>;

    /// Looks up the sequence id of `event_id` within `log_id`.
    async fn find_sequence_id(
        &self,
        log_id: &LogId,
        event_id: Uuid,
    ) -> Result<Option<SequenceId>, StoreError>;

    /// Returns every event of `log_id` with a sequence id greater than
    /// `after`, in increasing sequence order.
    async fn query_after(
        &self,
        log_id: &LogId,
        after: SequenceId,
    ) -> Result<Vec<EventRecord>, StoreError>;
}

/// One-row-per-log store of snapshots.
#[async_trait]
pub trait SnapshotStore: Send + Sync + fmt::Debug + 'static {
    /// Returns the stored snapshot of `log_id`, if any.
    async fn find(&self, log_id: &LogId) -> Result<Option<Snapshot>, StoreError>;

    /// Inserts a snapshot only if the log has none.
    async fn insert_if_absent(
        &self,
        log_id: &LogId,
        snapshot: &Snapshot,
    ) -> Result<InsertOutcome, StoreError>;

    /// Replaces the snapshot only if its current id equals `expected_id`.
    async fn compare_and_swap(
        &self,
        log_id: &LogId,
        expected_id: Uuid,
        replacement: &Snapshot,
    ) -> Result<CasOutcome, StoreError>;
}
