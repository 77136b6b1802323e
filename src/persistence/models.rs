//! Database row models for the `event_log` and `snapshot` tables.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::StoreError;
use crate::domain::{EventRecord, LogId, SequenceId, Snapshot};

/// A row of the `event_log` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct EventRow {
    /// `BIGSERIAL` position.
    pub sequence_id: i64,
    /// Caller-chosen id.
    pub event_id: Uuid,
    /// Owning log name.
    pub log_id: String,
    /// Opaque payload.
    pub payload: Vec<u8>,
    /// Server-side insertion timestamp.
    pub created_at: DateTime<Utc>,
}

impl TryFrom<EventRow> for EventRecord {
    type Error = StoreError;

    fn try_from(row: EventRow) -> Result<Self, Self::Error> {
        let log_id = LogId::new(row.log_id)
            .map_err(|e| StoreError::CorruptRow(format!("event {}: {e}", row.sequence_id)))?;
        Ok(Self {
            sequence_id: SequenceId::new(row.sequence_id),
            event_id: row.event_id,
            log_id,
            payload: row.payload,
        })
    }
}

/// A row of the `snapshot` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SnapshotRow {
    /// Log name (primary key).
    pub log_id: String,
    /// Current version tag.
    pub snapshot_id: Uuid,
    /// Opaque payload.
    pub payload: Vec<u8>,
    /// Last replacement timestamp.
    pub updated_at: DateTime<Utc>,
}

impl From<SnapshotRow> for Snapshot {
    fn from(row: SnapshotRow) -> Self {
        Self {
            snapshot_id: row.snapshot_id,
            payload: row.payload,
        }
    }
}
