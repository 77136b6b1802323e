//! Compacted per-log checkpoints.

use uuid::Uuid;

/// The single stored checkpoint of a log.
///
/// Replaced wholesale through compare-and-swap on `snapshot_id`, never
/// appended to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    /// Version tag; the expected value for the next replacement.
    pub snapshot_id: Uuid,
    /// Opaque checkpoint payload.
    pub payload: Vec<u8>,
}

impl Snapshot {
    /// Creates a snapshot value.
    #[must_use]
    pub fn new(snapshot_id: Uuid, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            snapshot_id,
            payload: payload.into(),
        }
    }
}
