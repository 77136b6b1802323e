//! Snapshot DTOs.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Response body for `GET /logs/{log_id}/snapshot`.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SnapshotResponse {
    /// The log the snapshot belongs to.
    pub log_id: String,
    /// Current snapshot id; pass it as `expected_snapshot_id` to replace.
    pub snapshot_id: Uuid,
    /// Snapshot payload, decoded as UTF-8.
    pub payload: String,
}

/// Request body for `PUT /logs/{log_id}/snapshot`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct ReplaceSnapshotRequest {
    /// Id of the snapshot being replaced. Omit when the log has none yet.
    #[serde(default)]
    pub expected_snapshot_id: Option<Uuid>,
    /// Id of the new snapshot.
    pub new_snapshot_id: Uuid,
    /// Snapshot payload.
    pub payload: String,
}
