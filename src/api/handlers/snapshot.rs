//! Snapshot handlers: load and replace.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};

use crate::api::dto::{ReplaceSnapshotRequest, SnapshotResponse};
use crate::app_state::AppState;
use crate::domain::LogId;
use crate::error::{BackendError, ErrorResponse};

/// `GET /logs/{log_id}/snapshot`: Load the latest snapshot.
///
/// # Errors
///
/// Returns [`BackendError::SnapshotNotFound`] when the log has no snapshot.
#[utoipa::path(
    get,
    path = "/api/v1/logs/{log_id}/snapshot",
    tag = "Snapshots",
    summary = "Load the latest snapshot",
    params(("log_id" = String, Path, description = "Log name")),
    responses(
        (status = 200, description = "Current snapshot", body = SnapshotResponse),
        (status = 404, description = "No snapshot stored", body = ErrorResponse),
    )
)]
pub async fn get_snapshot(
    State(state): State<AppState>,
    Path(log_id): Path<String>,
) -> Result<impl IntoResponse, BackendError> {
    let log_id = LogId::new(log_id)?;
    let snapshot = state
        .backend
        .load_latest_snapshot(&log_id)
        .await?
        .ok_or_else(|| BackendError::SnapshotNotFound(log_id.clone()))?;

    Ok(Json(SnapshotResponse {
        log_id: log_id.into(),
        snapshot_id: snapshot.snapshot_id,
        payload: String::from_utf8_lossy(&snapshot.payload).into_owned(),
    }))
}

/// `PUT /logs/{log_id}/snapshot`: Replace the snapshot.
///
/// # Errors
///
/// Returns [`BackendError::SnapshotExists`] or
/// [`BackendError::SnapshotMismatch`] when another writer got there first.
#[utoipa::path(
    put,
    path = "/api/v1/logs/{log_id}/snapshot",
    tag = "Snapshots",
    summary = "Replace the snapshot",
    description = "Without `expected_snapshot_id` the log must have no snapshot yet. With it, the stored snapshot is replaced only if its id still matches. On 409 reload and retry.",
    params(("log_id" = String, Path, description = "Log name")),
    request_body = ReplaceSnapshotRequest,
    responses(
        (status = 204, description = "Snapshot replaced"),
        (status = 409, description = "Snapshot exists or was replaced concurrently", body = ErrorResponse),
    )
)]
pub async fn put_snapshot(
    State(state): State<AppState>,
    Path(log_id): Path<String>,
    Json(req): Json<ReplaceSnapshotRequest>,
) -> Result<impl IntoResponse, BackendError> {
    let log_id = LogId::new(log_id)?;
    state
        .backend
        .replace_snapshot(
            &log_id,
            req.expected_snapshot_id,
            req.new_snapshot_id,
            req.payload.as_bytes(),
        )
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Snapshot routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/logs/{log_id}/snapshot", get(get_snapshot).put(put_snapshot))
}
