//! Backend error types with HTTP status code mapping.
//!
//! [`BackendError`] is the error surfaced by every public backend
//! operation. Each variant maps to a stable numeric code and, for the
//! REST surface, an HTTP status with a structured JSON body.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::broker::BrokerError;
use crate::domain::LogId;
use crate::persistence::StoreError;

/// Structured JSON error response body.
///
/// ```json
/// {
///   "error": {
///     "code": 2001,
///     "message": "resume point not found: event 0d1c... in log orders"
///   }
/// }
/// ```
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    /// Structured error payload.
    pub error: ErrorBody,
}

/// Inner error body with numeric code and human-readable message.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    /// Numeric error code.
    pub code: u32,
    /// Human-readable error message.
    pub message: String,
    /// Optional additional details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Error returned by backend operations.
///
/// # Error Code Ranges
///
/// | Range     | Category          | HTTP Status               |
/// |-----------|-------------------|---------------------------|
/// | 1000–1999 | Validation        | 400 Bad Request           |
/// | 2000–2099 | Not Found         | 404 Not Found             |
/// | 2100–2199 | Conflict          | 409 Conflict              |
/// | 3000–3999 | Server            | 500 / 503                 |
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// Request validation failed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Log name is not usable as a channel name.
    #[error("invalid log id: {0}")]
    InvalidLogId(String),

    /// `subscribe` was given a resume event id the store does not know.
    #[error("resume point not found: event {event_id} in log {log_id}")]
    ResumePointNotFound {
        /// Log that was searched.
        log_id: LogId,
        /// Unknown event id.
        event_id: Uuid,
    },

    /// No snapshot is stored for the log.
    #[error("no snapshot stored for log {0}")]
    SnapshotNotFound(LogId),

    /// First-writer-wins insert lost: a snapshot already exists.
    #[error("snapshot already exists for log {0}")]
    SnapshotExists(LogId),

    /// Compare-and-swap lost: the stored snapshot id is not the expected one.
    #[error("snapshot for log {log_id} is no longer {expected}")]
    SnapshotMismatch {
        /// Log whose snapshot was replaced concurrently.
        log_id: LogId,
        /// The stale id the caller expected.
        expected: Uuid,
    },

    /// The event id is already used in this log.
    #[error("event {event_id} already exists in log {log_id}")]
    DuplicateEvent {
        /// Log the event was submitted to.
        log_id: LogId,
        /// The reused id.
        event_id: Uuid,
    },

    /// Event or snapshot store failure.
    #[error("store error: {0}")]
    Store(String),

    /// The notification broker is not running.
    #[error("notification broker unavailable: {0}")]
    BrokerUnavailable(String),

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl BackendError {
    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::InvalidRequest(_) => 1001,
            Self::InvalidLogId(_) => 1002,
            Self::ResumePointNotFound { .. } => 2001,
            Self::SnapshotNotFound(_) => 2002,
            Self::SnapshotExists(_) => 2101,
            Self::SnapshotMismatch { .. } => 2102,
            Self::DuplicateEvent { .. } => 2103,
            Self::Internal(_) => 3000,
            Self::Store(_) => 3001,
            Self::BrokerUnavailable(_) => 3002,
        }
    }

    /// Returns the HTTP status code for this variant.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) | Self::InvalidLogId(_) => StatusCode::BAD_REQUEST,
            Self::ResumePointNotFound { .. } | Self::SnapshotNotFound(_) => StatusCode::NOT_FOUND,
            Self::SnapshotExists(_) | Self::SnapshotMismatch { .. } | Self::DuplicateEvent { .. } => {
                StatusCode::CONFLICT
            }
            Self::Store(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::BrokerUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Returns `true` for the two snapshot replacement conflicts a caller
    /// resolves by reloading and retrying.
    #[must_use]
    pub const fn is_snapshot_conflict(&self) -> bool {
        matches!(self, Self::SnapshotExists(_) | Self::SnapshotMismatch { .. })
    }
}

impl From<StoreError> for BackendError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DuplicateEvent { log_id, event_id } => {
                Self::DuplicateEvent { log_id, event_id }
            }
            other => Self::Store(other.to_string()),
        }
    }
}

impl From<BrokerError> for BackendError {
    fn from(err: BrokerError) -> Self {
        Self::BrokerUnavailable(err.to_string())
    }
}

impl IntoResponse for BackendError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(code = self.error_code(), error = %self, "request failed");
        }
        let body = ErrorResponse {
            error: ErrorBody {
                code: self.error_code(),
                message: self.to_string(),
                details: None,
            },
        };
        let mut response = axum::Json(body).into_response();
        *response.status_mut() = status;
        response
    }
}
