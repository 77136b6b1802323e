//! Event DTOs for submit and read.

use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::domain::EventRecord;

/// Request body for `POST /logs/{log_id}/events`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct SubmitEventRequest {
    /// Caller-chosen id, unique within the log. Reusing it is a conflict.
    pub event_id: Uuid,
    /// Event payload.
    pub payload: String,
}

/// Response body for `POST /logs/{log_id}/events` (201 Created).
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SubmitEventResponse {
    /// Log the event was appended to.
    pub log_id: String,
    /// Echoed event id.
    pub event_id: Uuid,
    /// Store-assigned position.
    pub sequence_id: i64,
}

/// Query parameters for `GET /logs/{log_id}/events`.
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ReadEventsParams {
    /// Resume point: only events stored after this event are returned.
    /// Omit to read the whole log.
    pub after: Option<Uuid>,
}

/// One stored event.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct EventDto {
    /// Store-assigned position.
    pub sequence_id: i64,
    /// Caller-chosen id.
    pub event_id: Uuid,
    /// Owning log.
    pub log_id: String,
    /// Payload, decoded as UTF-8 (invalid sequences replaced).
    pub payload: String,
}

impl From<EventRecord> for EventDto {
    fn from(record: EventRecord) -> Self {
        Self {
            sequence_id: record.sequence_id.get(),
            event_id: record.event_id,
            log_id: record.log_id.into(),
            payload: String::from_utf8_lossy(&record.payload).into_owned(),
        }
    }
}

/// Response body for `GET /logs/{log_id}/events`.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct EventListResponse {
    /// The log that was read.
    pub log_id: String,
    /// Events in increasing sequence order.
    pub events: Vec<EventDto>,
}
