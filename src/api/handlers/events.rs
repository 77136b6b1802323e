//! Event handlers: submit and read.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};

use crate::api::dto::{
    EventDto, EventListResponse, ReadEventsParams, SubmitEventRequest, SubmitEventResponse,
};
use crate::app_state::AppState;
use crate::domain::LogId;
use crate::error::{BackendError, ErrorResponse};

/// `POST /logs/{log_id}/events`: Append an event.
///
/// # Errors
///
/// Returns [`BackendError`] on an invalid log id, a reused event id, or
/// store failure.
#[utoipa::path(
    post,
    path = "/api/v1/logs/{log_id}/events",
    tag = "Events",
    summary = "Submit an event",
    description = "Appends the event and wakes every subscriber of the log. Returns once the event is durably stored.",
    params(("log_id" = String, Path, description = "Log name")),
    request_body = SubmitEventRequest,
    responses(
        (status = 201, description = "Event stored", body = SubmitEventResponse),
        (status = 400, description = "Invalid log id", body = ErrorResponse),
        (status = 409, description = "Event id already used in this log", body = ErrorResponse),
    )
)]
pub async fn submit_event(
    State(state): State<AppState>,
    Path(log_id): Path<String>,
    Json(req): Json<SubmitEventRequest>,
) -> Result<impl IntoResponse, BackendError> {
    let log = state.backend.open_log(LogId::new(log_id)?);
    let sequence_id = log.submit(req.event_id, req.payload.as_bytes()).await?;

    let response = SubmitEventResponse {
        log_id: log.log_id().to_string(),
        event_id: req.event_id,
        sequence_id: sequence_id.get(),
    };
    Ok((StatusCode::CREATED, Json(response)))
}

/// `GET /logs/{log_id}/events`: Read events after a resume point.
///
/// # Errors
///
/// Returns [`BackendError`] on an invalid log id, an unknown resume point,
/// or store failure.
#[utoipa::path(
    get,
    path = "/api/v1/logs/{log_id}/events",
    tag = "Events",
    summary = "Read events",
    description = "Runs one catch-up scan: every event stored strictly after `after`, or the whole log.",
    params(("log_id" = String, Path, description = "Log name"), ReadEventsParams),
    responses(
        (status = 200, description = "Events in sequence order", body = EventListResponse),
        (status = 404, description = "Resume point not found in this log", body = ErrorResponse),
    )
)]
pub async fn read_events(
    State(state): State<AppState>,
    Path(log_id): Path<String>,
    Query(params): Query<ReadEventsParams>,
) -> Result<impl IntoResponse, BackendError> {
    let log = state.backend.open_log(LogId::new(log_id)?);
    let events = log.read_after(params.after).await?;

    Ok(Json(EventListResponse {
        log_id: log.log_id().to_string(),
        events: events.into_iter().map(EventDto::from).collect(),
    }))
}

/// Event routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/logs/{log_id}/events", post(submit_event).get(read_events))
}
