//! REST API layer: route handlers, DTOs, and router composition.
//!
//! All resource endpoints are mounted under `/api/v1`; `/health` and the
//! WebSocket endpoint `/ws` live at the root.

pub mod dto;
pub mod handlers;

use std::time::Duration;

use axum::Router;
use axum::http::StatusCode;
use axum::routing::get;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;

use crate::app_state::AppState;
use crate::error::{ErrorBody, ErrorResponse};
use crate::ws::handler::ws_handler;

/// OpenAPI document for the REST surface.
#[derive(Debug, OpenApi)]
#[openapi(
    paths(
        handlers::events::submit_event,
        handlers::events::read_events,
        handlers::snapshot::get_snapshot,
        handlers::snapshot::put_snapshot,
        handlers::system::node_handler,
        handlers::system::health_handler,
    ),
    components(schemas(
        dto::SubmitEventRequest,
        dto::SubmitEventResponse,
        dto::EventDto,
        dto::EventListResponse,
        dto::SnapshotResponse,
        dto::ReplaceSnapshotRequest,
        handlers::system::HealthResponse,
        handlers::system::NodeResponse,
        ErrorResponse,
        ErrorBody,
    )),
    tags(
        (name = "Events", description = "Append and read log events"),
        (name = "Snapshots", description = "Load and replace log snapshots"),
        (name = "System", description = "Health and node identity"),
    )
)]
pub struct ApiDoc;

/// Builds the REST router without state or middleware.
pub fn build_router() -> Router<AppState> {
    Router::new()
        .nest("/api/v1", handlers::routes())
        .merge(handlers::system::root_routes())
}

/// Builds the complete application: REST, WebSocket, Swagger UI (with the
/// `swagger-ui` feature), tracing, CORS and request timeout.
pub fn build_app(state: AppState, request_timeout: Duration) -> Router {
    let router = build_router().route("/ws", get(ws_handler));

    #[cfg(feature = "swagger-ui")]
    let router = router.merge(
        utoipa_swagger_ui::SwaggerUi::new("/swagger-ui").url("/api-doc/openapi.json", ApiDoc::openapi()),
    );

    router
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            request_timeout,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
