//! System endpoints: health check and node identity.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::broker::BrokerState;

/// Health check response.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    /// `healthy` while the broker runs, `degraded` otherwise.
    pub status: String,
    /// `running`, `stopped` or `failed`.
    pub broker: String,
    /// Failure reason when the broker died.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub broker_error: Option<String>,
    /// Server time.
    pub timestamp: String,
    /// Crate version.
    pub version: String,
}

/// Node identity response.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct NodeResponse {
    /// This node's identity.
    pub node_id: Uuid,
}

/// `GET /health`: Service health status.
///
/// Live subscriptions need the notification broker, so a stopped or failed
/// broker makes the node unhealthy even though the stores still work.
#[utoipa::path(
    get,
    path = "/health",
    tag = "System",
    summary = "Health check",
    description = "Reports the notification broker state, version, and current timestamp.",
    responses(
        (status = 200, description = "Broker running", body = HealthResponse),
        (status = 503, description = "Broker stopped or failed", body = HealthResponse),
    )
)]
pub async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let (status, broker, broker_error) = match state.backend.broker_state() {
        BrokerState::Running => (StatusCode::OK, "running", None),
        BrokerState::Stopped => (StatusCode::SERVICE_UNAVAILABLE, "stopped", None),
        BrokerState::Failed(reason) => (StatusCode::SERVICE_UNAVAILABLE, "failed", Some(reason)),
    };
    (
        status,
        Json(HealthResponse {
            status: if status.is_success() { "healthy" } else { "degraded" }.to_string(),
            broker: broker.to_string(),
            broker_error,
            timestamp: Utc::now().to_rfc3339(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }),
    )
}

/// `GET /api/v1/node`: Node identity.
#[utoipa::path(
    get,
    path = "/api/v1/node",
    tag = "System",
    summary = "Node identity",
    responses(
        (status = 200, description = "This node's id", body = NodeResponse),
    )
)]
pub async fn node_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(NodeResponse {
        node_id: state.backend.node_id(),
    })
}

/// System routes mounted under `/api/v1`.
pub fn routes() -> Router<AppState> {
    Router::new().route("/node", get(node_handler))
}

/// System routes mounted at the root level (not under /api/v1).
pub fn root_routes() -> Router<AppState> {
    Router::new().route("/health", get(health_handler))
}
