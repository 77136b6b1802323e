//! WebSocket message types: envelope, commands, and server payloads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::dto::EventDto;
use crate::domain::Delivery;
use crate::error::BackendError;

/// Top-level WebSocket message envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WsMessage {
    /// Client-provided ID for requests; server-generated for events.
    pub id: String,
    /// Message type discriminator.
    #[serde(rename = "type")]
    pub msg_type: WsMessageType,
    /// ISO-8601 timestamp.
    pub timestamp: DateTime<Utc>,
    /// Variant-specific payload.
    pub payload: serde_json::Value,
}

impl WsMessage {
    /// Builds a server message stamped with the current time.
    #[must_use]
    pub fn new(id: impl Into<String>, msg_type: WsMessageType, payload: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            msg_type,
            timestamp: Utc::now(),
            payload,
        }
    }

    /// Builds an error reply to request `id`.
    #[must_use]
    pub fn error(id: impl Into<String>, err: &BackendError) -> Self {
        Self::new(
            id,
            WsMessageType::Error,
            serde_json::json!({
                "code": err.error_code(),
                "message": err.to_string(),
            }),
        )
    }

    /// Builds the push message for one delivery.
    #[must_use]
    pub fn from_delivery(delivery: Delivery) -> Self {
        let id = Uuid::new_v4().to_string();
        match delivery {
            Delivery::Event(record) => Self::new(
                id,
                WsMessageType::Event,
                serde_json::to_value(EventDto::from(record)).unwrap_or_default(),
            ),
            Delivery::Error { log_id, message } => {
                let err = BackendError::Store(message);
                Self::new(
                    id,
                    WsMessageType::Error,
                    serde_json::json!({
                        "log_id": log_id,
                        "code": err.error_code(),
                        "message": err.to_string(),
                    }),
                )
            }
        }
    }
}

/// Discriminator for WebSocket message types.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WsMessageType {
    /// Client → Server command.
    Command,
    /// Server → Client response to a command.
    Response,
    /// Server → Client stored event.
    Event,
    /// Server → Client error.
    Error,
}

/// Commands that a client can send over WebSocket, carried in the
/// envelope's payload.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum WsCommand {
    /// Subscribe to a log, replacing any existing subscription to it.
    Subscribe {
        /// Log to subscribe to.
        log_id: String,
        /// Only events stored after this event are delivered. Omit to
        /// receive the whole log.
        #[serde(default)]
        resume_after: Option<Uuid>,
    },
    /// Cancel the subscription to a log.
    Unsubscribe {
        /// Log to unsubscribe from.
        log_id: String,
    },
}
