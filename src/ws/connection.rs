//! WebSocket connection state machine.
//!
//! Handles the read/write loop for a single WebSocket connection:
//! commands from the client open and cancel log subscriptions, and
//! deliveries from those subscriptions are pushed back as they arrive.

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use super::messages::{WsCommand, WsMessage, WsMessageType};
use super::subscription::SubscriptionManager;
use crate::backend::Backend;
use crate::domain::LogId;
use crate::error::BackendError;

/// Runs the read/write loop for a single WebSocket connection.
///
/// Returns when the client closes the socket or a write fails. Every
/// subscription opened on the connection is cancelled on return.
pub async fn run_connection(socket: WebSocket, backend: Backend, delivery_buffer: usize) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::channel(delivery_buffer.max(1));
    let mut subs = SubscriptionManager::new(outbound_tx, delivery_buffer);

    loop {
        tokio::select! {
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let reply = handle_text_message(&text, &backend, &mut subs).await;
                        let Ok(json) = serde_json::to_string(&reply) else {
                            continue;
                        };
                        if ws_tx.send(Message::text(json)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        tracing::debug!(error = %e, "ws read failed");
                        break;
                    }
                    _ => {}
                }
            }
            Some(routed) = outbound_rx.recv() => {
                let Some(delivery) = subs.accept(routed) else {
                    continue;
                };
                let Ok(json) = serde_json::to_string(&WsMessage::from_delivery(delivery)) else {
                    continue;
                };
                if ws_tx.send(Message::text(json)).await.is_err() {
                    break;
                }
            }
        }
    }

    tracing::debug!(subscriptions = subs.count(), "ws connection closed");
}

/// Handles a text message from the client and returns the reply.
async fn handle_text_message(text: &str, backend: &Backend, subs: &mut SubscriptionManager) -> WsMessage {
    let Ok(msg) = serde_json::from_str::<WsMessage>(text) else {
        return WsMessage::error("", &BackendError::InvalidRequest("malformed JSON".to_string()));
    };
    if msg.msg_type != WsMessageType::Command {
        return WsMessage::error(
            msg.id,
            &BackendError::InvalidRequest("expected a message of type command".to_string()),
        );
    }
    let command = match serde_json::from_value::<WsCommand>(msg.payload) {
        Ok(command) => command,
        Err(e) => {
            return WsMessage::error(msg.id, &BackendError::InvalidRequest(format!("unknown command: {e}")));
        }
    };

    match execute(command, backend, subs).await {
        Ok(payload) => WsMessage::new(msg.id, WsMessageType::Response, payload),
        Err(err) => WsMessage::error(msg.id, &err),
    }
}

async fn execute(
    command: WsCommand,
    backend: &Backend,
    subs: &mut SubscriptionManager,
) -> Result<serde_json::Value, BackendError> {
    match command {
        WsCommand::Subscribe { log_id, resume_after } => {
            let log_id = LogId::new(log_id)?;
            let (tx, rx) = subs.channel();
            let handle = backend.open_log(log_id.clone()).subscribe(resume_after, tx).await?;
            subs.insert(handle, rx);
            tracing::debug!(%log_id, "ws subscribed");
            Ok(serde_json::json!({
                "subscribed": log_id,
                "resume_after": resume_after,
                "count": subs.count(),
            }))
        }
        WsCommand::Unsubscribe { log_id } => {
            let log_id = LogId::new(log_id)?;
            let was_subscribed = subs.remove(&log_id);
            Ok(serde_json::json!({
                "unsubscribed": log_id,
                "was_subscribed": was_subscribed,
                "remaining_count": subs.count(),
            }))
        }
    }
}
