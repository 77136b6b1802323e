//! WebSocket layer: connection handling, message routing, subscriptions.
//!
//! The WebSocket endpoint at `/ws` is the live `subscribe` surface: each
//! `subscribe` command opens a backend subscription whose deliveries are
//! pushed to the client until it unsubscribes or disconnects.

pub mod connection;
pub mod handler;
pub mod messages;
pub mod subscription;
