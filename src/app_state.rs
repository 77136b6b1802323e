//! Shared application state injected into all Axum handlers.

use crate::backend::Backend;

/// Shared application state available to all handlers via Axum's
/// `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Event log backend.
    pub backend: Backend,
    /// Capacity of each WebSocket subscription's delivery channel.
    pub delivery_buffer: usize,
}
