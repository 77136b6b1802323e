//! Domain layer: log identity, stored events, snapshots.
//!
//! These are the values that flow between the stores, the backend, and
//! the outer HTTP/WebSocket surfaces.

pub mod event;
pub mod log_id;
pub mod snapshot;

pub use event::{Delivery, EventRecord, SequenceId};
pub use log_id::{LogId, MAX_LOG_ID_BYTES};
pub use snapshot::Snapshot;
