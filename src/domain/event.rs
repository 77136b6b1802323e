//! Stored events, cursors, and what subscribers receive.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::LogId;

/// Store-assigned position of an event.
///
/// Globally unique and strictly increasing within a log. Stores assign
/// ids starting at 1, so [`SequenceId::ORIGIN`] sorts before every event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SequenceId(i64);

impl SequenceId {
    /// Cursor positioned before the first event of any log.
    pub const ORIGIN: Self = Self(0);

    /// Wraps a raw sequence value.
    #[must_use]
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    /// Returns the raw sequence value.
    #[must_use]
    pub const fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for SequenceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for SequenceId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

/// An immutable row of the event store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventRecord {
    /// Store-assigned position.
    pub sequence_id: SequenceId,
    /// Caller-chosen id, unique within the log.
    pub event_id: Uuid,
    /// Owning log.
    pub log_id: LogId,
    /// Opaque payload.
    pub payload: Vec<u8>,
}

/// One item pushed to a subscriber's delivery channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// A stored event, delivered in sequence order.
    Event(EventRecord),
    /// A catch-up scan failed. The subscription stays active and the next
    /// notification retries from the same cursor.
    Error {
        /// Log whose scan failed.
        log_id: LogId,
        /// Human-readable cause.
        message: String,
    },
}

impl Delivery {
    /// Returns the log this delivery belongs to.
    #[must_use]
    pub fn log_id(&self) -> &LogId {
        match self {
            Self::Event(record) => &record.log_id,
            Self::Error { log_id, .. } => log_id,
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn origin_precedes_first_assigned_id() {
        assert!(SequenceId::ORIGIN < SequenceId::new(1));
    }

    #[test]
    fn delivery_reports_its_log() {
        let Ok(log_id) = LogId::new("L") else {
            panic!("valid log id");
        };
        let delivery = Delivery::Error {
            log_id: log_id.clone(),
            message: "boom".to_string(),
        };
        assert_eq!(delivery.log_id(), &log_id);
    }
}
