//! Extension points the backend exposes but does not implement.
//!
//! Membership propagation and log truncation belong to a full deployment.
//! The backend accepts implementations of these traits and otherwise
//! degrades to documented no-ops.

use std::fmt;

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::LogId;
use crate::persistence::StoreError;

/// A change in the set of nodes sharing this backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MembershipEvent {
    /// A node joined.
    Joined {
        /// Identity of the node.
        node_id: Uuid,
    },
    /// A node left.
    Left {
        /// Identity of the node.
        node_id: Uuid,
    },
}

/// Receives membership changes.
pub trait MembershipListener: Send + Sync + fmt::Debug + 'static {
    /// Called once per membership change.
    fn on_membership_change(&self, event: MembershipEvent);
}

/// Compacts the event store once a snapshot covers a prefix of a log.
#[async_trait]
pub trait LogTruncator: Send + Sync + fmt::Debug + 'static {
    /// Deletes the events of `log_id` stored before `older_than`.
    async fn truncate(&self, log_id: &LogId, older_than: Uuid) -> Result<(), StoreError>;
}
