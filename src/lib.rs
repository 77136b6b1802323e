//! # pg-eventlog
//!
//! Durable, multi-subscriber event log on PostgreSQL.
//!
//! Events are appended to one table and snapshots to another; live
//! subscribers are woken through `LISTEN`/`NOTIFY`. Notifications only
//! say "something changed on this log": every wake-up runs a catch-up scan
//! against the event table from the subscriber's cursor, so coalesced or
//! lost notifications never cost an event.
//!
//! ## Architecture
//!
//! ```text
//! Clients (HTTP, WebSocket)
//!     │
//!     ├── REST Handlers (api/)
//!     ├── WS Handler (ws/)
//!     │
//!     ├── Backend / EventLog (backend/)   cursors, catch-up, snapshots
//!     │        │
//!     │        ├── Broker (broker/)       one connection, LISTEN/UNLISTEN, fan-out
//!     │        │       └── transport/     PgListener + pg_notify, or in-memory hub
//!     │        │
//!     │        └── Stores (persistence/)  event_log + snapshot tables, or in-memory
//!     │
//!     └── PostgreSQL
//! ```

pub mod api;
pub mod app_state;
pub mod backend;
pub mod bootstrap;
pub mod broker;
pub mod config;
pub mod domain;
pub mod error;
pub mod persistence;
pub mod transport;
pub mod ws;
