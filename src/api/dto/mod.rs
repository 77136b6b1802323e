//! Data Transfer Objects for REST request/response serialization.
//!
//! Payloads travel as UTF-8 text; the backend stores them as bytes.

pub mod event_dto;
pub mod snapshot_dto;

pub use event_dto::*;
pub use snapshot_dto::*;
