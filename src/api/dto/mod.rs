//! Data Transfer Objects for REST request/response serialization.
//!
//! Identifiers are plain UUIDs on the wire except feeding event keys,
//! which render as `temp-<uuid>` while an event is still pending.

pub mod feed_dto;
pub mod status_dto;

pub use feed_dto::*;
pub use status_dto::*;
