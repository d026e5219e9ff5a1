//! WebSocket layer: connection handling, message routing, subscriptions.
//!
//! The WebSocket endpoint at `/ws` pushes every view event to connected
//! UI clients and accepts feed, undo, reload and status commands.

pub mod connection;
pub mod handler;
pub mod messages;
pub mod subscription;
