//! # petfeed-sync
//!
//! Optimistic feed/undo engine and household status daemon for a shared
//! pet-feeding app.
//!
//! A member taps "feed" and sees the result immediately; the write to the
//! store of record happens afterwards and is either reconciled (the
//! temporary event id is swapped for the durable one) or rolled back to
//! the exact pre-tap state. Other devices learn about the change through
//! a realtime notice and reload, while the device that made the change
//! swallows the echo of its own write.
//!
//! ## Architecture
//!
//! ```text
//! Clients (HTTP, WebSocket)
//!     │
//!     ├── REST Handlers (api/)
//!     ├── WS Handler (ws/)
//!     │
//!     ├── StatusView (service/)
//!     │     ├── FeedCoordinator ── OptimisticTransaction, SingleFlight
//!     │     ├── ViewModelLoader ── SnapshotCache
//!     │     ├── UndoWindowTimer
//!     │     └── RealtimeHandler ── EchoSuppressor
//!     ├── EventBus (domain/)
//!     │
//!     └── RemoteStore + ChangeNotifier (store/)
//!           ├── PostgreSQL (sqlx, LISTEN/NOTIFY)
//!           └── in-memory
//! ```

pub mod api;
pub mod app_state;
pub mod clock;
pub mod config;
pub mod domain;
pub mod error;
pub mod service;
pub mod store;
pub mod ws;
