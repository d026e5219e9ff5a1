//! Service layer: the optimistic feed/undo engine.
//!
//! [`StatusView`] is the entry point. It owns a [`ViewState`] and composes
//! the pieces that act on it:
//!
//! - [`ViewModelLoader`] builds views from the cache and the store.
//! - [`FeedCoordinator`] runs feed and undo as [`OptimisticTransaction`]s
//!   under a [`SingleFlight`] flag and arms the [`EchoSuppressor`].
//! - [`UndoWindowTimer`] counts the undo window down locally.
//! - [`RealtimeHandler`] turns change notices into reloads, minus echoes.

pub mod coordinator;
pub mod echo;
pub mod loader;
pub mod realtime;
pub mod single_flight;
pub mod state;
pub mod status_view;
pub mod transaction;
pub mod undo_timer;

pub use coordinator::{FeedCoordinator, FeedOutcome, FeedRequest, FeedTargets, UndoOutcome};
pub use echo::{EchoSuppressor, EchoToken};
pub use loader::ViewModelLoader;
pub use realtime::{NoticeOutcome, RealtimeHandler};
pub use single_flight::{FlightGuard, SingleFlight};
pub use state::ViewState;
pub use status_view::{BackgroundTasks, Collaborators, StatusView, ViewSettings};
pub use transaction::OptimisticTransaction;
pub use undo_timer::UndoWindowTimer;
