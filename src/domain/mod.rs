//! Domain layer: identifiers, pets, feeding events and the status view.
//!
//! This module holds the data model shared by the store collaborators and
//! the sync engine, plus the event bus that pushes view changes to UI
//! clients.

pub mod event_bus;
pub mod feeding_event;
pub mod household;
pub mod ids;
pub mod notification;
pub mod time;
pub mod view_event;
pub mod view_model;

pub use event_bus::EventBus;
pub use feeding_event::{FeedingEvent, NewFeedingEvent, ResolvedEvent, UNDO_WINDOW};
pub use household::{FREE_VISIBLE_HISTORY, FeedingState, Household, Member, Pet};
pub use ids::{EventId, EventKey, HouseholdId, MemberId, PetId, TempEventId};
pub use notification::{NewNotification, NotificationKind};
pub use view_event::{UpdateReason, ViewEvent};
pub use view_model::{UndoStatus, ViewModel};
