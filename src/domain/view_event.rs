//! Events emitted whenever the status view changes.
//!
//! Every state transition of the view publishes a [`ViewEvent`] through
//! the [`super::EventBus`]. WebSocket clients receive them as pushes.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{UndoStatus, ViewModel};

/// Why the view changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateReason {
    /// Restored from the local snapshot cache on mount.
    CacheRestored,
    /// An optimistic feed or undo was applied.
    Optimistic,
    /// A pending event received its durable id.
    Reconciled,
    /// A failed remote write restored the pre-operation snapshot.
    RolledBack,
    /// Rebuilt from the store of record.
    Reloaded,
    /// The member's notifications were marked read.
    NotificationsRead,
}

/// Change to the status view.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum ViewEvent {
    /// The whole view was replaced.
    Updated {
        /// Cause of the update.
        reason: UpdateReason,
        /// New view.
        view: Box<ViewModel>,
        /// Emission timestamp.
        timestamp: DateTime<Utc>,
    },
    /// The undo countdown was re-evaluated.
    UndoTick {
        /// Current undo eligibility.
        status: UndoStatus,
        /// Emission timestamp.
        timestamp: DateTime<Utc>,
    },
}

impl ViewEvent {
    /// Builds an [`ViewEvent::Updated`] stamped now.
    #[must_use]
    pub fn updated(reason: UpdateReason, view: ViewModel) -> Self {
        Self::Updated {
            reason,
            view: Box::new(view),
            timestamp: Utc::now(),
        }
    }

    /// Returns the event type as a static string slice.
    #[must_use]
    pub const fn event_type_str(&self) -> &'static str {
        match self {
            Self::Updated { .. } => "updated",
            Self::UndoTick { .. } => "undo_tick",
        }
    }

    /// Returns the update reason, if this is an update.
    #[must_use]
    pub const fn reason(&self) -> Option<UpdateReason> {
        match self {
            Self::Updated { reason, .. } => Some(*reason),
            Self::UndoTick { .. } => None,
        }
    }
}
