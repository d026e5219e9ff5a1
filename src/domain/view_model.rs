//! The composed status view consumed by UI clients.
//!
//! [`ViewModel`] is a disposable projection rebuilt from the store of
//! record. It is also what the snapshot cache persists for cold start.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{
    EventId, EventKey, FeedingEvent, Household, Member, Pet, PetId, ResolvedEvent, TempEventId,
};

/// Whether the latest feeding can be undone right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UndoStatus {
    /// `true` while `now < deadline`.
    pub available: bool,
    /// Event an undo tap would target.
    pub target: Option<EventKey>,
    /// Deadline of the targeted event.
    pub deadline: Option<DateTime<Utc>>,
    /// Whole seconds left in the window, rounded up.
    pub remaining_secs: u64,
}

impl UndoStatus {
    /// Status when there is nothing to undo.
    #[must_use]
    pub const fn unavailable() -> Self {
        Self {
            available: false,
            target: None,
            deadline: None,
            remaining_secs: 0,
        }
    }
}

/// Status view of one member in one household.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewModel {
    /// The household shown.
    pub household: Household,
    /// The member viewing it.
    pub member: Member,
    /// All pets of the household.
    pub pets: Vec<Pet>,
    /// Most recent feeding event, if any.
    pub latest: Option<ResolvedEvent>,
    /// Most recent events, newest first, bounded by the history limit.
    pub history: Vec<ResolvedEvent>,
    /// Unread in-app notifications for `member`.
    pub unread_notifications: u32,
    /// Undo eligibility as of the last timer tick.
    pub undo: UndoStatus,
    /// When this view was last rebuilt from the store.
    pub refreshed_at: DateTime<Utc>,
}

impl ViewModel {
    /// Returns `true` for Pro households.
    #[must_use]
    pub fn is_pro(&self) -> bool {
        self.household.is_pro
    }

    /// History entries visible under the household's tier.
    #[must_use]
    pub fn visible_history(&self, limit: usize) -> &[ResolvedEvent] {
        let visible = self.household.visible_history(limit).min(self.history.len());
        self.history.get(..visible).unwrap_or_default()
    }

    /// Looks up a pet by id.
    #[must_use]
    pub fn pet(&self, id: PetId) -> Option<&Pet> {
        self.pets.iter().find(|p| p.id == id)
    }

    /// Looks up a history entry by key.
    #[must_use]
    pub fn event(&self, key: EventKey) -> Option<&FeedingEvent> {
        self.history
            .iter()
            .map(|r| &r.event)
            .chain(self.latest.as_ref().map(|r| &r.event))
            .find(|e| e.key == key)
    }

    /// Returns `true` if any event or the undo record still carries a
    /// pending key.
    #[must_use]
    pub fn has_pending(&self) -> bool {
        self.latest.iter().any(|r| r.event.key.is_pending())
            || self.history.iter().any(|r| r.event.key.is_pending())
            || self.undo.target.is_some_and(|k| k.is_pending())
    }

    /// Replaces a pending key with its durable id wherever it appears.
    ///
    /// Returns the number of places updated.
    pub fn commit_key(&mut self, temp: TempEventId, durable: EventId) -> usize {
        let pending = EventKey::Pending(temp);
        let committed = EventKey::Committed(durable);
        let mut updated = 0;
        for resolved in self.latest.iter_mut().chain(self.history.iter_mut()) {
            if resolved.event.key == pending {
                resolved.event.key = committed;
                updated += 1;
            }
        }
        if self.undo.target == Some(pending) {
            self.undo.target = Some(committed);
            updated += 1;
        }
        updated
    }
}
