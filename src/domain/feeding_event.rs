//! Feeding events: one record per "fed these pets together" action.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::{EventId, EventKey, HouseholdId, MemberId, PetId};

/// Length of the undo window after a feeding.
pub const UNDO_WINDOW: Duration = Duration::minutes(2);

/// A feeding event, the unit of undo.
///
/// `pet_ids` is never empty and `undo_deadline` never changes once set.
/// The name fields are denormalized display copies; rows written before
/// they existed leave them `None`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedingEvent {
    /// Pending or durable identity.
    pub key: EventKey,
    /// Household the event belongs to.
    pub household_id: HouseholdId,
    /// Member who fed the pets.
    pub fed_by: MemberId,
    /// Display name of `fed_by` at feeding time.
    pub fed_by_name: Option<String>,
    /// Pets fed together.
    pub pet_ids: Vec<PetId>,
    /// Comma-joined pet names at feeding time.
    pub pet_names: Option<String>,
    /// When the feeding happened.
    pub created_at: DateTime<Utc>,
    /// `created_at` plus the undo window.
    pub undo_deadline: DateTime<Utc>,
}

impl FeedingEvent {
    /// Returns `true` if undo is still allowed at `now`.
    #[must_use]
    pub fn undoable_at(&self, now: DateTime<Utc>) -> bool {
        now < self.undo_deadline
    }

    /// Returns a copy carrying the durable identifier.
    #[must_use]
    pub fn committed(mut self, id: EventId) -> Self {
        self.key = EventKey::Committed(id);
        self
    }
}

/// Payload for creating a feeding event row in the store of record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewFeedingEvent {
    /// Household the event belongs to.
    pub household_id: HouseholdId,
    /// Member who fed the pets.
    pub fed_by: MemberId,
    /// Display name of the member.
    pub fed_by_name: String,
    /// Pets fed together (non-empty).
    pub pet_ids: Vec<PetId>,
    /// Comma-joined pet names.
    pub pet_names: String,
    /// Feeding time.
    pub created_at: DateTime<Utc>,
    /// Undo deadline.
    pub undo_deadline: DateTime<Utc>,
}

impl From<&FeedingEvent> for NewFeedingEvent {
    fn from(event: &FeedingEvent) -> Self {
        Self {
            household_id: event.household_id,
            fed_by: event.fed_by,
            fed_by_name: event.fed_by_name.clone().unwrap_or_default(),
            pet_ids: event.pet_ids.clone(),
            pet_names: event.pet_names.clone().unwrap_or_default(),
            created_at: event.created_at,
            undo_deadline: event.undo_deadline,
        }
    }
}

/// A feeding event together with its resolved display details.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedEvent {
    /// The underlying event.
    pub event: FeedingEvent,
    /// Names of the pets fed, in event order.
    pub pet_names: Vec<String>,
    /// Name of the member who fed them.
    pub fed_by_name: String,
}

impl ResolvedEvent {
    /// Returns a one-line summary such as `"Sam fed Fido, Rex"`.
    #[must_use]
    pub fn summary(&self) -> String {
        format!("{} fed {}", self.fed_by_name, self.pet_names.join(", "))
    }
}
