//! Database rows and their conversion into domain types.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{
    EventId, EventKey, FeedingEvent, FeedingState, HouseholdId, MemberId, Pet, PetId,
};
use crate::error::StoreError;

/// Column list matching [`PetRow`].
pub const PET_COLUMNS: &str = "id, household_id, name, last_fed_at, last_fed_by, undo_deadline";

/// Column list matching [`FeedingEventRow`].
pub const EVENT_COLUMNS: &str =
    "id, household_id, fed_by, fed_by_name, pet_ids, pet_names, created_at, undo_deadline";

/// A row of the `pets` table.
pub type PetRow = (
    Uuid,
    Uuid,
    String,
    Option<DateTime<Utc>>,
    Option<Uuid>,
    Option<DateTime<Utc>>,
);

/// A row of the `feeding_events` table.
pub type FeedingEventRow = (
    Uuid,
    Uuid,
    Uuid,
    Option<String>,
    Vec<Uuid>,
    Option<String>,
    DateTime<Utc>,
    DateTime<Utc>,
);

/// Converts a pet row, enforcing that the feeding columns move together.
///
/// # Errors
///
/// Returns [`StoreError::Corrupt`] when only some feeding columns are set.
pub fn pet_from_row(row: PetRow) -> Result<Pet, StoreError> {
    let (id, household_id, name, last_fed_at, last_fed_by, undo_deadline) = row;
    let feeding =
        FeedingState::from_columns(last_fed_at, last_fed_by.map(MemberId::from), undo_deadline)
            .map_err(|column| {
                StoreError::Corrupt(format!("pet {id} has a partial feeding state ({column} is null)"))
            })?;
    Ok(Pet {
        id: PetId::from(id),
        name,
        household_id: HouseholdId::from(household_id),
        feeding,
    })
}

/// Converts a feeding event row.
///
/// # Errors
///
/// Returns [`StoreError::Corrupt`] when the row references no pets.
pub fn event_from_row(row: FeedingEventRow) -> Result<FeedingEvent, StoreError> {
    let (id, household_id, fed_by, fed_by_name, pet_ids, pet_names, created_at, undo_deadline) =
        row;
    if pet_ids.is_empty() {
        return Err(StoreError::Corrupt(format!(
            "feeding event {id} references no pets"
        )));
    }
    Ok(FeedingEvent {
        key: EventKey::Committed(EventId::from(id)),
        household_id: HouseholdId::from(household_id),
        fed_by: MemberId::from(fed_by),
        fed_by_name: fed_by_name.filter(|n| !n.is_empty()),
        pet_ids: pet_ids.into_iter().map(PetId::from).collect(),
        pet_names: pet_names.filter(|n| !n.is_empty()),
        created_at,
        undo_deadline,
    })
}
