//! DTOs of `GET /api/v1/status`.

use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::domain::time::{clock_time, time_ago};
use crate::domain::{Pet, ResolvedEvent, UndoStatus, ViewModel};

/// Household summary.
#[derive(Debug, Serialize, ToSchema)]
pub struct HouseholdDto {
    /// Household identifier.
    pub id: Uuid,
    /// Display name.
    pub name: String,
    /// `"free"` or `"pro"`.
    pub tier: String,
}

/// The member the view belongs to.
#[derive(Debug, Serialize, ToSchema)]
pub struct MemberDto {
    /// Member identifier.
    pub id: Uuid,
    /// Display name.
    pub name: String,
}

/// A pet and its feeding state.
#[derive(Debug, Serialize, ToSchema)]
pub struct PetDto {
    /// Pet identifier.
    pub id: Uuid,
    /// Display name.
    pub name: String,
    /// `true` once fed and not undone.
    pub fed: bool,
    /// Last feeding time.
    pub last_fed_at: Option<DateTime<Utc>>,
    /// Relative age of the last feeding, e.g. `"5m ago"`.
    pub last_fed_ago: Option<String>,
    /// Member who fed the pet.
    pub fed_by: Option<Uuid>,
    /// Undo deadline of the last feeding.
    pub undo_deadline: Option<DateTime<Utc>>,
}

/// A feeding event with resolved names.
#[derive(Debug, Serialize, ToSchema)]
pub struct FeedingEventDto {
    /// Event key; `temp-` prefixed while pending.
    pub id: String,
    /// `true` until the store acknowledged the event.
    pub pending: bool,
    /// One-line summary, e.g. `"Sam fed Fido, Rex"`.
    pub summary: String,
    /// Member who fed.
    pub fed_by: Uuid,
    /// Name of the member who fed.
    pub fed_by_name: String,
    /// Pets fed together.
    pub pet_ids: Vec<Uuid>,
    /// Names of the pets fed.
    pub pet_names: Vec<String>,
    /// Feeding time.
    pub created_at: DateTime<Utc>,
    /// Relative age, e.g. `"2h 10m ago"`.
    pub time_ago: String,
    /// Local wall-clock time, `HH:MM`.
    pub clock_time: String,
    /// Undo deadline.
    pub undo_deadline: DateTime<Utc>,
}

/// Undo eligibility of the latest feeding.
#[derive(Debug, Serialize, ToSchema)]
pub struct UndoStatusDto {
    /// `true` while the undo window is open.
    pub available: bool,
    /// Event an undo would target.
    pub target: Option<String>,
    /// Deadline of the targeted event.
    pub deadline: Option<DateTime<Utc>>,
    /// Seconds left in the window.
    pub remaining_secs: u64,
}

/// Response body of `GET /api/v1/status`.
#[derive(Debug, Serialize, ToSchema)]
pub struct StatusResponse {
    /// Household shown.
    pub household: HouseholdDto,
    /// Member viewing it.
    pub member: MemberDto,
    /// All pets.
    pub pets: Vec<PetDto>,
    /// Most recent feeding.
    pub latest: Option<FeedingEventDto>,
    /// History visible under the household's tier, newest first.
    pub history: Vec<FeedingEventDto>,
    /// Undo eligibility.
    pub undo: UndoStatusDto,
    /// Unread in-app notifications.
    pub unread_notifications: u32,
    /// `true` while a feeding is waiting for the store.
    pub syncing: bool,
    /// When the view was last rebuilt from the store.
    pub refreshed_at: DateTime<Utc>,
}

/// Response body of `POST /api/v1/notifications/read`.
#[derive(Debug, Serialize, ToSchema)]
pub struct MarkReadResponse {
    /// Notifications that were unread before the call.
    pub marked: u32,
    /// Unread count after the call, always `0`.
    pub unread_notifications: u32,
}

impl StatusResponse {
    /// Projects a view for display at `now`.
    #[must_use]
    pub fn from_view(view: &ViewModel, history_limit: usize, now: DateTime<Utc>) -> Self {
        Self {
            household: HouseholdDto {
                id: view.household.id.into(),
                name: view.household.name.clone(),
                tier: if view.is_pro() { "pro" } else { "free" }.to_string(),
            },
            member: MemberDto {
                id: view.member.id.into(),
                name: view.member.name.clone(),
            },
            pets: view.pets.iter().map(|p| PetDto::from_pet(p, now)).collect(),
            latest: view
                .latest
                .as_ref()
                .map(|r| FeedingEventDto::from_resolved(r, now)),
            history: view
                .visible_history(history_limit)
                .iter()
                .map(|r| FeedingEventDto::from_resolved(r, now))
                .collect(),
            undo: UndoStatusDto::from(view.undo),
            unread_notifications: view.unread_notifications,
            syncing: view.has_pending(),
            refreshed_at: view.refreshed_at,
        }
    }
}

impl PetDto {
    fn from_pet(pet: &Pet, now: DateTime<Utc>) -> Self {
        Self {
            id: pet.id.into(),
            name: pet.name.clone(),
            fed: pet.feeding.is_some(),
            last_fed_at: pet.last_fed_at(),
            last_fed_ago: pet.last_fed_at().map(|t| time_ago(t, now)),
            fed_by: pet.feeding.map(|f| f.fed_by.into()),
            undo_deadline: pet.feeding.map(|f| f.undo_deadline),
        }
    }
}

impl FeedingEventDto {
    fn from_resolved(resolved: &ResolvedEvent, now: DateTime<Utc>) -> Self {
        let event = &resolved.event;
        Self {
            id: event.key.to_string(),
            pending: event.key.is_pending(),
            summary: resolved.summary(),
            fed_by: event.fed_by.into(),
            fed_by_name: resolved.fed_by_name.clone(),
            pet_ids: event.pet_ids.iter().map(|id| Uuid::from(*id)).collect(),
            pet_names: resolved.pet_names.clone(),
            created_at: event.created_at,
            time_ago: time_ago(event.created_at, now),
            clock_time: clock_time(event.created_at),
            undo_deadline: event.undo_deadline,
        }
    }
}

impl From<UndoStatus> for UndoStatusDto {
    fn from(status: UndoStatus) -> Self {
        Self {
            available: status.available,
            target: status.target.map(|k| k.to_string()),
            deadline: status.deadline,
            remaining_secs: status.remaining_secs,
        }
    }
}
