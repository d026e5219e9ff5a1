//! DTOs of the feed, undo and reload endpoints.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::domain::PetId;
use crate::service::FeedTargets;

/// Request body for `POST /api/v1/feed`.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct FeedRequestDto {
    /// Pets to feed. Omit to feed every pet of the household.
    #[serde(default)]
    pub pet_ids: Option<Vec<Uuid>>,
}

impl FeedRequestDto {
    /// Converts the body into feed targets.
    #[must_use]
    pub fn targets(&self) -> FeedTargets {
        match &self.pet_ids {
            None => FeedTargets::All,
            Some(ids) => FeedTargets::Only(ids.iter().copied().map(PetId::from).collect()),
        }
    }
}

/// Response body of `POST /api/v1/feed`.
#[derive(Debug, Serialize, ToSchema)]
pub struct FeedResponse {
    /// `"committed"` or `"ignored"`.
    pub status: String,
    /// Durable id of the new feeding, when committed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_id: Option<Uuid>,
}

impl FeedResponse {
    /// A committed feeding.
    #[must_use]
    pub fn committed(event_id: Uuid) -> Self {
        Self {
            status: "committed".to_string(),
            event_id: Some(event_id),
        }
    }

    /// A tap dropped because another operation was in flight.
    #[must_use]
    pub fn ignored() -> Self {
        Self {
            status: "ignored".to_string(),
            event_id: None,
        }
    }
}

/// Response body of `POST /api/v1/feedings/{id}/undo` when ignored.
#[derive(Debug, Serialize, ToSchema)]
pub struct UndoIgnoredResponse {
    /// Always `"ignored"`.
    pub status: String,
}

/// Response body of `POST /api/v1/reload`.
#[derive(Debug, Serialize, ToSchema)]
pub struct ReloadResponse {
    /// Always `"reloaded"`.
    pub status: String,
    /// Refresh time of the new view.
    pub refreshed_at: DateTime<Utc>,
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn absent_pet_ids_mean_all_pets() {
        let Ok(body) = serde_json::from_str::<FeedRequestDto>("{}") else {
            panic!("empty object should parse");
        };
        assert_eq!(body.targets(), FeedTargets::All);
    }

    #[test]
    fn explicit_pet_ids_are_kept() {
        let id = Uuid::new_v4();
        let body = FeedRequestDto {
            pet_ids: Some(vec![id]),
        };
        assert_eq!(body.targets(), FeedTargets::Only(vec![PetId::from(id)]));
    }

    #[test]
    fn ignored_response_has_no_event_id() {
        let json = serde_json::to_value(FeedResponse::ignored()).unwrap_or_default();
        assert_eq!(json, serde_json::json!({ "status": "ignored" }));
    }
}
