//! Feed, undo and reload handlers.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};

use crate::api::dto::{FeedRequestDto, FeedResponse, ReloadResponse, UndoIgnoredResponse};
use crate::app_state::AppState;
use crate::domain::EventKey;
use crate::error::{ErrorResponse, SyncError};
use crate::service::{FeedOutcome, UndoOutcome};

/// `POST /feed`: Feed all or some pets.
///
/// The view is updated optimistically before the store is written; the
/// response is sent once the write has been reconciled or rolled back.
///
/// # Errors
///
/// Returns [`SyncError::InvalidRequest`] for unknown pets or an empty
/// selection, [`SyncError::NotLoaded`] before the first load and
/// [`SyncError::Remote`] when the write failed and was rolled back.
#[utoipa::path(
    post,
    path = "/api/v1/feed",
    tag = "Feeding",
    summary = "Feed pets",
    description = "Marks the selected pets (or every pet when `pet_ids` is omitted) as fed by the viewing member. A tap made while another feed or undo is in flight is ignored with 202.",
    request_body(content = FeedRequestDto, description = "Pets to feed", content_type = "application/json"),
    responses(
        (status = 200, description = "Feeding committed", body = FeedResponse),
        (status = 202, description = "Ignored; another operation is in flight", body = FeedResponse),
        (status = 400, description = "Invalid pet selection", body = ErrorResponse),
        (status = 502, description = "Store write failed; view rolled back", body = ErrorResponse),
        (status = 503, description = "Status not loaded yet", body = ErrorResponse),
    )
)]
pub async fn feed(State(state): State<AppState>, body: Bytes) -> Result<Response, SyncError> {
    let request = parse_feed_body(&body)?;
    let response = match state.status_view.feed(request.targets()).await? {
        FeedOutcome::Committed(id) => {
            (StatusCode::OK, Json(FeedResponse::committed(id.into()))).into_response()
        }
        FeedOutcome::Ignored => {
            (StatusCode::ACCEPTED, Json(FeedResponse::ignored())).into_response()
        }
    };
    Ok(response)
}

/// An empty body feeds every pet.
fn parse_feed_body(body: &[u8]) -> Result<FeedRequestDto, SyncError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(FeedRequestDto::default());
    }
    serde_json::from_slice(body)
        .map_err(|e| SyncError::InvalidRequest(format!("malformed feed request: {e}")))
}

/// `POST /feedings/{id}/undo`: Undo a feeding.
///
/// # Errors
///
/// Returns [`SyncError::InvalidRequest`] for a malformed or unknown id,
/// [`SyncError::StillSyncing`] for a `temp-` id and [`SyncError::Remote`]
/// when the store refused the delete.
#[utoipa::path(
    post,
    path = "/api/v1/feedings/{id}/undo",
    tag = "Feeding",
    summary = "Undo a feeding",
    description = "Clears the feeding state of the pets of the event and deletes it. Only allowed inside the undo window of a committed event.",
    params(
        ("id" = String, Path, description = "Feeding event id; `temp-` prefixed ids are rejected with 409"),
    ),
    responses(
        (status = 204, description = "Feeding undone"),
        (status = 202, description = "Ignored; another operation is in flight", body = UndoIgnoredResponse),
        (status = 400, description = "Malformed or unknown id", body = ErrorResponse),
        (status = 409, description = "Feeding is still syncing", body = ErrorResponse),
        (status = 502, description = "Store refused the undo; view rolled back", body = ErrorResponse),
    )
)]
pub async fn undo(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, SyncError> {
    let key: EventKey = id
        .parse()
        .map_err(|e| SyncError::InvalidRequest(format!("invalid feeding id '{id}': {e}")))?;
    let response = match state.status_view.undo(key).await? {
        UndoOutcome::Undone => StatusCode::NO_CONTENT.into_response(),
        UndoOutcome::Ignored => (
            StatusCode::ACCEPTED,
            Json(UndoIgnoredResponse {
                status: "ignored".to_string(),
            }),
        )
            .into_response(),
    };
    Ok(response)
}

/// `POST /reload`: Rebuild the view from the store.
///
/// # Errors
///
/// Returns [`SyncError::Remote`] if the store could not be read.
#[utoipa::path(
    post,
    path = "/api/v1/reload",
    tag = "Status",
    summary = "Reload from the store",
    description = "Rebuilds the status view from the store of record and refreshes the local snapshot.",
    responses(
        (status = 200, description = "View reloaded", body = ReloadResponse),
        (status = 502, description = "Store unavailable; current view kept", body = ErrorResponse),
    )
)]
pub async fn reload(State(state): State<AppState>) -> Result<Json<ReloadResponse>, SyncError> {
    let view = state.status_view.reload().await?;
    Ok(Json(ReloadResponse {
        status: "reloaded".to_string(),
        refreshed_at: view.refreshed_at,
    }))
}

/// Feeding routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/feed", post(feed))
        .route("/feedings/{id}/undo", post(undo))
        .route("/reload", post(reload))
}
