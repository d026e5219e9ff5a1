//! Status view handlers.

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::api::dto::{MarkReadResponse, StatusResponse};
use crate::app_state::AppState;
use crate::error::{ErrorResponse, SyncError};

/// `GET /status`: Current household status.
///
/// # Errors
///
/// Returns [`SyncError::NotLoaded`] before the first successful load.
#[utoipa::path(
    get,
    path = "/api/v1/status",
    tag = "Status",
    summary = "Current household status",
    description = "Returns pets with their feeding state, the latest feeding, the history visible under the household's tier and the undo countdown. Pending feedings carry `temp-` prefixed ids.",
    responses(
        (status = 200, description = "Current status", body = StatusResponse),
        (status = 503, description = "Status not loaded yet", body = ErrorResponse),
    )
)]
pub async fn get_status(State(state): State<AppState>) -> Result<Json<StatusResponse>, SyncError> {
    let view = state
        .status_view
        .current()
        .await
        .ok_or(SyncError::NotLoaded)?;
    Ok(Json(StatusResponse::from_view(
        &view,
        state.history_limit(),
        state.status_view.now(),
    )))
}

/// `POST /notifications/read`: Mark the member's notifications read.
///
/// # Errors
///
/// Returns [`SyncError::NotLoaded`] before the first load and
/// [`SyncError::Remote`] if the store refused.
#[utoipa::path(
    post,
    path = "/api/v1/notifications/read",
    tag = "Status",
    summary = "Mark notifications read",
    description = "Marks every unread notification of the viewing member as read and clears the unread count of the status.",
    responses(
        (status = 200, description = "Notifications marked read", body = MarkReadResponse),
        (status = 502, description = "Store unavailable; count kept", body = ErrorResponse),
        (status = 503, description = "Status not loaded yet", body = ErrorResponse),
    )
)]
pub async fn mark_notifications_read(
    State(state): State<AppState>,
) -> Result<Json<MarkReadResponse>, SyncError> {
    let marked = state.status_view.mark_notifications_read().await?;
    Ok(Json(MarkReadResponse {
        marked,
        unread_notifications: 0,
    }))
}

/// Status routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/status", get(get_status))
        .route("/notifications/read", post(mark_notifications_read))
}
