//! Error types with HTTP status code mapping.
//!
//! [`SyncError`] is the central error type of the engine. Each variant
//! maps to a numeric code and an HTTP status so the API layer can turn
//! it into a structured JSON error response. Store and cache failures
//! have their own enums and are folded into [`SyncError`] at the
//! coordinator boundary.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

/// Structured JSON error response body.
///
/// ```json
/// {
///   "error": {
///     "code": 2001,
///     "message": "feeding is still syncing; retry shortly",
///     "details": null
///   }
/// }
/// ```
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ErrorResponse {
    /// Structured error payload.
    pub error: ErrorBody,
}

/// Inner error body with numeric code and human-readable message.
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ErrorBody {
    /// Numeric error code.
    pub code: u32,
    /// Human-readable error message.
    pub message: String,
    /// Optional additional details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Failure reported by the remote store collaborator.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The store could not be reached or rejected the request.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The addressed row does not exist.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Kind of row (`"pet"`, `"feeding event"`, ...).
        entity: &'static str,
        /// Identifier that was looked up.
        id: String,
    },

    /// The undo window of the event has closed.
    #[error("undo window has expired for feeding event {0}")]
    UndoExpired(String),

    /// A row violated a data model invariant.
    #[error("corrupt row: {0}")]
    Corrupt(String),

    /// Database driver failure.
    #[error("database error: {0}")]
    Database(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                Self::Unavailable(err.to_string())
            }
            other => Self::Database(other.to_string()),
        }
    }
}

/// Failure of the local snapshot cache. Always swallowed by callers.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// Filesystem failure.
    #[error("cache io error: {0}")]
    Io(#[from] std::io::Error),

    /// Snapshot could not be encoded or decoded.
    #[error("cache serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Engine error enum with HTTP status code mapping.
///
/// # Error Code Ranges
///
/// | Range     | Category        | HTTP Status                    |
/// |-----------|-----------------|--------------------------------|
/// | 1000–1999 | Validation      | 400 Bad Request                |
/// | 2000–2999 | Sync state      | 409 Conflict / 503 Unavailable |
/// | 3000–3999 | Remote / server | 502 Bad Gateway / 500          |
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Request validation failed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Undo was requested for an event that has not reached the store yet.
    #[error("feeding is still syncing; retry shortly")]
    StillSyncing,

    /// No view has been loaded yet.
    #[error("status view is not loaded yet")]
    NotLoaded,

    /// A remote write failed and the view was rolled back.
    #[error("remote write failed, changes were rolled back: {0}")]
    Remote(#[from] StoreError),

    /// Internal failure.
    #[error("internal error: {0}")]
    Internal(String),
}

impl SyncError {
    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::InvalidRequest(_) => 1001,
            Self::StillSyncing => 2001,
            Self::NotLoaded => 2002,
            Self::Remote(_) => 3001,
            Self::Internal(_) => 3000,
        }
    }

    /// Returns the HTTP status code for this variant.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::StillSyncing => StatusCode::CONFLICT,
            Self::NotLoaded => StatusCode::SERVICE_UNAVAILABLE,
            Self::Remote(_) => StatusCode::BAD_GATEWAY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns `true` if the caller may simply retry the same action.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::StillSyncing | Self::NotLoaded | Self::Remote(_))
    }
}

impl IntoResponse for SyncError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: ErrorBody {
                code: self.error_code(),
                message: self.to_string(),
                details: self.is_retryable().then(|| "retryable".to_string()),
            },
        };
        let mut response = axum::Json(body).into_response();
        *response.status_mut() = status;
        response
    }
}
