//! OpenAPI document of the REST API.

use utoipa::OpenApi;

use crate::api::dto::{
    FeedRequestDto, FeedResponse, FeedingEventDto, HouseholdDto, MarkReadResponse, MemberDto,
    PetDto, ReloadResponse, StatusResponse, UndoIgnoredResponse, UndoStatusDto,
};
use crate::api::handlers::{feed, status, system};
use crate::error::{ErrorBody, ErrorResponse};

/// OpenAPI description of every REST endpoint.
#[derive(Debug, OpenApi)]
#[openapi(
    info(
        title = "petfeed-sync",
        description = "Household feeding status with optimistic feed and undo."
    ),
    paths(
        system::health_handler,
        status::get_status,
        status::mark_notifications_read,
        feed::feed,
        feed::undo,
        feed::reload,
    ),
    components(schemas(
        system::HealthResponse,
        StatusResponse,
        HouseholdDto,
        MemberDto,
        PetDto,
        FeedingEventDto,
        UndoStatusDto,
        FeedRequestDto,
        FeedResponse,
        UndoIgnoredResponse,
        ReloadResponse,
        MarkReadResponse,
        ErrorResponse,
        ErrorBody,
    )),
    tags(
        (name = "System", description = "Health"),
        (name = "Status", description = "Household status view"),
        (name = "Feeding", description = "Optimistic feed and undo"),
    )
)]
pub struct ApiDoc;
