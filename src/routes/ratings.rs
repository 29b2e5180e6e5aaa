use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{post, put},
};
use axum_valid::Valid;
use uuid::Uuid;

use crate::{
    dto::rating::{ProfileView, RefreshResponse, UpsertProfileRequest},
    error::AppError,
    routes::actor::{require_organizer, require_owner_or_organizer},
    services::rating_sync_service,
    state::{Actor, SharedState},
};

pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/profiles/{id}", put(upsert_profile))
        .route("/profiles/{id}/ratings/refresh", post(refresh_ratings))
}

/// Register a player profile or change its rating link.
#[utoipa::path(
    put,
    path = "/profiles/{id}",
    tag = "ratings",
    params(
        ("id" = String, Path, description = "Identifier of the profile"),
        ("X-Actor-Id" = String, Header, description = "Caller identifier"),
        ("X-Actor-Role" = String, Header, description = "Must be `organizer`")
    ),
    request_body = UpsertProfileRequest,
    responses((status = 200, description = "Profile stored", body = ProfileView))
)]
pub async fn upsert_profile(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    actor: Actor,
    Valid(Json(payload)): Valid<Json<UpsertProfileRequest>>,
) -> Result<Json<ProfileView>, AppError> {
    require_organizer(&actor)?;
    let external_id = payload.external_id.map(|id| id.trim().to_owned());
    let profile =
        rating_sync_service::upsert_profile(&state, id, payload.display_name, external_id).await?;
    Ok(Json(ProfileView::from(&profile)))
}

/// Fetch fresh ratings for one linked profile, at most once per cooldown window.
#[utoipa::path(
    post,
    path = "/profiles/{id}/ratings/refresh",
    tag = "ratings",
    params(
        ("id" = String, Path, description = "Identifier of the profile"),
        ("X-Actor-Id" = String, Header, description = "Caller identifier; the profile owner or an organizer"),
        ("X-Actor-Role" = String, Header, description = "`organizer` to refresh any profile")
    ),
    responses(
        (status = 200, description = "Refreshed, or rate limited with the remaining wait", body = RefreshResponse),
        (status = 401, description = "Missing caller identity"),
        (status = 403, description = "Caller neither owns the profile nor organizes"),
        (status = 404, description = "Unknown profile"),
        (status = 409, description = "Profile has no rating link")
    )
)]
pub async fn refresh_ratings(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    actor: Actor,
) -> Result<Json<RefreshResponse>, AppError> {
    require_owner_or_organizer(&actor, id)?;
    let outcome = rating_sync_service::refresh_profile(&state, id).await?;
    Ok(Json(outcome.into()))
}
