use axum::{
    Json, Router,
    body::Body,
    extract::{Path, State},
    http::Request,
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
};
use axum_valid::Valid;
use tracing::warn;
use uuid::Uuid;

use crate::{
    dao::models::{EventKey, MatchSubmissionOutcome},
    dto::submission::{
        BatchResponse, ConnectionTestResponse, OutcomeDto, RetryFailedRequest,
        RetryFailedResponse, SubmitMatchesRequest, SubmitMatchesResponse, TestSubmitRequest,
    },
    error::AppError,
    routes::actor::require_organizer,
    services::submission_service,
    state::{Actor, SharedState},
};

const ADMIN_TOKEN_HEADER: &str = "x-admin-token";

/// Organizer-facing relay operations.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/submissions/submit-matches", post(submit_matches))
        .route("/submissions/retry-failed", post(retry_failed))
        .route("/submissions/batches/{id}", get(get_batch))
}

/// Diagnostic endpoints guarded by the static admin token.
pub fn admin_router(state: SharedState) -> Router<SharedState> {
    Router::new()
        .route("/admin/rating-service/test-connection", post(test_connection))
        .route("/admin/rating-service/test-submit-one", post(test_submit_one))
        .route_layer(middleware::from_fn_with_state(state, require_admin_token))
}

/// Relay an event's official results to the rating service.
#[utoipa::path(
    post,
    path = "/submissions/submit-matches",
    tag = "submissions",
    params(
        ("X-Actor-Id" = String, Header, description = "Caller identifier"),
        ("X-Actor-Role" = String, Header, description = "Must be `organizer`")
    ),
    request_body = SubmitMatchesRequest,
    responses(
        (status = 200, description = "Batch processed", body = SubmitMatchesResponse),
        (status = 503, description = "Rating service token exchange failed; nothing attempted")
    )
)]
pub async fn submit_matches(
    State(state): State<SharedState>,
    actor: Actor,
    Valid(Json(payload)): Valid<Json<SubmitMatchesRequest>>,
) -> Result<Json<SubmitMatchesResponse>, AppError> {
    require_organizer(&actor)?;
    let event = payload.event();
    let batch =
        submission_service::submit_matches(&state, event, payload.match_ids, actor.id).await?;
    Ok(Json(SubmitMatchesResponse::from(&batch)))
}

/// Resubmit the event's matches whose last attempt failed.
#[utoipa::path(
    post,
    path = "/submissions/retry-failed",
    tag = "submissions",
    params(
        ("X-Actor-Id" = String, Header, description = "Caller identifier"),
        ("X-Actor-Role" = String, Header, description = "Must be `organizer`")
    ),
    request_body = RetryFailedRequest,
    responses((status = 200, description = "Retry processed", body = RetryFailedResponse))
)]
pub async fn retry_failed(
    State(state): State<SharedState>,
    actor: Actor,
    Json(payload): Json<RetryFailedRequest>,
) -> Result<Json<RetryFailedResponse>, AppError> {
    require_organizer(&actor)?;
    let event = EventKey {
        event_type: payload.event_type,
        event_id: payload.event_id,
    };
    let summary = submission_service::retry_failed(&state, event, actor.id).await?;
    Ok(Json(summary.into()))
}

/// Retrieve the stored history of a batch.
#[utoipa::path(
    get,
    path = "/submissions/batches/{id}",
    tag = "submissions",
    params(
        ("id" = String, Path, description = "Identifier of the batch"),
        ("X-Actor-Id" = String, Header, description = "Caller identifier"),
        ("X-Actor-Role" = String, Header, description = "Must be `organizer`")
    ),
    responses(
        (status = 200, description = "Batch", body = BatchResponse),
        (status = 401, description = "Missing caller identity"),
        (status = 403, description = "Caller is not an organizer"),
        (status = 404, description = "Unknown batch")
    )
)]
pub async fn get_batch(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    actor: Actor,
) -> Result<Json<BatchResponse>, AppError> {
    require_organizer(&actor)?;
    let batch = submission_service::get_batch_status(&state, id).await?;
    Ok(Json(BatchResponse::from(&batch)))
}

/// Force a fresh token exchange with the rating service.
#[utoipa::path(
    post,
    path = "/admin/rating-service/test-connection",
    tag = "admin",
    params(("X-Admin-Token" = String, Header, description = "Static admin token")),
    responses((status = 200, description = "Connection test result", body = ConnectionTestResponse))
)]
pub async fn test_connection(State(state): State<SharedState>) -> Json<ConnectionTestResponse> {
    Json(submission_service::test_connection(&state).await.into())
}

/// Submit one match outside any batch.
#[utoipa::path(
    post,
    path = "/admin/rating-service/test-submit-one",
    tag = "admin",
    params(("X-Admin-Token" = String, Header, description = "Static admin token")),
    request_body = TestSubmitRequest,
    responses((status = 200, description = "Submission outcome", body = OutcomeDto))
)]
pub async fn test_submit_one(
    State(state): State<SharedState>,
    Json(payload): Json<TestSubmitRequest>,
) -> Result<Json<OutcomeDto>, AppError> {
    let outcome: MatchSubmissionOutcome =
        submission_service::test_submit_one(&state, payload.match_id).await?;
    Ok(Json(OutcomeDto::from(&outcome)))
}

async fn require_admin_token(
    State(state): State<SharedState>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let provided = req
        .headers()
        .get(ADMIN_TOKEN_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| {
            AppError::Unauthorized("missing admin token header `X-Admin-Token`".into())
        })?;

    match state.config().admin_token.as_deref() {
        Some(token) if token == provided => Ok(next.run(req).await),
        Some(_) => {
            warn!("invalid admin token attempt");
            Err(AppError::Unauthorized("invalid admin token".into()))
        }
        None => Err(AppError::Unauthorized(
            "admin endpoints are disabled (no admin token configured)".into(),
        )),
    }
}
