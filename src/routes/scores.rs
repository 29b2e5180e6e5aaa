use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, post},
};
use axum_valid::Valid;
use uuid::Uuid;

use crate::{
    dto::score::{
        CorrectRequest, DisputeRequest, FinalizeRequest, MatchResponse, ProposeRequest,
        RegisterMatchRequest, to_game_scores,
    },
    error::AppError,
    routes::actor::require_organizer,
    services::score_service,
    state::{Actor, ScoreCommand, SharedState},
};

/// Match registration and the propose / confirm / dispute / finalize / correct workflow.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/matches", post(register_match))
        .route("/matches/{id}", get(get_match))
        .route("/matches/{id}/score/propose", post(propose_score))
        .route("/matches/{id}/score/confirm", post(confirm_score))
        .route("/matches/{id}/score/dispute", post(dispute_score))
        .route("/matches/{id}/score/finalize", post(finalize_score))
        .route("/matches/{id}/score/correct", post(correct_score))
}

/// Register a match scheduled by a tournament or league.
#[utoipa::path(
    post,
    path = "/matches",
    tag = "scores",
    params(
        ("X-Actor-Id" = String, Header, description = "Caller identifier"),
        ("X-Actor-Role" = String, Header, description = "Must be `organizer`")
    ),
    request_body = RegisterMatchRequest,
    responses(
        (status = 200, description = "Match registered", body = MatchResponse),
        (status = 403, description = "Caller is not an organizer"),
        (status = 409, description = "Match already exists")
    )
)]
pub async fn register_match(
    State(state): State<SharedState>,
    actor: Actor,
    Valid(Json(payload)): Valid<Json<RegisterMatchRequest>>,
) -> Result<Json<MatchResponse>, AppError> {
    require_organizer(&actor)?;
    let entity = payload.into_entity(state.clock().now())?;
    let entity = score_service::register_match(&state, entity).await?;
    Ok(Json(MatchResponse::from(&entity)))
}

/// Retrieve a match with its score workflow and audit log.
#[utoipa::path(
    get,
    path = "/matches/{id}",
    tag = "scores",
    params(
        ("id" = String, Path, description = "Identifier of the match"),
        ("X-Actor-Id" = String, Header, description = "Caller identifier")
    ),
    responses(
        (status = 200, description = "Match", body = MatchResponse),
        (status = 401, description = "Missing caller identity"),
        (status = 404, description = "Unknown match")
    )
)]
pub async fn get_match(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    _actor: Actor,
) -> Result<Json<MatchResponse>, AppError> {
    let entity = score_service::get_match(&state, id).await?;
    Ok(Json(MatchResponse::from(&entity)))
}

/// Propose a score as a participant of either side.
#[utoipa::path(
    post,
    path = "/matches/{id}/score/propose",
    tag = "scores",
    params(
        ("id" = String, Path, description = "Identifier of the match"),
        ("X-Actor-Id" = String, Header, description = "Caller identifier"),
        ("X-Actor-Team" = String, Header, description = "Team the caller plays for")
    ),
    request_body = ProposeRequest,
    responses(
        (status = 200, description = "Score proposed", body = MatchResponse),
        (status = 400, description = "Scores violate the match rules"),
        (status = 409, description = "Workflow does not allow a proposal now")
    )
)]
pub async fn propose_score(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    actor: Actor,
    Valid(Json(payload)): Valid<Json<ProposeRequest>>,
) -> Result<Json<MatchResponse>, AppError> {
    let command = ScoreCommand::Propose {
        games: to_game_scores(&payload.games)?,
    };
    run(&state, id, command, &actor).await
}

/// Confirm the opposing side's proposal.
#[utoipa::path(
    post,
    path = "/matches/{id}/score/confirm",
    tag = "scores",
    params(
        ("id" = String, Path, description = "Identifier of the match"),
        ("X-Actor-Id" = String, Header, description = "Caller identifier"),
        ("X-Actor-Team" = String, Header, description = "Team the caller plays for")
    ),
    responses(
        (status = 200, description = "Score signed", body = MatchResponse),
        (status = 403, description = "Caller belongs to the proposing side")
    )
)]
pub async fn confirm_score(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    actor: Actor,
) -> Result<Json<MatchResponse>, AppError> {
    run(&state, id, ScoreCommand::Confirm, &actor).await
}

/// Dispute a proposed or signed score.
#[utoipa::path(
    post,
    path = "/matches/{id}/score/dispute",
    tag = "scores",
    params(
        ("id" = String, Path, description = "Identifier of the match"),
        ("X-Actor-Id" = String, Header, description = "Caller identifier"),
        ("X-Actor-Team" = String, Header, description = "Team the caller plays for")
    ),
    request_body = DisputeRequest,
    responses((status = 200, description = "Score disputed", body = MatchResponse))
)]
pub async fn dispute_score(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    actor: Actor,
    Valid(Json(payload)): Valid<Json<DisputeRequest>>,
) -> Result<Json<MatchResponse>, AppError> {
    let command = ScoreCommand::Dispute {
        reason: payload.reason,
    };
    run(&state, id, command, &actor).await
}

/// Make the score official, optionally overriding the proposal.
#[utoipa::path(
    post,
    path = "/matches/{id}/score/finalize",
    tag = "scores",
    params(
        ("id" = String, Path, description = "Identifier of the match"),
        ("X-Actor-Id" = String, Header, description = "Caller identifier"),
        ("X-Actor-Role" = String, Header, description = "Must be `organizer`")
    ),
    request_body = FinalizeRequest,
    responses(
        (status = 200, description = "Score official", body = MatchResponse),
        (status = 400, description = "Override required or invalid")
    )
)]
pub async fn finalize_score(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    actor: Actor,
    Valid(Json(payload)): Valid<Json<FinalizeRequest>>,
) -> Result<Json<MatchResponse>, AppError> {
    let override_games = payload
        .override_games
        .as_deref()
        .map(to_game_scores)
        .transpose()?;
    run(&state, id, ScoreCommand::Finalize { override_games }, &actor).await
}

/// Record a new official result version.
#[utoipa::path(
    post,
    path = "/matches/{id}/score/correct",
    tag = "scores",
    params(
        ("id" = String, Path, description = "Identifier of the match"),
        ("X-Actor-Id" = String, Header, description = "Caller identifier"),
        ("X-Actor-Role" = String, Header, description = "Must be `organizer`")
    ),
    request_body = CorrectRequest,
    responses(
        (status = 200, description = "Correction recorded", body = MatchResponse),
        (status = 400, description = "Reason missing for a submitted result")
    )
)]
pub async fn correct_score(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    actor: Actor,
    Valid(Json(payload)): Valid<Json<CorrectRequest>>,
) -> Result<Json<MatchResponse>, AppError> {
    let command = ScoreCommand::Correct {
        games: to_game_scores(&payload.games)?,
        reason: payload.reason,
    };
    run(&state, id, command, &actor).await
}

async fn run(
    state: &SharedState,
    id: Uuid,
    command: ScoreCommand,
    actor: &Actor,
) -> Result<Json<MatchResponse>, AppError> {
    let (entity, warnings) = score_service::apply_command(state, id, command, actor).await?;
    Ok(Json(MatchResponse::new(&entity, warnings)))
}
