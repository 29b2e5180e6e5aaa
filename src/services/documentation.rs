use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for Score Relay Back.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::scores::register_match,
        crate::routes::scores::get_match,
        crate::routes::scores::propose_score,
        crate::routes::scores::confirm_score,
        crate::routes::scores::dispute_score,
        crate::routes::scores::finalize_score,
        crate::routes::scores::correct_score,
        crate::routes::submissions::submit_matches,
        crate::routes::submissions::retry_failed,
        crate::routes::submissions::get_batch,
        crate::routes::submissions::test_connection,
        crate::routes::submissions::test_submit_one,
        crate::routes::ratings::upsert_profile,
        crate::routes::ratings::refresh_ratings,
        crate::routes::webhook::verify,
        crate::routes::webhook::receive,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::score::GameScoreInput,
            crate::dto::score::ProposeRequest,
            crate::dto::score::DisputeRequest,
            crate::dto::score::FinalizeRequest,
            crate::dto::score::CorrectRequest,
            crate::dto::score::RegisterMatchRequest,
            crate::dto::score::OriginDto,
            crate::dto::score::SideDto,
            crate::dto::score::SettingsDto,
            crate::dto::score::MatchResponse,
            crate::dto::score::ProposalView,
            crate::dto::score::OfficialResultView,
            crate::dto::score::SubmissionView,
            crate::dto::score::AuditEntryView,
            crate::dto::submission::SubmitMatchesRequest,
            crate::dto::submission::SubmitMatchesResponse,
            crate::dto::submission::RetryFailedRequest,
            crate::dto::submission::RetryFailedResponse,
            crate::dto::submission::BatchResponse,
            crate::dto::submission::OutcomeDto,
            crate::dto::submission::ConnectionTestResponse,
            crate::dto::submission::TestSubmitRequest,
            crate::dto::rating::RefreshResponse,
            crate::dto::rating::ProfileView,
            crate::dto::rating::UpsertProfileRequest,
            crate::dto::webhook::WebhookAck,
            crate::dao::models::GameScore,
            crate::dao::models::Side,
            crate::dao::models::EventType,
            crate::dao::models::PlayType,
            crate::dao::models::ScoreState,
            crate::dao::models::MatchStatus,
            crate::dao::models::AuditAction,
            crate::dao::models::BatchStatus,
            crate::dao::models::OutcomeStatus,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "scores", description = "Match registration and score workflow"),
        (name = "submissions", description = "Relay of official results to the rating service"),
        (name = "ratings", description = "Player rating refresh"),
        (name = "webhooks", description = "Notifications pushed by the rating service"),
        (name = "admin", description = "Rating service diagnostics"),
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn documents_every_route_tree() {
        let doc = ApiDoc::openapi();
        for path in [
            "/healthcheck",
            "/matches/{id}/score/finalize",
            "/submissions/submit-matches",
            "/admin/rating-service/test-connection",
            "/profiles/{id}/ratings/refresh",
            "/webhooks/ratings",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
    }
}
