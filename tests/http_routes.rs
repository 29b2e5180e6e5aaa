use std::{sync::Arc, time::Duration};

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode},
};
use serde_json::{Value, json};
use tower::ServiceExt;
use uuid::Uuid;

use score_relay_back::{
    clock::SystemClock,
    config::AppConfig,
    dao::{
        rating_api::{DisabledRatingApi, RatingSession},
        score_store::memory::MemoryScoreStore,
    },
    routes,
    state::{AppState, SharedState},
};

async fn app(with_store: bool) -> (Router, SharedState) {
    let clock = Arc::new(SystemClock);
    let rating =
        RatingSession::new(Arc::new(DisabledRatingApi), clock.clone(), Duration::from_secs(1));
    let state = AppState::new(AppConfig::default(), rating, clock);
    if with_store {
        state.set_store(Arc::new(MemoryScoreStore::new())).await;
    }
    (routes::router(state.clone()), state)
}

fn organizer() -> [(&'static str, String); 2] {
    [
        ("x-actor-id", Uuid::new_v4().to_string()),
        ("x-actor-role", "organizer".to_owned()),
    ]
}

fn request(
    method: &str,
    uri: &str,
    headers: &[(&str, String)],
    body: Option<Value>,
) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    for (name, value) in headers {
        builder = builder.header(*name, value);
    }
    match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

fn registration(id: Uuid) -> Value {
    json!({
        "id": id,
        "origin": { "kind": "league", "league_id": Uuid::new_v4(), "week": 2 },
        "side_a": { "id": Uuid::new_v4(), "name": "North", "player_ids": [Uuid::new_v4()] },
        "side_b": { "id": Uuid::new_v4(), "name": "South", "player_ids": [Uuid::new_v4()] },
        "settings": { "points_per_game": 11, "win_by": 2, "best_of": 3, "play_type": "singles" }
    })
}

#[tokio::test]
async fn registration_requires_an_organizer() {
    let (app, _) = app(true).await;
    let body = registration(Uuid::new_v4());

    let (status, _) = send(&app, request("POST", "/matches", &[], Some(body.clone()))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let participant = [("x-actor-id", Uuid::new_v4().to_string())];
    let (status, _) = send(&app, request("POST", "/matches", &participant, Some(body))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn invalid_settings_are_a_bad_request() {
    let (app, _) = app(true).await;
    let mut body = registration(Uuid::new_v4());
    body["settings"]["points_per_game"] = json!(0);
    body["settings"]["cap_at"] = json!(5_000);

    let (status, _) = send(&app, request("POST", "/matches", &organizer(), Some(body))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn registering_the_same_match_twice_conflicts() {
    let (app, _) = app(true).await;
    let id = Uuid::new_v4();
    let headers = organizer();

    let (status, created) =
        send(&app, request("POST", "/matches", &headers, Some(registration(id)))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(created["id"], json!(id));

    let (status, error) =
        send(&app, request("POST", "/matches", &headers, Some(registration(id)))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(error["message"].as_str().is_some_and(|m| m.contains("already exists")));
}

#[tokio::test]
async fn reading_a_match_needs_a_caller() {
    let (app, _) = app(true).await;
    let id = Uuid::new_v4();
    let headers = organizer();
    send(&app, request("POST", "/matches", &headers, Some(registration(id)))).await;
    let uri = format!("/matches/{id}");

    let (status, _) = send(&app, request("GET", &uri, &[], None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let viewer = [("x-actor-id", Uuid::new_v4().to_string())];
    let (status, found) = send(&app, request("GET", &uri, &viewer, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(found["id"], json!(id));

    let missing = format!("/matches/{}", Uuid::new_v4());
    let (status, _) = send(&app, request("GET", &missing, &viewer, None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn batches_are_visible_to_organizers_only() {
    let (app, _) = app(true).await;
    let uri = format!("/submissions/batches/{}", Uuid::new_v4());

    let (status, _) = send(&app, request("GET", &uri, &[], None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let participant = [("x-actor-id", Uuid::new_v4().to_string())];
    let (status, _) = send(&app, request("GET", &uri, &participant, None)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(&app, request("GET", &uri, &organizer(), None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn only_the_owner_or_an_organizer_may_refresh_ratings() {
    let (app, _) = app(true).await;
    let profile_id = Uuid::new_v4();
    let uri = format!("/profiles/{profile_id}/ratings/refresh");

    let (status, _) = send(&app, request("POST", &uri, &[], None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let stranger = [("x-actor-id", Uuid::new_v4().to_string())];
    let (status, _) = send(&app, request("POST", &uri, &stranger, None)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Authorized callers reach the service, which knows no such profile.
    let owner = [("x-actor-id", profile_id.to_string())];
    let (status, _) = send(&app, request("POST", &uri, &owner, None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = send(&app, request("POST", &uri, &organizer(), None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn webhook_acknowledges_malformed_deliveries() {
    let (app, _) = app(true).await;
    let raw = Request::builder()
        .method("POST")
        .uri("/webhooks/ratings")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, ack) = send(&app, raw).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack["received"], json!(true));
}

#[tokio::test]
async fn webhook_acknowledges_when_storage_is_down() {
    let (app, state) = app(false).await;
    assert!(state.require_store().await.is_err());

    let body = json!({ "eventType": "RATING_UPDATED", "playerId": "HOLDER-1" });
    let (status, ack) = send(&app, request("POST", "/webhooks/ratings", &[], Some(body))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack["received"], json!(true));
    assert_eq!(ack["duplicate"], json!(false));
}

#[tokio::test]
async fn degraded_mode_answers_service_unavailable() {
    let (app, _) = app(false).await;
    let (status, _) =
        send(&app, request("POST", "/matches", &organizer(), Some(registration(Uuid::new_v4()))))
            .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}
