use axum::{Json, Router, extract::State, routing::get};

use crate::{dto::webhook::WebhookAck, services::webhook_service, state::SharedState};

/// Inbound notifications from the rating service.
pub fn router() -> Router<SharedState> {
    Router::new().route("/webhooks/ratings", get(verify).post(receive))
}

/// Endpoint verification check.
#[utoipa::path(
    get,
    path = "/webhooks/ratings",
    tag = "webhooks",
    responses((status = 200, description = "Endpoint reachable", body = String))
)]
pub async fn verify() -> &'static str {
    "OK"
}

/// Accept a delivery. Always answers 200 so the sender never retries a processed payload.
#[utoipa::path(
    post,
    path = "/webhooks/ratings",
    tag = "webhooks",
    request_body(content = String, description = "Raw notification body", content_type = "application/json"),
    responses((status = 200, description = "Delivery acknowledged", body = WebhookAck))
)]
pub async fn receive(State(state): State<SharedState>, body: String) -> Json<WebhookAck> {
    let receipt = webhook_service::handle_delivery(&state, &body).await;
    Json(WebhookAck {
        received: true,
        duplicate: receipt.duplicate,
    })
}
