use axum::Router;

use crate::state::SharedState;

pub mod actor;
pub mod docs;
pub mod health;
pub mod ratings;
pub mod scores;
pub mod submissions;
pub mod webhook;

/// Compose all route trees, wiring in shared state and documentation routes.
pub fn router(state: SharedState) -> Router<()> {
    let api_router = health::router()
        .merge(scores::router())
        .merge(submissions::router())
        .merge(submissions::admin_router(state.clone()))
        .merge(ratings::router())
        .merge(webhook::router());

    let docs_router = docs::router(state.clone());

    api_router.merge(docs_router).with_state(state)
}
