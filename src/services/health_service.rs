use tracing::warn;

use crate::{dto::health::HealthResponse, state::SharedState};

/// Check the store and report relay readiness, logging connectivity issues.
pub async fn health_status(state: &SharedState) -> HealthResponse {
    let storage_reachable = match state.store().await {
        Some(store) => match store.health_check().await {
            Ok(()) => !state.is_degraded().await,
            Err(err) => {
                warn!(error = %err, "storage health check failed");
                false
            }
        },
        None => {
            warn!("storage unavailable (degraded mode)");
            false
        }
    };

    let credentials = &state.config().credentials;
    let relay_enabled = !credentials.client_id.is_empty() && !credentials.client_secret.is_empty();
    HealthResponse::new(storage_reachable, relay_enabled)
}
