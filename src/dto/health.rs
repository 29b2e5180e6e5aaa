use serde::Serialize;
use utoipa::ToSchema;

/// Health payload returned by the `/healthcheck` route.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// "ok" when storage is reachable, "degraded" otherwise.
    pub status: String,
    /// Whether a store is installed and answered its last health check.
    pub storage_reachable: bool,
    /// Whether rating-service credentials are configured.
    pub rating_relay_enabled: bool,
}

impl HealthResponse {
    pub fn new(storage_reachable: bool, rating_relay_enabled: bool) -> Self {
        let status = if storage_reachable { "ok" } else { "degraded" };
        Self {
            status: status.to_owned(),
            storage_reachable,
            rating_relay_enabled,
        }
    }
}
