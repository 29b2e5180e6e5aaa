use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    dao::models::ProfileEntity, dto::format_system_time,
    services::rating_sync_service::RefreshOutcome,
};

/// Local profile registration; `external_id` links the player to a rating holder.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct UpsertProfileRequest {
    #[validate(length(min = 1, max = 120))]
    pub display_name: String,
    #[serde(default)]
    #[validate(length(min = 1, max = 64))]
    pub external_id: Option<String>,
}

/// Locally cached ratings of a player.
#[derive(Debug, Serialize, ToSchema)]
pub struct ProfileView {
    pub id: Uuid,
    pub display_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    /// `null` when the service reports the player as not rated.
    pub singles_rating: Option<f64>,
    pub doubles_rating: Option<f64>,
    pub reliability: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_synced_at: Option<String>,
}

impl From<&ProfileEntity> for ProfileView {
    fn from(profile: &ProfileEntity) -> Self {
        Self {
            id: profile.id,
            display_name: profile.display_name.clone(),
            external_id: profile.external_id.clone(),
            singles_rating: profile.singles_rating,
            doubles_rating: profile.doubles_rating,
            reliability: profile.reliability,
            last_synced_at: profile.last_synced_at.map(format_system_time),
        }
    }
}

/// Result of a manual refresh; rate-limited calls carry the wait instead of a profile.
#[derive(Debug, Serialize, ToSchema)]
pub struct RefreshResponse {
    pub rate_limited: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_in_secs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<ProfileView>,
}

impl From<RefreshOutcome> for RefreshResponse {
    fn from(outcome: RefreshOutcome) -> Self {
        match outcome {
            RefreshOutcome::Refreshed(profile) => Self {
                rate_limited: false,
                retry_in_secs: None,
                profile: Some(ProfileView::from(&profile)),
            },
            RefreshOutcome::RateLimited { retry_in } => Self {
                rate_limited: true,
                // Round up so clients never retry a moment too early.
                retry_in_secs: Some(retry_in.as_secs() + u64::from(retry_in.subsec_nanos() > 0)),
                profile: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn rate_limited_rounds_wait_up() {
        let response = RefreshResponse::from(RefreshOutcome::RateLimited {
            retry_in: Duration::from_millis(44_200),
        });
        assert!(response.rate_limited);
        assert_eq!(response.retry_in_secs, Some(45));
        assert!(response.profile.is_none());
    }
}
