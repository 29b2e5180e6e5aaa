use std::time::{Duration, SystemTime};

use tokio::time::sleep;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    dao::{models::ProfileEntity, rating_api::PlayerRatings, score_store::ScoreStore},
    error::ServiceError,
    services::{score_service::MAX_WRITE_ATTEMPTS, webhook_service::merge},
    state::SharedState,
};

/// Counts of one bulk refresh.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncSummary {
    pub profiles: usize,
    pub updated: usize,
    /// Relinked or unlinked while their ratings were being fetched.
    pub skipped: usize,
    pub failed: usize,
}

/// Result of a manual refresh request.
#[derive(Debug, Clone, PartialEq)]
pub enum RefreshOutcome {
    Refreshed(ProfileEntity),
    /// Refreshed too recently; try again after `retry_in`.
    RateLimited { retry_in: Duration },
}

/// Decision taken by a profile mutation in [`update_profile`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileChange<T> {
    /// Persist the mutated profile.
    Write(T),
    /// Leave the stored profile untouched.
    Keep(T),
}

/// Re-read a profile, let `mutate` change it and write it back against the revision that was
/// read. A lost race re-runs `mutate` on fresh data.
pub async fn update_profile<T, F>(
    store: &dyn ScoreStore,
    id: Uuid,
    mut mutate: F,
) -> Result<(ProfileEntity, T), ServiceError>
where
    F: FnMut(&mut ProfileEntity) -> Result<ProfileChange<T>, ServiceError>,
{
    for attempt in 1..=MAX_WRITE_ATTEMPTS {
        let mut profile = store
            .find_profile(id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("profile {id}")))?;
        let expected = profile.revision;

        let value = match mutate(&mut profile)? {
            ProfileChange::Keep(value) => return Ok((profile, value)),
            ProfileChange::Write(value) => value,
        };
        profile.revision = expected + 1;

        match store.save_profile(profile.clone(), Some(expected)).await {
            Ok(()) => return Ok((profile, value)),
            Err(err) if err.is_conflict() => {
                debug!(profile_id = %id, attempt, "profile changed concurrently; retrying");
            }
            Err(err) => return Err(err.into()),
        }
    }

    Err(ServiceError::Conflict(format!(
        "profile {id} is being updated concurrently; try again"
    )))
}

/// Refresh the ratings of every linked profile, pausing between fetches.
pub async fn sync_all(state: &SharedState) -> Result<SyncSummary, ServiceError> {
    let store = state.require_store().await?;
    let profiles = store.list_linked_profiles().await?;
    let mut summary = SyncSummary {
        profiles: profiles.len(),
        ..SyncSummary::default()
    };
    if profiles.is_empty() {
        return Ok(summary);
    }

    let token = state
        .rating()
        .access_token()
        .await
        .map_err(ServiceError::RatingServiceUnavailable)?;
    let delay = state.config().rating_sync.delay_between_fetches;

    for (index, profile) in profiles.into_iter().enumerate() {
        if index > 0 && !delay.is_zero() {
            sleep(delay).await;
        }
        let Some(external_id) = profile.external_id else {
            continue;
        };
        let profile_id = profile.id;
        match sync_one(state, store.as_ref(), &token, profile_id, &external_id).await {
            Ok(true) => summary.updated += 1,
            Ok(false) => {
                debug!(%profile_id, %external_id, "profile relinked during sync; skipped");
                summary.skipped += 1;
            }
            Err(err) => {
                warn!(%profile_id, error = %err, "rating refresh failed");
                summary.failed += 1;
            }
        }
    }

    info!(
        profiles = summary.profiles,
        updated = summary.updated,
        skipped = summary.skipped,
        failed = summary.failed,
        "rating sync finished"
    );
    Ok(summary)
}

/// Fetch and store one profile's ratings. Returns `false` when the link changed meanwhile.
async fn sync_one(
    state: &SharedState,
    store: &dyn ScoreStore,
    token: &str,
    profile_id: Uuid,
    external_id: &str,
) -> Result<bool, ServiceError> {
    let ratings = fetch_ratings(state, token, external_id).await?;
    let now = state.clock().now();
    let (_, written) = update_profile(store, profile_id, |current| {
        if current.external_id.as_deref() != Some(external_id) {
            return Ok(ProfileChange::Keep(false));
        }
        if let Some(ratings) = &ratings {
            apply_ratings(current, ratings);
        }
        current.last_synced_at = Some(now);
        Ok(ProfileChange::Write(true))
    })
    .await?;
    Ok(written)
}

/// User-initiated refresh of one profile, limited to one fetch per cooldown window.
///
/// The window is claimed with a revision-checked write before calling out, so concurrent
/// requests fetch at most once. A failed fetch still spends the window.
pub async fn refresh_profile(
    state: &SharedState,
    profile_id: Uuid,
) -> Result<RefreshOutcome, ServiceError> {
    let store = state.require_store().await?;
    let cooldown = state.config().rating_sync.manual_refresh_cooldown;
    let now = state.clock().now();

    let (claimed, wait) = update_profile(store.as_ref(), profile_id, |profile| {
        if profile.external_id.is_none() {
            return Err(ServiceError::InvalidState(
                "profile is not linked to a rating account".into(),
            ));
        }
        if let Some(retry_in) = cooldown_remaining(profile.last_synced_at, now, cooldown) {
            return Ok(ProfileChange::Keep(Some(retry_in)));
        }
        profile.last_synced_at = Some(now);
        Ok(ProfileChange::Write(None))
    })
    .await?;
    if let Some(retry_in) = wait {
        return Ok(RefreshOutcome::RateLimited { retry_in });
    }
    let Some(external_id) = claimed.external_id else {
        return Err(ServiceError::InvalidState(
            "profile is not linked to a rating account".into(),
        ));
    };

    let token = state
        .rating()
        .access_token()
        .await
        .map_err(ServiceError::RatingServiceUnavailable)?;
    let ratings = fetch_ratings(state, &token, &external_id).await?;

    let (profile, ()) = update_profile(store.as_ref(), profile_id, |current| {
        if current.external_id.as_deref() != Some(external_id.as_str()) {
            return Err(ServiceError::Conflict(
                "profile was relinked during the refresh".into(),
            ));
        }
        if let Some(ratings) = &ratings {
            apply_ratings(current, ratings);
        }
        Ok(ProfileChange::Write(()))
    })
    .await?;
    Ok(RefreshOutcome::Refreshed(profile))
}

/// Create or update a local profile and keep rating-change notifications in line with its link.
///
/// Notification bookkeeping is best-effort: the profile is saved even when the rating service
/// cannot be reached.
pub async fn upsert_profile(
    state: &SharedState,
    profile_id: Uuid,
    display_name: String,
    external_id: Option<String>,
) -> Result<ProfileEntity, ServiceError> {
    let store = state.require_store().await?;

    for attempt in 1..=MAX_WRITE_ATTEMPTS {
        let existing = store.find_profile(profile_id).await?;
        let expected = existing.as_ref().map(|p| p.revision);
        let previous_link = existing.as_ref().and_then(|p| p.external_id.clone());

        let mut profile = existing.unwrap_or_else(|| ProfileEntity {
            id: profile_id,
            display_name: display_name.clone(),
            external_id: None,
            singles_rating: None,
            doubles_rating: None,
            reliability: None,
            last_synced_at: None,
            revision: 0,
        });
        profile.display_name = display_name.clone();
        if previous_link != external_id {
            // Ratings belong to the old holder.
            profile.singles_rating = None;
            profile.doubles_rating = None;
            profile.reliability = None;
            profile.last_synced_at = None;
        }
        profile.external_id = external_id.clone();
        profile.revision = expected.map_or(0, |revision| revision + 1);

        match store.save_profile(profile.clone(), expected).await {
            Ok(()) => {
                if previous_link != external_id {
                    update_subscriptions(state, previous_link, external_id).await;
                }
                return Ok(profile);
            }
            Err(err) if err.is_conflict() => {
                debug!(%profile_id, attempt, "profile changed concurrently; retrying");
            }
            Err(err) => return Err(err.into()),
        }
    }

    Err(ServiceError::Conflict(format!(
        "profile {profile_id} is being updated concurrently; try again"
    )))
}

async fn update_subscriptions(
    state: &SharedState,
    previous: Option<String>,
    current: Option<String>,
) {
    let token = match state.rating().access_token().await {
        Ok(token) => token,
        Err(err) => {
            warn!(error = %err, "cannot update rating notifications without a token");
            return;
        }
    };
    let api = state.rating().api();
    if let Some(old) = previous {
        if let Err(err) = api.unsubscribe(token.clone(), vec![old.clone()]).await {
            warn!(external_id = %old, error = %err, "failed to cancel rating notifications");
        }
    }
    if let Some(new) = current {
        match api.subscribe(token, vec![new.clone()]).await {
            Ok(()) => info!(external_id = %new, "subscribed to rating notifications"),
            Err(err) => warn!(
                external_id = %new,
                error = %err,
                "failed to subscribe to rating notifications"
            ),
        }
    }
}

/// Time left before another refresh is allowed, `None` when it is allowed now.
pub fn cooldown_remaining(
    last_synced_at: Option<SystemTime>,
    now: SystemTime,
    cooldown: Duration,
) -> Option<Duration> {
    let elapsed = now.duration_since(last_synced_at?).unwrap_or_default();
    (elapsed < cooldown).then(|| cooldown - elapsed)
}

async fn fetch_ratings(
    state: &SharedState,
    token: &str,
    external_id: &str,
) -> Result<Option<PlayerRatings>, ServiceError> {
    let ratings = state
        .rating()
        .api()
        .lookup_players(token.to_owned(), vec![external_id.to_owned()])
        .await
        .map_err(ServiceError::RatingServiceUnavailable)?;
    let found = ratings.into_iter().find(|r| r.external_id == external_id);
    if found.is_none() {
        warn!(%external_id, "rating service returned no ratings for linked profile");
    }
    Ok(found)
}

fn apply_ratings(profile: &mut ProfileEntity, ratings: &PlayerRatings) {
    merge(&mut profile.singles_rating, ratings.singles);
    merge(&mut profile.doubles_rating, ratings.doubles);
    merge(&mut profile.reliability, ratings.reliability);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cooldown_window() {
        let start = SystemTime::UNIX_EPOCH;
        let cooldown = Duration::from_secs(60);
        assert_eq!(cooldown_remaining(None, start, cooldown), None);
        assert_eq!(
            cooldown_remaining(Some(start), start + Duration::from_secs(15), cooldown),
            Some(Duration::from_secs(45))
        );
        assert_eq!(
            cooldown_remaining(Some(start), start + Duration::from_secs(60), cooldown),
            None
        );
    }

    #[test]
    fn not_rated_values_leave_known_ratings() {
        let mut profile = ProfileEntity {
            id: Uuid::new_v4(),
            display_name: "Pat".into(),
            external_id: Some("P1".into()),
            singles_rating: Some(3.8),
            doubles_rating: None,
            reliability: Some(70.0),
            last_synced_at: None,
            revision: 0,
        };
        apply_ratings(
            &mut profile,
            &PlayerRatings {
                external_id: "P1".into(),
                singles: None,
                doubles: Some(4.0),
                reliability: None,
            },
        );
        assert_eq!(profile.singles_rating, Some(3.8));
        assert_eq!(profile.doubles_rating, Some(4.0));
        assert_eq!(profile.reliability, Some(70.0));
    }
}
