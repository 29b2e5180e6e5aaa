//! Ingestion of rating-change notifications pushed by the rating service.
//!
//! Deliveries are deduplicated by a content hash before anything else happens, so redelivered or
//! concurrently repeated payloads are applied once. The sender is always acknowledged.

use std::time::SystemTime;

use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::{
    dao::{
        models::{RatingSnapshotEntity, WebhookEventEntity},
        rating_api::models::parse_rating,
        score_store::ScoreStore,
    },
    error::ServiceError,
    services::{
        rating_sync_service::{ProfileChange, update_profile},
        score_service::MAX_WRITE_ATTEMPTS,
    },
    state::SharedState,
};

/// What a delivery turned out to be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookReceipt {
    pub dedupe_key: String,
    pub duplicate: bool,
}

/// Dispatch category of a delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookKind {
    RatingChanged,
    RegistrationValidation,
    Unknown,
}

impl WebhookKind {
    fn from_event_type(event_type: &str) -> Self {
        let normalized = event_type.to_ascii_uppercase().replace(['.', '-', ' '], "_");
        if normalized.contains("RATING") {
            WebhookKind::RatingChanged
        } else if normalized.contains("VALIDATION") || normalized.contains("REGISTRATION") {
            WebhookKind::RegistrationValidation
        } else {
            WebhookKind::Unknown
        }
    }
}

/// Stable subset of a delivery used for deduplication.
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct NormalizedDelivery {
    pub event_type: Option<String>,
    pub external_id: Option<String>,
    pub match_id: Option<String>,
    pub singles: Option<f64>,
    pub doubles: Option<f64>,
    pub reliability: Option<f64>,
}

impl NormalizedDelivery {
    /// Extract the stable fields, accepting both snake_case and camelCase names and ratings
    /// either at the top level or under `ratings`.
    pub fn from_value(value: &Value) -> Self {
        let ratings = value.get("ratings").unwrap_or(value);
        Self {
            event_type: text_field(value, &["event_type", "eventType", "type", "event"]),
            external_id: text_field(
                value,
                &["external_id", "externalId", "player_id", "playerId", "holder_id"],
            ),
            match_id: text_field(value, &["match_id", "matchId"]),
            singles: rating_field(ratings, &["singles", "singles_rating", "singlesRating"]),
            doubles: rating_field(ratings, &["doubles", "doubles_rating", "doublesRating"]),
            reliability: rating_field(ratings, &["reliability", "reliability_score"]),
        }
    }

    fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// SHA-256 over the normalized fields, or over the raw body when none are present.
pub fn dedupe_key(raw: &str, normalized: &NormalizedDelivery) -> String {
    let mut hasher = Sha256::new();
    if normalized.is_empty() {
        hasher.update(raw.as_bytes());
    } else {
        let canonical = serde_json::to_string(normalized).unwrap_or_else(|_| raw.to_owned());
        hasher.update(canonical.as_bytes());
    }
    hex::encode(hasher.finalize())
}

/// Handle one POST delivery. Never fails: problems are logged and the delivery acknowledged.
pub async fn handle_delivery(state: &SharedState, raw: &str) -> WebhookReceipt {
    let value = serde_json::from_str::<Value>(raw).unwrap_or(Value::Null);
    let normalized = NormalizedDelivery::from_value(&value);
    let key = dedupe_key(raw, &normalized);

    match process(state, raw, &key, &normalized).await {
        Ok(duplicate) => WebhookReceipt {
            dedupe_key: key,
            duplicate,
        },
        Err(err) => {
            warn!(dedupe_key = %key, error = %err, "webhook processing failed");
            WebhookReceipt {
                dedupe_key: key,
                duplicate: false,
            }
        }
    }
}

/// Returns `true` when the delivery was already known.
async fn process(
    state: &SharedState,
    raw: &str,
    key: &str,
    normalized: &NormalizedDelivery,
) -> Result<bool, ServiceError> {
    let store = state.require_store().await?;
    if store.find_webhook_event(key.to_owned()).await?.is_some() {
        debug!(dedupe_key = %key, "duplicate webhook delivery ignored");
        return Ok(true);
    }

    let event_type = normalized
        .event_type
        .clone()
        .unwrap_or_else(|| "unknown".to_owned());
    let event = WebhookEventEntity {
        dedupe_key: key.to_owned(),
        raw_payload: raw.to_owned(),
        event_type: event_type.clone(),
        received_at: state.clock().now(),
        processed: false,
    };
    match store.insert_webhook_event(event).await {
        Ok(true) => {}
        Ok(false) => {
            debug!(dedupe_key = %key, "concurrent duplicate webhook delivery ignored");
            return Ok(true);
        }
        Err(err) => warn!(dedupe_key = %key, error = %err, "failed to persist webhook event"),
    }

    match WebhookKind::from_event_type(&event_type) {
        WebhookKind::RatingChanged => apply_rating_change(state, store.as_ref(), normalized).await?,
        WebhookKind::RegistrationValidation => {
            debug!(dedupe_key = %key, "registration validation acknowledged");
        }
        WebhookKind::Unknown => {
            info!(dedupe_key = %key, %event_type, "unhandled webhook event type stored");
        }
    }

    store.mark_webhook_processed(key.to_owned()).await?;
    Ok(false)
}

async fn apply_rating_change(
    state: &SharedState,
    store: &dyn ScoreStore,
    delivery: &NormalizedDelivery,
) -> Result<(), ServiceError> {
    let Some(external_id) = delivery.external_id.clone() else {
        warn!("rating change without rating-holder id");
        return Ok(());
    };
    let now = state.clock().now();

    update_snapshot(store, &external_id, now, |snapshot| {
        merge(&mut snapshot.singles_rating, delivery.singles);
        merge(&mut snapshot.doubles_rating, delivery.doubles);
        merge(&mut snapshot.reliability, delivery.reliability);
        if delivery.match_id.is_some() {
            snapshot.last_match_id = delivery.match_id.clone();
        }
    })
    .await?;

    if let Some(profile) = store.find_profile_by_external_id(external_id.clone()).await? {
        update_profile(store, profile.id, |current| {
            if current.external_id.as_deref() != Some(external_id.as_str()) {
                return Ok(ProfileChange::Keep(()));
            }
            merge(&mut current.singles_rating, delivery.singles);
            merge(&mut current.doubles_rating, delivery.doubles);
            merge(&mut current.reliability, delivery.reliability);
            Ok(ProfileChange::Write(()))
        })
        .await?;
    }

    info!(%external_id, "applied rating change");
    Ok(())
}

/// Create or update the snapshot of `external_id` against the revision that was read.
pub(crate) async fn update_snapshot<F>(
    store: &dyn ScoreStore,
    external_id: &str,
    now: SystemTime,
    mut mutate: F,
) -> Result<RatingSnapshotEntity, ServiceError>
where
    F: FnMut(&mut RatingSnapshotEntity),
{
    for attempt in 1..=MAX_WRITE_ATTEMPTS {
        let existing = store.find_rating_snapshot(external_id.to_owned()).await?;
        let expected = existing.as_ref().map(|snapshot| snapshot.revision);
        let mut snapshot = existing.unwrap_or_else(|| RatingSnapshotEntity {
            external_id: external_id.to_owned(),
            singles_rating: None,
            doubles_rating: None,
            reliability: None,
            last_match_id: None,
            revision: 0,
            updated_at: now,
        });

        mutate(&mut snapshot);
        snapshot.revision = expected.unwrap_or(0) + 1;
        snapshot.updated_at = now;

        match store.save_rating_snapshot(snapshot.clone(), expected).await {
            Ok(()) => return Ok(snapshot),
            Err(err) if err.is_conflict() => {
                debug!(%external_id, attempt, "rating snapshot changed concurrently; retrying");
            }
            Err(err) => return Err(err.into()),
        }
    }

    Err(ServiceError::Conflict(format!(
        "rating snapshot {external_id} is being updated concurrently"
    )))
}

/// Known values are never replaced by unknown ones.
pub(crate) fn merge(target: &mut Option<f64>, update: Option<f64>) {
    if update.is_some() {
        *target = update;
    }
}

fn text_field(value: &Value, names: &[&str]) -> Option<String> {
    names.iter().find_map(|name| match value.get(*name)? {
        Value::String(text) if !text.trim().is_empty() => Some(text.trim().to_owned()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    })
}

fn rating_field(value: &Value, names: &[&str]) -> Option<f64> {
    names
        .iter()
        .find_map(|name| value.get(*name).and_then(parse_rating))
}

#[cfg(test)]
mod tests {
    use futures::executor::block_on;
    use serde_json::json;

    use super::*;
    use crate::dao::score_store::memory::MemoryScoreStore;

    #[tokio::test]
    async fn interleaved_rating_updates_both_survive() {
        let store = MemoryScoreStore::new();
        let now = SystemTime::UNIX_EPOCH;
        update_snapshot(&store, "P1", now, |snapshot| {
            snapshot.singles_rating = Some(3.5);
        })
        .await
        .unwrap();

        let rival = store.clone();
        let mut interleaved = false;
        let snapshot = update_snapshot(&store, "P1", now, |snapshot| {
            if !interleaved {
                interleaved = true;
                // A second delivery lands between this read and its write.
                let mut other = snapshot.clone();
                other.doubles_rating = Some(4.0);
                other.revision = 2;
                block_on(rival.save_rating_snapshot(other, Some(1))).unwrap();
            }
            snapshot.reliability = Some(75.0);
        })
        .await
        .unwrap();

        assert_eq!(snapshot.revision, 3);
        assert_eq!(snapshot.singles_rating, Some(3.5));
        assert_eq!(snapshot.doubles_rating, Some(4.0));
        assert_eq!(snapshot.reliability, Some(75.0));
        let stored = store.find_rating_snapshot("P1".into()).await.unwrap().unwrap();
        assert_eq!(stored, snapshot);
    }

    #[test]
    fn key_ignores_volatile_fields() {
        let first = json!({
            "eventType": "RATING_UPDATED",
            "playerId": "P1",
            "ratings": { "doubles": 4.2, "singles": "NR" },
            "deliveredAt": "2026-01-01T00:00:00Z"
        });
        let second = json!({
            "eventType": "RATING_UPDATED",
            "playerId": "P1",
            "ratings": { "doubles": 4.2, "singles": "NR" },
            "deliveredAt": "2026-01-01T00:05:00Z"
        });
        let key_a = dedupe_key(&first.to_string(), &NormalizedDelivery::from_value(&first));
        let key_b = dedupe_key(&second.to_string(), &NormalizedDelivery::from_value(&second));
        assert_eq!(key_a, key_b);
        assert_eq!(key_a.len(), 64);
    }

    #[test]
    fn falls_back_to_raw_body() {
        let raw = "not json at all";
        let normalized = NormalizedDelivery::from_value(&Value::Null);
        assert_eq!(dedupe_key(raw, &normalized), dedupe_key(raw, &normalized));
        assert_ne!(dedupe_key(raw, &normalized), dedupe_key("other", &normalized));
    }

    #[test]
    fn classifies_event_types() {
        assert_eq!(
            WebhookKind::from_event_type("rating.updated"),
            WebhookKind::RatingChanged
        );
        assert_eq!(
            WebhookKind::from_event_type("REGISTRATION_VALIDATION"),
            WebhookKind::RegistrationValidation
        );
        assert_eq!(WebhookKind::from_event_type("ping"), WebhookKind::Unknown);
    }

    #[test]
    fn merge_keeps_known_values() {
        let mut rating = Some(3.9);
        merge(&mut rating, None);
        assert_eq!(rating, Some(3.9));
        merge(&mut rating, Some(4.1));
        assert_eq!(rating, Some(4.1));
    }
}
