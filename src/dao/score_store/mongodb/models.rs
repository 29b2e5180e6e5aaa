//! Collection documents. Fields used in filters are denormalized next to the embedded entity so
//! queries never depend on how the entity serializes its nested values.

use mongodb::bson::{DateTime, Document, doc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::dao::models::{
    MatchEntity, ProfileEntity, RatingSnapshotEntity, SubmissionBatchEntity, WebhookEventEntity,
};

pub const MATCH_COLLECTION: &str = "matches";
pub const BATCH_COLLECTION: &str = "submission_batches";
pub const WEBHOOK_COLLECTION: &str = "webhook_events";
pub const SNAPSHOT_COLLECTION: &str = "rating_snapshots";
pub const PROFILE_COLLECTION: &str = "profiles";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoMatchDocument {
    #[serde(rename = "_id")]
    pub id: String,
    pub event_type: String,
    pub event_id: String,
    pub revision: i64,
    pub needs_correction: bool,
    pub correction_submitted: bool,
    pub created_at: DateTime,
    pub entity: MatchEntity,
}

impl From<MatchEntity> for MongoMatchDocument {
    fn from(entity: MatchEntity) -> Self {
        let event = entity.origin.event_key();
        Self {
            id: entity.id.to_string(),
            event_type: event.event_type.as_str().to_owned(),
            event_id: event.event_id.to_string(),
            revision: entity.revision as i64,
            needs_correction: entity.submission.needs_correction,
            correction_submitted: entity.submission.correction_submitted,
            created_at: DateTime::from_system_time(entity.created_at),
            entity,
        }
    }
}

impl From<MongoMatchDocument> for MatchEntity {
    fn from(document: MongoMatchDocument) -> Self {
        let mut entity = document.entity;
        entity.revision = document.revision as u64;
        entity
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoBatchDocument {
    #[serde(rename = "_id")]
    pub id: String,
    pub status: String,
    pub retry_count: i64,
    pub next_retry_at: Option<DateTime>,
    pub batch: SubmissionBatchEntity,
}

impl From<SubmissionBatchEntity> for MongoBatchDocument {
    fn from(batch: SubmissionBatchEntity) -> Self {
        Self {
            id: batch.id.to_string(),
            status: batch.status.as_str().to_owned(),
            retry_count: i64::from(batch.retry_count),
            next_retry_at: batch.next_retry_at.map(DateTime::from_system_time),
            batch,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoWebhookDocument {
    #[serde(rename = "_id")]
    pub dedupe_key: String,
    pub event: WebhookEventEntity,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoSnapshotDocument {
    #[serde(rename = "_id")]
    pub external_id: String,
    pub snapshot: RatingSnapshotEntity,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoProfileDocument {
    #[serde(rename = "_id")]
    pub id: String,
    pub external_id: Option<String>,
    pub profile: ProfileEntity,
}

impl From<ProfileEntity> for MongoProfileDocument {
    fn from(profile: ProfileEntity) -> Self {
        Self {
            id: profile.id.to_string(),
            external_id: profile.external_id.clone(),
            profile,
        }
    }
}

pub fn id_filter(id: impl ToString) -> Document {
    doc! { "_id": id.to_string() }
}

pub fn uuid_strings(ids: &[Uuid]) -> Vec<String> {
    ids.iter().map(Uuid::to_string).collect()
}
