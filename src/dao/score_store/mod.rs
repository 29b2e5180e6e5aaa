pub mod memory;
#[cfg(feature = "mongo-store")]
pub mod mongodb;

use std::time::SystemTime;

use futures::future::BoxFuture;
use uuid::Uuid;

use crate::dao::{
    models::{
        EventKey, MatchEntity, ProfileEntity, RatingSnapshotEntity, SubmissionBatchEntity,
        WebhookEventEntity,
    },
    storage::StorageResult,
};

/// Abstraction over the document store holding matches, batches, webhook events and ratings.
///
/// Writes to matches, rating snapshots and profiles are revision-checked: a replace only succeeds
/// when the stored revision still equals `expected_revision`, otherwise it fails with
/// [`crate::dao::storage::StorageError::Conflict`] and the caller re-reads. Inserts fail with
/// [`crate::dao::storage::StorageError::AlreadyExists`] instead of overwriting.
pub trait ScoreStore: Send + Sync {
    /// Insert a freshly scheduled match; an existing id is never overwritten.
    fn insert_match(&self, entity: MatchEntity) -> BoxFuture<'static, StorageResult<()>>;
    fn find_match(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<MatchEntity>>>;
    fn list_event_matches(
        &self,
        event: EventKey,
    ) -> BoxFuture<'static, StorageResult<Vec<MatchEntity>>>;
    /// Matches flagged `needs_correction` whose correction has not been submitted yet.
    fn list_correction_candidates(&self) -> BoxFuture<'static, StorageResult<Vec<MatchEntity>>>;
    /// Replace a match document if its stored revision equals `expected_revision`.
    fn replace_match(
        &self,
        entity: MatchEntity,
        expected_revision: u64,
    ) -> BoxFuture<'static, StorageResult<()>>;

    fn save_batch(&self, batch: SubmissionBatchEntity) -> BoxFuture<'static, StorageResult<()>>;
    fn find_batch(
        &self,
        id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<SubmissionBatchEntity>>>;
    /// Pending or partially failed batches whose retry time has elapsed.
    fn list_due_batches(
        &self,
        now: SystemTime,
        max_retries: u32,
    ) -> BoxFuture<'static, StorageResult<Vec<SubmissionBatchEntity>>>;

    /// Insert a webhook event unless its dedupe key already exists. Returns `false` for duplicates.
    fn insert_webhook_event(
        &self,
        event: WebhookEventEntity,
    ) -> BoxFuture<'static, StorageResult<bool>>;
    fn find_webhook_event(
        &self,
        dedupe_key: String,
    ) -> BoxFuture<'static, StorageResult<Option<WebhookEventEntity>>>;
    fn mark_webhook_processed(&self, dedupe_key: String)
    -> BoxFuture<'static, StorageResult<()>>;

    fn find_rating_snapshot(
        &self,
        external_id: String,
    ) -> BoxFuture<'static, StorageResult<Option<RatingSnapshotEntity>>>;
    /// Insert (`expected_revision = None`) or replace a snapshot against its stored revision.
    fn save_rating_snapshot(
        &self,
        snapshot: RatingSnapshotEntity,
        expected_revision: Option<u64>,
    ) -> BoxFuture<'static, StorageResult<()>>;

    fn find_profile(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<ProfileEntity>>>;
    fn find_profiles(
        &self,
        ids: Vec<Uuid>,
    ) -> BoxFuture<'static, StorageResult<Vec<ProfileEntity>>>;
    fn find_profile_by_external_id(
        &self,
        external_id: String,
    ) -> BoxFuture<'static, StorageResult<Option<ProfileEntity>>>;
    /// Profiles carrying an external rating-holder id.
    fn list_linked_profiles(&self) -> BoxFuture<'static, StorageResult<Vec<ProfileEntity>>>;
    /// Insert (`expected_revision = None`) or replace a profile against its stored revision.
    fn save_profile(
        &self,
        profile: ProfileEntity,
        expected_revision: Option<u64>,
    ) -> BoxFuture<'static, StorageResult<()>>;

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}
