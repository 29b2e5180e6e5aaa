//! In-process [`ScoreStore`] used for local runs and tests.
//!
//! Every collection is an arena keyed by the record's stable id. Match updates honour the same
//! revision contract as the database backends: the shard lock held by [`DashMap::get_mut`] and
//! [`DashMap::entry`] makes every compare-and-replace atomic.

use std::{fmt::Display, hash::Hash, sync::Arc, time::SystemTime};

use dashmap::{DashMap, mapref::entry::Entry};
use futures::future::{BoxFuture, ready};
use uuid::Uuid;

use crate::dao::{
    models::{
        BatchStatus, EventKey, MatchEntity, ProfileEntity, RatingSnapshotEntity,
        SubmissionBatchEntity, WebhookEventEntity,
    },
    score_store::ScoreStore,
    storage::{StorageError, StorageResult},
};

#[derive(Default)]
struct Collections {
    matches: DashMap<Uuid, MatchEntity>,
    batches: DashMap<Uuid, SubmissionBatchEntity>,
    webhook_events: DashMap<String, WebhookEventEntity>,
    rating_snapshots: DashMap<String, RatingSnapshotEntity>,
    profiles: DashMap<Uuid, ProfileEntity>,
}

/// Memory-backed store. Cloning shares the underlying collections.
#[derive(Clone, Default)]
pub struct MemoryScoreStore {
    inner: Arc<Collections>,
}

impl MemoryScoreStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn sorted_matches(&self, filter: impl Fn(&MatchEntity) -> bool) -> Vec<MatchEntity> {
        let mut matches = self
            .inner
            .matches
            .iter()
            .filter(|entry| filter(entry.value()))
            .map(|entry| entry.value().clone())
            .collect::<Vec<_>>();
        matches.sort_by_key(|m| (m.created_at, m.id));
        matches
    }
}

/// Insert-if-absent or compare-and-replace under the entry's shard lock.
fn save_checked<K, V>(
    map: &DashMap<K, V>,
    key: K,
    value: V,
    expected_revision: Option<u64>,
    entity: &'static str,
    revision: impl Fn(&V) -> u64,
) -> StorageResult<()>
where
    K: Eq + Hash + Display,
{
    let id = key.to_string();
    match (map.entry(key), expected_revision) {
        (Entry::Vacant(slot), None) => {
            slot.insert(value);
            Ok(())
        }
        (Entry::Occupied(_), None) => Err(StorageError::AlreadyExists { entity, id }),
        (Entry::Occupied(mut slot), Some(expected)) if revision(slot.get()) == expected => {
            slot.insert(value);
            Ok(())
        }
        (_, Some(expected)) => Err(StorageError::Conflict {
            entity,
            id,
            expected,
        }),
    }
}

impl ScoreStore for MemoryScoreStore {
    fn insert_match(&self, entity: MatchEntity) -> BoxFuture<'static, StorageResult<()>> {
        let result = match self.inner.matches.entry(entity.id) {
            Entry::Occupied(_) => Err(StorageError::AlreadyExists {
                entity: "match",
                id: entity.id.to_string(),
            }),
            Entry::Vacant(slot) => {
                slot.insert(entity);
                Ok(())
            }
        };
        Box::pin(ready(result))
    }

    fn find_match(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<MatchEntity>>> {
        let found = self.inner.matches.get(&id).map(|entry| entry.value().clone());
        Box::pin(ready(Ok(found)))
    }

    fn list_event_matches(
        &self,
        event: EventKey,
    ) -> BoxFuture<'static, StorageResult<Vec<MatchEntity>>> {
        let matches = self.sorted_matches(|m| m.origin.event_key() == event);
        Box::pin(ready(Ok(matches)))
    }

    fn list_correction_candidates(&self) -> BoxFuture<'static, StorageResult<Vec<MatchEntity>>> {
        let matches = self.sorted_matches(|m| {
            m.submission.needs_correction && !m.submission.correction_submitted
        });
        Box::pin(ready(Ok(matches)))
    }

    fn replace_match(
        &self,
        entity: MatchEntity,
        expected_revision: u64,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let result = match self.inner.matches.get_mut(&entity.id) {
            Some(mut current) if current.revision == expected_revision => {
                *current = entity;
                Ok(())
            }
            _ => Err(StorageError::Conflict {
                entity: "match",
                id: entity.id.to_string(),
                expected: expected_revision,
            }),
        };
        Box::pin(ready(result))
    }

    fn save_batch(&self, batch: SubmissionBatchEntity) -> BoxFuture<'static, StorageResult<()>> {
        self.inner.batches.insert(batch.id, batch);
        Box::pin(ready(Ok(())))
    }

    fn find_batch(
        &self,
        id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<SubmissionBatchEntity>>> {
        let found = self.inner.batches.get(&id).map(|entry| entry.value().clone());
        Box::pin(ready(Ok(found)))
    }

    fn list_due_batches(
        &self,
        now: SystemTime,
        max_retries: u32,
    ) -> BoxFuture<'static, StorageResult<Vec<SubmissionBatchEntity>>> {
        let mut due = self
            .inner
            .batches
            .iter()
            .filter(|entry| {
                let batch = entry.value();
                matches!(
                    batch.status,
                    BatchStatus::Pending | BatchStatus::PartialFailure
                ) && batch.retry_count < max_retries
                    && batch.next_retry_at.is_some_and(|at| at <= now)
            })
            .map(|entry| entry.value().clone())
            .collect::<Vec<_>>();
        due.sort_by_key(|batch| batch.next_retry_at);
        Box::pin(ready(Ok(due)))
    }

    fn insert_webhook_event(
        &self,
        event: WebhookEventEntity,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let inserted = match self.inner.webhook_events.entry(event.dedupe_key.clone()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(event);
                true
            }
        };
        Box::pin(ready(Ok(inserted)))
    }

    fn find_webhook_event(
        &self,
        dedupe_key: String,
    ) -> BoxFuture<'static, StorageResult<Option<WebhookEventEntity>>> {
        let found = self
            .inner
            .webhook_events
            .get(&dedupe_key)
            .map(|entry| entry.value().clone());
        Box::pin(ready(Ok(found)))
    }

    fn mark_webhook_processed(
        &self,
        dedupe_key: String,
    ) -> BoxFuture<'static, StorageResult<()>> {
        if let Some(mut event) = self.inner.webhook_events.get_mut(&dedupe_key) {
            event.processed = true;
        }
        Box::pin(ready(Ok(())))
    }

    fn find_rating_snapshot(
        &self,
        external_id: String,
    ) -> BoxFuture<'static, StorageResult<Option<RatingSnapshotEntity>>> {
        let found = self
            .inner
            .rating_snapshots
            .get(&external_id)
            .map(|entry| entry.value().clone());
        Box::pin(ready(Ok(found)))
    }

    fn save_rating_snapshot(
        &self,
        snapshot: RatingSnapshotEntity,
        expected_revision: Option<u64>,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let result = save_checked(
            &self.inner.rating_snapshots,
            snapshot.external_id.clone(),
            snapshot,
            expected_revision,
            "rating snapshot",
            |snapshot| snapshot.revision,
        );
        Box::pin(ready(result))
    }

    fn find_profile(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<ProfileEntity>>> {
        let found = self.inner.profiles.get(&id).map(|entry| entry.value().clone());
        Box::pin(ready(Ok(found)))
    }

    fn find_profiles(
        &self,
        ids: Vec<Uuid>,
    ) -> BoxFuture<'static, StorageResult<Vec<ProfileEntity>>> {
        let found = ids
            .iter()
            .filter_map(|id| self.inner.profiles.get(id).map(|entry| entry.value().clone()))
            .collect();
        Box::pin(ready(Ok(found)))
    }

    fn find_profile_by_external_id(
        &self,
        external_id: String,
    ) -> BoxFuture<'static, StorageResult<Option<ProfileEntity>>> {
        let found = self
            .inner
            .profiles
            .iter()
            .find(|entry| entry.value().external_id.as_deref() == Some(external_id.as_str()))
            .map(|entry| entry.value().clone());
        Box::pin(ready(Ok(found)))
    }

    fn list_linked_profiles(&self) -> BoxFuture<'static, StorageResult<Vec<ProfileEntity>>> {
        let mut linked = self
            .inner
            .profiles
            .iter()
            .filter(|entry| entry.value().external_id.is_some())
            .map(|entry| entry.value().clone())
            .collect::<Vec<_>>();
        linked.sort_by(|a, b| a.display_name.cmp(&b.display_name));
        Box::pin(ready(Ok(linked)))
    }

    fn save_profile(
        &self,
        profile: ProfileEntity,
        expected_revision: Option<u64>,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let result = save_checked(
            &self.inner.profiles,
            profile.id,
            profile,
            expected_revision,
            "profile",
            |profile| profile.revision,
        );
        Box::pin(ready(result))
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(ready(Ok(())))
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(ready(Ok(())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::models::{
        BestOf, GameSettings, MatchOrigin, PlayType, SideEntity, WinBy,
    };

    fn sample_match() -> MatchEntity {
        let now = SystemTime::now();
        MatchEntity {
            id: Uuid::new_v4(),
            revision: 0,
            origin: MatchOrigin::League {
                league_id: Uuid::new_v4(),
                week: 1,
            },
            side_a: SideEntity {
                id: Uuid::new_v4(),
                name: "A".into(),
                player_ids: vec![],
            },
            side_b: SideEntity {
                id: Uuid::new_v4(),
                name: "B".into(),
                player_ids: vec![],
            },
            settings: GameSettings {
                points_per_game: 11,
                win_by: WinBy::Two,
                best_of: BestOf::Three,
                cap_at: None,
                play_type: PlayType::Singles,
            },
            status: Default::default(),
            score_state: Default::default(),
            score_proposal: None,
            official_results: vec![],
            audit_log: vec![],
            submission: Default::default(),
            rating_eligible: true,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn replace_rejects_stale_revision() {
        let store = MemoryScoreStore::new();
        let entity = sample_match();
        store.insert_match(entity.clone()).await.unwrap();

        let mut first = entity.clone();
        first.revision = 1;
        store.replace_match(first, 0).await.unwrap();

        let mut stale = entity.clone();
        stale.revision = 1;
        let err = store.replace_match(stale, 0).await.unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn insert_never_overwrites_a_match() {
        let store = MemoryScoreStore::new();
        let entity = sample_match();
        store.insert_match(entity.clone()).await.unwrap();

        let mut other = entity.clone();
        other.rating_eligible = false;
        let err = store.insert_match(other).await.unwrap_err();
        assert!(matches!(err, StorageError::AlreadyExists { entity: "match", .. }));
        let stored = store.find_match(entity.id).await.unwrap().unwrap();
        assert!(stored.rating_eligible);
    }

    #[tokio::test]
    async fn profile_writes_are_revision_checked() {
        let store = MemoryScoreStore::new();
        let profile = ProfileEntity {
            id: Uuid::new_v4(),
            display_name: "Robin".into(),
            external_id: Some("R1".into()),
            singles_rating: None,
            doubles_rating: None,
            reliability: None,
            last_synced_at: None,
            revision: 0,
        };
        store.save_profile(profile.clone(), None).await.unwrap();
        assert!(store.save_profile(profile.clone(), None).await.unwrap_err().is_conflict());

        let mut relinked = profile.clone();
        relinked.external_id = Some("R2".into());
        relinked.revision = 1;
        store.save_profile(relinked, Some(0)).await.unwrap();

        let mut stale = profile.clone();
        stale.singles_rating = Some(3.5);
        stale.revision = 1;
        let err = store.save_profile(stale, Some(0)).await.unwrap_err();
        assert!(matches!(err, StorageError::Conflict { expected: 0, .. }));
        let stored = store.find_profile(profile.id).await.unwrap().unwrap();
        assert_eq!(stored.external_id.as_deref(), Some("R2"));
        assert_eq!(stored.singles_rating, None);
    }

    #[tokio::test]
    async fn webhook_insert_is_insert_if_absent() {
        let store = MemoryScoreStore::new();
        let event = WebhookEventEntity {
            dedupe_key: "abc".into(),
            raw_payload: "{}".into(),
            event_type: "RATING_UPDATED".into(),
            received_at: SystemTime::now(),
            processed: false,
        };
        assert!(store.insert_webhook_event(event.clone()).await.unwrap());
        assert!(!store.insert_webhook_event(event).await.unwrap());
    }
}
