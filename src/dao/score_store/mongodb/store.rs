use std::{sync::Arc, time::SystemTime};

use futures::{TryStreamExt, future::BoxFuture};
use mongodb::{
    Client, Collection, Database, IndexModel,
    bson::{DateTime, doc},
    error::{Error as MongoError, ErrorKind, WriteFailure},
    options::IndexOptions,
};
use serde::{Serialize, de::DeserializeOwned};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    config::MongoConfig,
    connection::establish_connection,
    error::{MongoDaoError, MongoResult},
    models::{
        BATCH_COLLECTION, MATCH_COLLECTION, MongoBatchDocument, MongoMatchDocument,
        MongoProfileDocument, MongoSnapshotDocument, MongoWebhookDocument, PROFILE_COLLECTION,
        SNAPSHOT_COLLECTION, WEBHOOK_COLLECTION, id_filter, uuid_strings,
    },
};
use crate::dao::{
    models::{
        EventKey, MatchEntity, ProfileEntity, RatingSnapshotEntity, SubmissionBatchEntity,
        WebhookEventEntity,
    },
    score_store::ScoreStore,
    storage::{StorageError, StorageResult},
};

const DUPLICATE_KEY_CODE: i32 = 11000;

/// MongoDB-backed [`ScoreStore`] implementation.
#[derive(Clone)]
pub struct MongoScoreStore {
    inner: Arc<MongoInner>,
}

struct MongoInner {
    state: RwLock<MongoState>,
    config: MongoConfig,
}

struct MongoState {
    #[allow(dead_code)]
    client: Client,
    database: Database,
}

impl MongoInner {
    async fn ping(&self) -> MongoResult<()> {
        let database = self.state.read().await.database.clone();
        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|source| MongoDaoError::HealthPing { source })?;
        Ok(())
    }

    async fn reconnect(&self) -> MongoResult<()> {
        let (client, database) =
            establish_connection(&self.config.options, &self.config.database_name).await?;
        let mut guard = self.state.write().await;
        guard.client = client;
        guard.database = database;
        Ok(())
    }
}

impl MongoScoreStore {
    /// Establish a connection to MongoDB and ensure indexes are present.
    pub async fn connect(config: MongoConfig) -> MongoResult<Self> {
        let (client, database) =
            establish_connection(&config.options, &config.database_name).await?;

        let store = Self {
            inner: Arc::new(MongoInner {
                state: RwLock::new(MongoState { client, database }),
                config,
            }),
        };
        store.ensure_indexes().await?;
        Ok(store)
    }

    async fn collection<T: Send + Sync>(&self, name: &str) -> Collection<T> {
        self.inner.state.read().await.database.collection::<T>(name)
    }

    async fn ensure_indexes(&self) -> MongoResult<()> {
        let indexes: [(&'static str, &'static str, mongodb::bson::Document); 4] = [
            (
                MATCH_COLLECTION,
                "match_event_idx",
                doc! { "event_type": 1, "event_id": 1 },
            ),
            (
                MATCH_COLLECTION,
                "match_correction_idx",
                doc! { "needs_correction": 1, "correction_submitted": 1 },
            ),
            (
                BATCH_COLLECTION,
                "batch_due_idx",
                doc! { "status": 1, "next_retry_at": 1 },
            ),
            (
                PROFILE_COLLECTION,
                "profile_external_idx",
                doc! { "external_id": 1 },
            ),
        ];

        for (collection, name, keys) in indexes {
            let model = IndexModel::builder()
                .keys(keys)
                .options(IndexOptions::builder().name(Some(name.to_owned())).build())
                .build();
            self.collection::<mongodb::bson::Document>(collection)
                .await
                .create_index(model)
                .await
                .map_err(|source| MongoDaoError::EnsureIndex {
                    collection,
                    index: name,
                    source,
                })?;
        }
        Ok(())
    }

    async fn find_by_id<T>(&self, collection: &'static str, id: String) -> MongoResult<Option<T>>
    where
        T: DeserializeOwned + Send + Sync,
    {
        self.collection::<T>(collection)
            .await
            .find_one(id_filter(&id))
            .await
            .map_err(|source| MongoDaoError::Read {
                collection,
                id,
                source,
            })
    }

    async fn upsert<T>(&self, collection: &'static str, id: String, document: T) -> MongoResult<()>
    where
        T: Serialize + Send + Sync,
    {
        self.collection::<T>(collection)
            .await
            .replace_one(id_filter(&id), &document)
            .upsert(true)
            .await
            .map_err(|source| MongoDaoError::Write {
                collection,
                id,
                source,
            })?;
        Ok(())
    }

    async fn query<T>(
        &self,
        collection: &'static str,
        filter: mongodb::bson::Document,
        sort: mongodb::bson::Document,
    ) -> MongoResult<Vec<T>>
    where
        T: DeserializeOwned + Send + Sync,
    {
        self.collection::<T>(collection)
            .await
            .find(filter)
            .sort(sort)
            .await
            .map_err(|source| MongoDaoError::Query { collection, source })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::Query { collection, source })
    }

    async fn list_matches(&self, filter: mongodb::bson::Document) -> MongoResult<Vec<MatchEntity>> {
        let documents: Vec<MongoMatchDocument> = self
            .query(MATCH_COLLECTION, filter, doc! { "created_at": 1, "_id": 1 })
            .await?;
        Ok(documents.into_iter().map(Into::into).collect())
    }

    /// Returns `false` when no document with `expected_revision` exists anymore.
    async fn replace_if_revision(
        &self,
        entity: MatchEntity,
        expected_revision: u64,
    ) -> MongoResult<bool> {
        let id = entity.id.to_string();
        let document: MongoMatchDocument = entity.into();
        let result = self
            .collection::<MongoMatchDocument>(MATCH_COLLECTION)
            .await
            .replace_one(
                doc! { "_id": id.as_str(), "revision": expected_revision as i64 },
                &document,
            )
            .await
            .map_err(|source| MongoDaoError::Write {
                collection: MATCH_COLLECTION,
                id,
                source,
            })?;
        Ok(result.matched_count == 1)
    }

    /// Insert a new document or replace the one whose `revision_path` equals `expected_revision`.
    async fn save_checked<T>(
        &self,
        collection: &'static str,
        entity: &'static str,
        id: String,
        document: T,
        revision_path: &str,
        expected_revision: Option<u64>,
    ) -> StorageResult<()>
    where
        T: Serialize + Send + Sync,
    {
        let target = self.collection::<T>(collection).await;
        let Some(expected) = expected_revision else {
            return match target.insert_one(&document).await {
                Ok(_) => Ok(()),
                Err(err) if is_duplicate_key(&err) => {
                    Err(StorageError::AlreadyExists { entity, id })
                }
                Err(source) => Err(MongoDaoError::Write {
                    collection,
                    id,
                    source,
                }
                .into()),
            };
        };

        let mut filter = id_filter(&id);
        filter.insert(revision_path, expected as i64);
        let result = target
            .replace_one(filter, &document)
            .await
            .map_err(|source| MongoDaoError::Write {
                collection,
                id: id.clone(),
                source,
            })?;
        if result.matched_count == 1 {
            Ok(())
        } else {
            Err(StorageError::Conflict {
                entity,
                id,
                expected,
            })
        }
    }

    async fn insert_webhook_event(&self, event: WebhookEventEntity) -> MongoResult<bool> {
        let id = event.dedupe_key.clone();
        let document = MongoWebhookDocument {
            dedupe_key: event.dedupe_key.clone(),
            event,
        };
        match self
            .collection::<MongoWebhookDocument>(WEBHOOK_COLLECTION)
            .await
            .insert_one(&document)
            .await
        {
            Ok(_) => Ok(true),
            Err(err) if is_duplicate_key(&err) => Ok(false),
            Err(source) => Err(MongoDaoError::Write {
                collection: WEBHOOK_COLLECTION,
                id,
                source,
            }),
        }
    }

    async fn mark_webhook_processed(&self, dedupe_key: String) -> MongoResult<()> {
        self.collection::<MongoWebhookDocument>(WEBHOOK_COLLECTION)
            .await
            .update_one(
                id_filter(&dedupe_key),
                doc! { "$set": { "event.processed": true } },
            )
            .await
            .map_err(|source| MongoDaoError::Write {
                collection: WEBHOOK_COLLECTION,
                id: dedupe_key,
                source,
            })?;
        Ok(())
    }
}

fn is_duplicate_key(err: &MongoError) -> bool {
    matches!(
        err.kind.as_ref(),
        ErrorKind::Write(WriteFailure::WriteError(write_error)) if write_error.code == DUPLICATE_KEY_CODE
    )
}

impl ScoreStore for MongoScoreStore {
    fn insert_match(&self, entity: MatchEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let id = entity.id.to_string();
            let document: MongoMatchDocument = entity.into();
            store
                .save_checked(MATCH_COLLECTION, "match", id, document, "revision", None)
                .await
        })
    }

    fn find_match(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<MatchEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let document = store
                .find_by_id::<MongoMatchDocument>(MATCH_COLLECTION, id.to_string())
                .await?;
            Ok(document.map(Into::into))
        })
    }

    fn list_event_matches(
        &self,
        event: EventKey,
    ) -> BoxFuture<'static, StorageResult<Vec<MatchEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let filter = doc! {
                "event_type": event.event_type.as_str(),
                "event_id": event.event_id.to_string(),
            };
            store.list_matches(filter).await.map_err(Into::into)
        })
    }

    fn list_correction_candidates(&self) -> BoxFuture<'static, StorageResult<Vec<MatchEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let filter = doc! { "needs_correction": true, "correction_submitted": false };
            store.list_matches(filter).await.map_err(Into::into)
        })
    }

    fn replace_match(
        &self,
        entity: MatchEntity,
        expected_revision: u64,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let id = entity.id.to_string();
            if store.replace_if_revision(entity, expected_revision).await? {
                Ok(())
            } else {
                Err(StorageError::Conflict {
                    entity: "match",
                    id,
                    expected: expected_revision,
                })
            }
        })
    }

    fn save_batch(&self, batch: SubmissionBatchEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let id = batch.id.to_string();
            let document: MongoBatchDocument = batch.into();
            store
                .upsert(BATCH_COLLECTION, id, document)
                .await
                .map_err(Into::into)
        })
    }

    fn find_batch(
        &self,
        id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<SubmissionBatchEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let document = store
                .find_by_id::<MongoBatchDocument>(BATCH_COLLECTION, id.to_string())
                .await?;
            Ok(document.map(|doc| doc.batch))
        })
    }

    fn list_due_batches(
        &self,
        now: SystemTime,
        max_retries: u32,
    ) -> BoxFuture<'static, StorageResult<Vec<SubmissionBatchEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let filter = doc! {
                "status": { "$in": ["pending", "partial_failure"] },
                "retry_count": { "$lt": i64::from(max_retries) },
                "next_retry_at": { "$lte": DateTime::from_system_time(now) },
            };
            let documents: Vec<MongoBatchDocument> = store
                .query(BATCH_COLLECTION, filter, doc! { "next_retry_at": 1 })
                .await?;
            Ok(documents.into_iter().map(|doc| doc.batch).collect())
        })
    }

    fn insert_webhook_event(
        &self,
        event: WebhookEventEntity,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move { store.insert_webhook_event(event).await.map_err(Into::into) })
    }

    fn find_webhook_event(
        &self,
        dedupe_key: String,
    ) -> BoxFuture<'static, StorageResult<Option<WebhookEventEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let document = store
                .find_by_id::<MongoWebhookDocument>(WEBHOOK_COLLECTION, dedupe_key)
                .await?;
            Ok(document.map(|doc| doc.event))
        })
    }

    fn mark_webhook_processed(
        &self,
        dedupe_key: String,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .mark_webhook_processed(dedupe_key)
                .await
                .map_err(Into::into)
        })
    }

    fn find_rating_snapshot(
        &self,
        external_id: String,
    ) -> BoxFuture<'static, StorageResult<Option<RatingSnapshotEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let document = store
                .find_by_id::<MongoSnapshotDocument>(SNAPSHOT_COLLECTION, external_id)
                .await?;
            Ok(document.map(|doc| doc.snapshot))
        })
    }

    fn save_rating_snapshot(
        &self,
        snapshot: RatingSnapshotEntity,
        expected_revision: Option<u64>,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let id = snapshot.external_id.clone();
            let document = MongoSnapshotDocument {
                external_id: id.clone(),
                snapshot,
            };
            store
                .save_checked(
                    SNAPSHOT_COLLECTION,
                    "rating snapshot",
                    id,
                    document,
                    "snapshot.revision",
                    expected_revision,
                )
                .await
        })
    }

    fn find_profile(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<ProfileEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let document = store
                .find_by_id::<MongoProfileDocument>(PROFILE_COLLECTION, id.to_string())
                .await?;
            Ok(document.map(|doc| doc.profile))
        })
    }

    fn find_profiles(
        &self,
        ids: Vec<Uuid>,
    ) -> BoxFuture<'static, StorageResult<Vec<ProfileEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let filter = doc! { "_id": { "$in": uuid_strings(&ids) } };
            let documents: Vec<MongoProfileDocument> =
                store.query(PROFILE_COLLECTION, filter, doc! {}).await?;
            Ok(documents.into_iter().map(|doc| doc.profile).collect())
        })
    }

    fn find_profile_by_external_id(
        &self,
        external_id: String,
    ) -> BoxFuture<'static, StorageResult<Option<ProfileEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let document = store
                .collection::<MongoProfileDocument>(PROFILE_COLLECTION)
                .await
                .find_one(doc! { "external_id": external_id.as_str() })
                .await
                .map_err(|source| MongoDaoError::Read {
                    collection: PROFILE_COLLECTION,
                    id: external_id,
                    source,
                })?;
            Ok(document.map(|doc| doc.profile))
        })
    }

    fn list_linked_profiles(&self) -> BoxFuture<'static, StorageResult<Vec<ProfileEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let filter = doc! { "external_id": { "$type": "string" } };
            let documents: Vec<MongoProfileDocument> = store
                .query(PROFILE_COLLECTION, filter, doc! { "profile.display_name": 1 })
                .await?;
            Ok(documents.into_iter().map(|doc| doc.profile).collect())
        })
    }

    fn save_profile(
        &self,
        profile: ProfileEntity,
        expected_revision: Option<u64>,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let id = profile.id.to_string();
            let document: MongoProfileDocument = profile.into();
            store
                .save_checked(
                    PROFILE_COLLECTION,
                    "profile",
                    id,
                    document,
                    "profile.revision",
                    expected_revision,
                )
                .await
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.ping().await.map_err(Into::into) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.reconnect().await.map_err(Into::into) })
    }
}
