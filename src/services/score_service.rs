use std::time::SystemTime;

use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    dao::{models::MatchEntity, score_store::ScoreStore},
    error::ServiceError,
    state::{
        SharedState,
        state_machine::{Actor, ScoreCommand, apply_plan, plan_transition},
    },
};

/// Attempts of a revision-checked write before giving up on a contended match.
pub const MAX_WRITE_ATTEMPTS: usize = 5;

/// Re-read a match, let `mutate` change it and write it back against the revision that was read.
///
/// A lost race re-runs the whole cycle on fresh data. Errors returned by `mutate` abort without
/// writing.
pub async fn update_match<T, F>(
    store: &dyn ScoreStore,
    id: Uuid,
    now: SystemTime,
    mut mutate: F,
) -> Result<(MatchEntity, T), ServiceError>
where
    F: FnMut(&mut MatchEntity) -> Result<T, ServiceError>,
{
    for attempt in 1..=MAX_WRITE_ATTEMPTS {
        let mut entity = store
            .find_match(id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("match {id}")))?;
        let expected = entity.revision;

        let value = mutate(&mut entity)?;
        entity.revision = expected + 1;
        entity.updated_at = now;

        match store.replace_match(entity.clone(), expected).await {
            Ok(()) => return Ok((entity, value)),
            Err(err) if err.is_conflict() => {
                debug!(match_id = %id, attempt, "match changed concurrently; retrying");
            }
            Err(err) => return Err(err.into()),
        }
    }

    Err(ServiceError::Conflict(format!(
        "match {id} is being updated concurrently; try again"
    )))
}

/// Register a match scheduled by its owning event.
pub async fn register_match(
    state: &SharedState,
    entity: MatchEntity,
) -> Result<MatchEntity, ServiceError> {
    let store = state.require_store().await?;
    // Insert-if-absent; an existing id surfaces as a conflict.
    store.insert_match(entity.clone()).await?;
    info!(match_id = %entity.id, "registered match");
    Ok(entity)
}

pub async fn get_match(state: &SharedState, id: Uuid) -> Result<MatchEntity, ServiceError> {
    let store = state.require_store().await?;
    store
        .find_match(id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("match {id}")))
}

/// Apply a score command on behalf of `actor`, returning the new document and any warnings.
pub async fn apply_command(
    state: &SharedState,
    id: Uuid,
    command: ScoreCommand,
    actor: &Actor,
) -> Result<(MatchEntity, Vec<String>), ServiceError> {
    let store = state.require_store().await?;
    let now = state.clock().now();

    let (entity, warnings) = update_match(store.as_ref(), id, now, |entity| {
        let plan = plan_transition(entity, &command, actor, now)?;
        let warnings = plan.warnings.clone();
        apply_plan(entity, plan, now)?;
        Ok(warnings)
    })
    .await?;

    info!(
        match_id = %id,
        command = command.name(),
        actor = %actor.id,
        state = ?entity.score_state,
        "score transition applied"
    );
    Ok((entity, warnings))
}

#[cfg(test)]
mod tests {
    use futures::executor::block_on;

    use super::*;
    use crate::dao::{
        models::{
            BestOf, GameSettings, MatchOrigin, MatchStatus, PlayType, ScoreState, SideEntity,
            SubmissionRecord, WinBy,
        },
        score_store::memory::MemoryScoreStore,
    };

    fn scheduled() -> MatchEntity {
        let side = |name: &str| SideEntity {
            id: Uuid::new_v4(),
            name: name.into(),
            player_ids: vec![Uuid::new_v4()],
        };
        MatchEntity {
            id: Uuid::new_v4(),
            revision: 0,
            origin: MatchOrigin::League {
                league_id: Uuid::new_v4(),
                week: 3,
            },
            side_a: side("East"),
            side_b: side("West"),
            settings: GameSettings {
                points_per_game: 11,
                win_by: WinBy::Two,
                best_of: BestOf::Three,
                cap_at: None,
                play_type: PlayType::Singles,
            },
            status: MatchStatus::Scheduled,
            score_state: ScoreState::None,
            score_proposal: None,
            official_results: vec![],
            audit_log: vec![],
            submission: SubmissionRecord::default(),
            rating_eligible: true,
            created_at: SystemTime::UNIX_EPOCH,
            updated_at: SystemTime::UNIX_EPOCH,
        }
    }

    #[tokio::test]
    async fn a_lost_race_is_retried_on_fresh_data() {
        let store = MemoryScoreStore::new();
        let entity = scheduled();
        let id = entity.id;
        store.insert_match(entity).await.unwrap();

        let rival = store.clone();
        let mut calls = 0;
        let (updated, seen) = update_match(&store, id, SystemTime::UNIX_EPOCH, |entity| {
            calls += 1;
            if calls == 1 {
                let mut other = entity.clone();
                other.side_b.name = "Renamed".into();
                other.revision += 1;
                block_on(rival.replace_match(other, entity.revision)).unwrap();
            }
            entity.rating_eligible = false;
            Ok(entity.side_b.name.clone())
        })
        .await
        .unwrap();

        assert_eq!(calls, 2);
        assert_eq!(seen, "Renamed");
        assert_eq!(updated.revision, 2);
        assert!(!updated.rating_eligible);
    }

    #[tokio::test]
    async fn persistent_contention_gives_up_with_a_conflict() {
        let store = MemoryScoreStore::new();
        let entity = scheduled();
        let id = entity.id;
        store.insert_match(entity).await.unwrap();

        let rival = store.clone();
        let mut calls = 0;
        let result = update_match(&store, id, SystemTime::UNIX_EPOCH, |entity| {
            calls += 1;
            // Another writer always commits between this read and its write.
            let mut other = entity.clone();
            other.revision += 1;
            block_on(rival.replace_match(other, entity.revision)).unwrap();
            Ok(())
        })
        .await;

        assert!(matches!(result, Err(ServiceError::Conflict(_))));
        assert_eq!(calls, MAX_WRITE_ATTEMPTS);
        let stored = store.find_match(id).await.unwrap().unwrap();
        assert_eq!(stored.revision, MAX_WRITE_ATTEMPTS as u64);
    }
}
