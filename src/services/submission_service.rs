//! Relay of official results to the rating service.
//!
//! Three entry points share one flow: bulk submission on request, the scheduled retry queue and
//! the hourly correction pass. Each invocation first obtains a token; without one nothing is
//! attempted. Afterwards every match is attempted in isolation so one failure (or panic) never
//! stops the rest.

use std::{panic::AssertUnwindSafe, time::Duration};

use futures::FutureExt;
use tokio::time::sleep;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    dao::{
        models::{
            BatchStatus, EventKey, MatchEntity, MatchSubmissionOutcome, OutcomeStatus, ScoreState,
            SubmissionBatchEntity,
        },
        rating_api::RatingApiError,
        score_store::ScoreStore,
    },
    error::ServiceError,
    services::{
        formatter::{format_submission, submission_identifier},
        score_service::update_match,
    },
    state::{SharedState, scorable::ScorableMatch},
};

/// Counts returned by the retry-failed operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrySummary {
    pub batch_id: Option<Uuid>,
    pub retried: usize,
    pub success_count: usize,
    pub failure_count: usize,
}

/// Counts of one correction pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CorrectionSummary {
    pub candidates: usize,
    pub corrected: usize,
    pub failed: usize,
}

/// Result of the admin connectivity test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionReport {
    pub ok: bool,
    pub message: String,
    pub elapsed_ms: u64,
}

/// Why a match is sent: first submission or resubmission of a corrected result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AttemptKind {
    Initial,
    Correction,
}

/// Duplicate-submission rule.
///
/// The service refuses an identifier it already holds. Identifiers are derived from the match
/// alone, so a refusal means an earlier call reached the service even if its acknowledgement
/// was never recorded here; the match counts as submitted. Corrections reuse the identifier on
/// purpose, so for them a refusal means the service kept the earlier result and the correction
/// stays pending.
pub fn is_duplicate_submission(err: &RatingApiError) -> bool {
    match err {
        RatingApiError::Rejected {
            status, message, ..
        } => {
            let message = message.to_ascii_lowercase();
            *status == 409 || message.contains("already exists") || message.contains("duplicate")
        }
        _ => false,
    }
}

/// Submit an explicit list of matches, or every official, unsubmitted, eligible match of the event.
pub async fn submit_matches(
    state: &SharedState,
    event: EventKey,
    match_ids: Option<Vec<Uuid>>,
    requested_by: Uuid,
) -> Result<SubmissionBatchEntity, ServiceError> {
    let store = state.require_store().await?;
    let token = acquire_token(state).await?;

    let match_ids = match match_ids {
        Some(ids) => ids,
        None => store
            .list_event_matches(event)
            .await?
            .into_iter()
            .filter(is_pending_submission)
            .map(|entity| entity.id)
            .collect(),
    };

    let batch = run_new_batch(state, store.as_ref(), &token, event, match_ids, requested_by).await?;
    info!(
        batch_id = %batch.id,
        event_id = %event.event_id,
        status = batch.status.as_str(),
        success = batch.count(OutcomeStatus::Success),
        failed = batch.count(OutcomeStatus::Failed),
        skipped = batch.count(OutcomeStatus::Skipped),
        "submission batch finished"
    );
    Ok(batch)
}

/// Resubmit the event's matches that currently show a submission error.
pub async fn retry_failed(
    state: &SharedState,
    event: EventKey,
    requested_by: Uuid,
) -> Result<RetrySummary, ServiceError> {
    let store = state.require_store().await?;
    let failed = store
        .list_event_matches(event)
        .await?
        .into_iter()
        .filter(|entity| {
            entity.submission.submission_error.is_some()
                && !entity.submission.submitted
                && entity.score_state == ScoreState::Official
        })
        .map(|entity| entity.id)
        .collect::<Vec<_>>();

    if failed.is_empty() {
        return Ok(RetrySummary {
            batch_id: None,
            retried: 0,
            success_count: 0,
            failure_count: 0,
        });
    }

    let token = acquire_token(state).await?;
    let retried = failed.len();
    let batch = run_new_batch(state, store.as_ref(), &token, event, failed, requested_by).await?;
    info!(batch_id = %batch.id, retried, "retried failed submissions");

    Ok(RetrySummary {
        batch_id: Some(batch.id),
        retried,
        success_count: batch.count(OutcomeStatus::Success),
        failure_count: batch.count(OutcomeStatus::Failed),
    })
}

pub async fn get_batch_status(
    state: &SharedState,
    batch_id: Uuid,
) -> Result<SubmissionBatchEntity, ServiceError> {
    let store = state.require_store().await?;
    store
        .find_batch(batch_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("batch {batch_id}")))
}

/// Retry every batch whose backoff has elapsed. Returns the number of batches processed.
pub async fn process_queue(state: &SharedState) -> Result<usize, ServiceError> {
    let store = state.require_store().await?;
    let config = &state.config().submission;
    let due = store
        .list_due_batches(state.clock().now(), config.max_retries)
        .await?;
    if due.is_empty() {
        return Ok(0);
    }

    let token = acquire_token(state).await?;
    let mut processed = 0;
    for mut batch in due {
        batch.status = BatchStatus::Processing;
        batch.updated_at = state.clock().now();
        store.save_batch(batch.clone()).await?;

        let pending = batch
            .match_ids
            .iter()
            .copied()
            .filter(|id| {
                batch
                    .outcome_for(*id)
                    .is_none_or(|outcome| outcome.status != OutcomeStatus::Success)
            })
            .collect::<Vec<_>>();

        for (index, match_id) in pending.into_iter().enumerate() {
            if index > 0 {
                courtesy_delay(config.delay_between_calls).await;
            }
            let outcome =
                attempt_isolated(state, store.as_ref(), &token, match_id, AttemptKind::Initial)
                    .await;
            record_outcome(&mut batch, outcome);
        }

        batch.retry_count += 1;
        finish_batch(state, &mut batch);
        store.save_batch(batch.clone()).await?;
        info!(
            batch_id = %batch.id,
            retry = batch.retry_count,
            status = batch.status.as_str(),
            "retried submission batch"
        );
        processed += 1;
    }

    Ok(processed)
}

/// Resubmit corrected results under their unchanged identifiers.
pub async fn process_corrections(state: &SharedState) -> Result<CorrectionSummary, ServiceError> {
    let store = state.require_store().await?;
    let candidates = store.list_correction_candidates().await?;
    let mut summary = CorrectionSummary {
        candidates: candidates.len(),
        ..CorrectionSummary::default()
    };
    if candidates.is_empty() {
        return Ok(summary);
    }

    let token = acquire_token(state).await?;
    let delay = state.config().submission.delay_between_calls;
    for (index, entity) in candidates.into_iter().enumerate() {
        if index > 0 {
            courtesy_delay(delay).await;
        }
        let outcome =
            attempt_isolated(state, store.as_ref(), &token, entity.id, AttemptKind::Correction)
                .await;
        match outcome.status {
            OutcomeStatus::Success => summary.corrected += 1,
            _ => summary.failed += 1,
        }
    }

    info!(
        candidates = summary.candidates,
        corrected = summary.corrected,
        failed = summary.failed,
        "correction pass finished"
    );
    Ok(summary)
}

/// Force a fresh token exchange and report whether it worked.
pub async fn test_connection(state: &SharedState) -> ConnectionReport {
    let rating = state.rating();
    rating.invalidate().await;
    let started = std::time::Instant::now();
    let result = rating.access_token().await;
    let elapsed_ms = started.elapsed().as_millis() as u64;

    match result {
        Ok(_) => ConnectionReport {
            ok: true,
            message: "token exchange succeeded".into(),
            elapsed_ms,
        },
        Err(err) => ConnectionReport {
            ok: false,
            message: err.to_string(),
            elapsed_ms,
        },
    }
}

/// Submit a single match outside any batch.
pub async fn test_submit_one(
    state: &SharedState,
    match_id: Uuid,
) -> Result<MatchSubmissionOutcome, ServiceError> {
    let store = state.require_store().await?;
    let token = acquire_token(state).await?;
    Ok(attempt_isolated(state, store.as_ref(), &token, match_id, AttemptKind::Initial).await)
}

async fn acquire_token(state: &SharedState) -> Result<String, ServiceError> {
    state
        .rating()
        .access_token()
        .await
        .map_err(ServiceError::RatingServiceUnavailable)
}

fn is_pending_submission(entity: &MatchEntity) -> bool {
    entity.score_state == ScoreState::Official
        && !entity.submission.submitted
        && entity.rating_eligible
}

async fn run_new_batch(
    state: &SharedState,
    store: &dyn ScoreStore,
    token: &str,
    event: EventKey,
    match_ids: Vec<Uuid>,
    requested_by: Uuid,
) -> Result<SubmissionBatchEntity, ServiceError> {
    let now = state.clock().now();
    let mut batch = SubmissionBatchEntity {
        id: Uuid::new_v4(),
        event,
        match_ids,
        results: Vec::new(),
        status: BatchStatus::Processing,
        retry_count: 0,
        next_retry_at: None,
        requested_by,
        created_at: now,
        updated_at: now,
    };
    store.save_batch(batch.clone()).await?;

    let delay = state.config().submission.delay_between_calls;
    for (index, match_id) in batch.match_ids.clone().into_iter().enumerate() {
        if index > 0 {
            courtesy_delay(delay).await;
        }
        let outcome = match store.find_match(match_id).await {
            Ok(Some(entity)) if entity.origin.event_key() != event => {
                outcome(state, match_id, OutcomeStatus::Skipped, None, "match belongs to another event")
            }
            Ok(_) => attempt_isolated(state, store, token, match_id, AttemptKind::Initial).await,
            Err(err) => outcome(state, match_id, OutcomeStatus::Failed, None, &err.to_string()),
        };
        record_outcome(&mut batch, outcome);
    }

    finish_batch(state, &mut batch);
    store.save_batch(batch.clone()).await?;
    Ok(batch)
}

/// Run one attempt, turning a panic into a failed outcome.
async fn attempt_isolated(
    state: &SharedState,
    store: &dyn ScoreStore,
    token: &str,
    match_id: Uuid,
    kind: AttemptKind,
) -> MatchSubmissionOutcome {
    let attempt = attempt_match(state, store, token, match_id, kind);
    match AssertUnwindSafe(attempt).catch_unwind().await {
        Ok(outcome) => outcome,
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| (*s).to_owned())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".into());
            error!(match_id = %match_id, %message, "submission attempt panicked");
            record_failure(state, store, match_id, format!("internal error: {message}")).await;
            outcome(
                state,
                match_id,
                OutcomeStatus::Failed,
                None,
                &format!("internal error: {message}"),
            )
        }
    }
}

async fn attempt_match(
    state: &SharedState,
    store: &dyn ScoreStore,
    token: &str,
    match_id: Uuid,
    kind: AttemptKind,
) -> MatchSubmissionOutcome {
    let entity = match store.find_match(match_id).await {
        Ok(Some(entity)) => entity,
        Ok(None) => {
            return outcome(state, match_id, OutcomeStatus::Failed, None, "match not found");
        }
        Err(err) => {
            return outcome(state, match_id, OutcomeStatus::Failed, None, &err.to_string());
        }
    };

    if let Some(reason) = skip_reason(&entity, kind) {
        return outcome(state, match_id, OutcomeStatus::Skipped, None, reason);
    }

    let players = entity
        .side_a
        .player_ids
        .iter()
        .chain(entity.side_b.player_ids.iter())
        .copied()
        .collect::<Vec<_>>();
    let profiles = match store.find_profiles(players).await {
        Ok(profiles) => profiles,
        Err(err) => {
            return outcome(state, match_id, OutcomeStatus::Failed, None, &err.to_string());
        }
    };

    let view = ScorableMatch::new(&entity, &profiles);
    let config = state.config();
    let formatted = match format_submission(
        &view,
        config.credentials.club_id.as_deref(),
        config.submission.min_game_score,
    ) {
        Ok(formatted) => formatted,
        Err(err) => {
            warn!(match_id = %match_id, error = %err, "match cannot be formatted for submission");
            record_failure(state, store, match_id, err.to_string()).await;
            return outcome(state, match_id, OutcomeStatus::Failed, None, &err.to_string());
        }
    };
    for warning in &formatted.warnings {
        warn!(match_id = %match_id, %warning, "submission warning");
    }

    let identifier = formatted.payload.identifier.clone();
    let submission_id = match state
        .rating()
        .api()
        .create_match(token.to_owned(), formatted.payload)
        .await
    {
        Ok(created) => created.id,
        Err(err) if kind == AttemptKind::Initial && is_duplicate_submission(&err) => {
            info!(match_id = %match_id, %identifier, "rating service already holds this match");
            entity
                .submission
                .submission_id
                .clone()
                .unwrap_or_else(|| identifier.clone())
        }
        Err(err) => {
            warn!(match_id = %match_id, error = %err, "match submission failed");
            record_failure(state, store, match_id, err.to_string()).await;
            return outcome(state, match_id, OutcomeStatus::Failed, None, &err.to_string());
        }
    };

    record_success(state, store, match_id, &submission_id, kind).await;
    outcome(
        state,
        match_id,
        OutcomeStatus::Success,
        Some(submission_id),
        match kind {
            AttemptKind::Initial => "submitted",
            AttemptKind::Correction => "correction submitted",
        },
    )
}

fn skip_reason(entity: &MatchEntity, kind: AttemptKind) -> Option<&'static str> {
    if !entity.rating_eligible {
        return Some("match is not eligible for rating");
    }
    if entity.score_state != ScoreState::Official {
        return Some("match has no official result");
    }
    match kind {
        AttemptKind::Initial if entity.submission.submitted => Some("already submitted"),
        AttemptKind::Correction
            if !entity.submission.needs_correction || entity.submission.correction_submitted =>
        {
            Some("no pending correction")
        }
        _ => None,
    }
}

/// The remote call already succeeded; a failed local write is logged and does not change the outcome.
async fn record_success(
    state: &SharedState,
    store: &dyn ScoreStore,
    match_id: Uuid,
    submission_id: &str,
    kind: AttemptKind,
) {
    let now = state.clock().now();
    let written = update_match(store, match_id, now, |entity| {
        let record = &mut entity.submission;
        record.submitted = true;
        record.submitted_at.get_or_insert(now);
        record.submission_id = Some(submission_id.to_owned());
        record.submission_error = None;
        record.attempt_count += 1;
        record.pending_submission = false;
        if kind == AttemptKind::Correction {
            record.needs_correction = false;
            record.correction_submitted = true;
        }
        Ok(())
    })
    .await;

    if let Err(err) = written {
        error!(
            match_id = %match_id,
            submission_id,
            error = %err,
            "match was submitted but recording the submission failed"
        );
    }
}

async fn record_failure(state: &SharedState, store: &dyn ScoreStore, match_id: Uuid, message: String) {
    let now = state.clock().now();
    let written = update_match(store, match_id, now, |entity| {
        let record = &mut entity.submission;
        record.submission_error = Some(message.clone());
        record.attempt_count += 1;
        record.pending_submission = !record.submitted;
        Ok(())
    })
    .await;

    if let Err(err) = written {
        warn!(match_id = %match_id, error = %err, "failed to record submission error");
    }
}

fn outcome(
    state: &SharedState,
    match_id: Uuid,
    status: OutcomeStatus,
    submission_id: Option<String>,
    message: &str,
) -> MatchSubmissionOutcome {
    MatchSubmissionOutcome {
        match_id,
        status,
        submission_id,
        message: Some(message.to_owned()),
        attempted_at: state.clock().now(),
    }
}

/// Keep one outcome per match, the latest attempt winning.
fn record_outcome(batch: &mut SubmissionBatchEntity, outcome: MatchSubmissionOutcome) {
    match batch
        .results
        .iter_mut()
        .find(|existing| existing.match_id == outcome.match_id)
    {
        Some(existing) => *existing = outcome,
        None => batch.results.push(outcome),
    }
}

fn finish_batch(state: &SharedState, batch: &mut SubmissionBatchEntity) {
    let now = state.clock().now();
    let config = &state.config().submission;
    batch.updated_at = now;

    if batch.count(OutcomeStatus::Failed) == 0 {
        batch.status = BatchStatus::Completed;
        batch.next_retry_at = None;
        return;
    }

    batch.status = BatchStatus::PartialFailure;
    batch.next_retry_at = (batch.retry_count < config.max_retries)
        .then(|| now + config.backoff_for(batch.retry_count + 1));
    if batch.next_retry_at.is_none() {
        warn!(
            batch_id = %batch.id,
            retries = batch.retry_count,
            "submission batch exhausted its retries; manual intervention needed"
        );
    }
}

async fn courtesy_delay(delay: Duration) {
    if !delay.is_zero() {
        sleep(delay).await;
    }
}

/// Deterministic identifier of `entity` on the rating service.
pub fn identifier_for(entity: &MatchEntity) -> String {
    let event = entity.origin.event_key();
    submission_identifier(event.event_type, event.event_id, entity.id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_rule_matches_conflicts_and_messages() {
        let conflict = RatingApiError::Rejected {
            endpoint: "match-create",
            status: 409,
            message: "conflict".into(),
        };
        let worded = RatingApiError::Rejected {
            endpoint: "match-create",
            status: 400,
            message: "Match identifier ALREADY EXISTS".into(),
        };
        let other = RatingApiError::Rejected {
            endpoint: "match-create",
            status: 400,
            message: "invalid player".into(),
        };
        assert!(is_duplicate_submission(&conflict));
        assert!(is_duplicate_submission(&worded));
        assert!(!is_duplicate_submission(&other));
        assert!(!is_duplicate_submission(&RatingApiError::Timeout {
            endpoint: "match-create"
        }));
    }
}
