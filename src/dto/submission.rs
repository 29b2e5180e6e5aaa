//! DTO definitions for the rating-service relay.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    dao::models::{
        BatchStatus, EventKey, EventType, MatchSubmissionOutcome, OutcomeStatus,
        SubmissionBatchEntity,
    },
    dto::format_system_time,
    services::submission_service::{ConnectionReport, RetrySummary},
};

/// Bulk submission of an event's official results.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct SubmitMatchesRequest {
    pub event_type: EventType,
    pub event_id: Uuid,
    /// Explicit selection; omitted means every official, unsubmitted, eligible match.
    #[serde(default)]
    #[validate(length(min = 1, max = 500))]
    pub match_ids: Option<Vec<Uuid>>,
}

impl SubmitMatchesRequest {
    pub fn event(&self) -> EventKey {
        EventKey {
            event_type: self.event_type,
            event_id: self.event_id,
        }
    }
}

/// Summary of a finished bulk submission.
#[derive(Debug, Serialize, ToSchema)]
pub struct SubmitMatchesResponse {
    pub batch_id: Uuid,
    pub status: BatchStatus,
    pub success_count: usize,
    pub failure_count: usize,
    pub skipped_count: usize,
}

impl From<&SubmissionBatchEntity> for SubmitMatchesResponse {
    fn from(batch: &SubmissionBatchEntity) -> Self {
        Self {
            batch_id: batch.id,
            status: batch.status,
            success_count: batch.count(OutcomeStatus::Success),
            failure_count: batch.count(OutcomeStatus::Failed),
            skipped_count: batch.count(OutcomeStatus::Skipped),
        }
    }
}

/// Resubmission of an event's failed matches.
#[derive(Debug, Deserialize, ToSchema)]
pub struct RetryFailedRequest {
    pub event_type: EventType,
    pub event_id: Uuid,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RetryFailedResponse {
    /// Absent when nothing needed a retry.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_id: Option<Uuid>,
    pub retried: usize,
    pub success_count: usize,
    pub failure_count: usize,
}

impl From<RetrySummary> for RetryFailedResponse {
    fn from(summary: RetrySummary) -> Self {
        Self {
            batch_id: summary.batch_id,
            retried: summary.retried,
            success_count: summary.success_count,
            failure_count: summary.failure_count,
        }
    }
}

/// Per-match result inside a batch.
#[derive(Debug, Serialize, ToSchema)]
pub struct OutcomeDto {
    pub match_id: Uuid,
    pub status: OutcomeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub submission_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub attempted_at: String,
}

impl From<&MatchSubmissionOutcome> for OutcomeDto {
    fn from(outcome: &MatchSubmissionOutcome) -> Self {
        Self {
            match_id: outcome.match_id,
            status: outcome.status,
            submission_id: outcome.submission_id.clone(),
            message: outcome.message.clone(),
            attempted_at: format_system_time(outcome.attempted_at),
        }
    }
}

/// Stored history of one batch.
#[derive(Debug, Serialize, ToSchema)]
pub struct BatchResponse {
    pub id: Uuid,
    pub event_type: EventType,
    pub event_id: Uuid,
    pub status: BatchStatus,
    pub match_ids: Vec<Uuid>,
    pub results: Vec<OutcomeDto>,
    pub retry_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_retry_at: Option<String>,
    pub requested_by: Uuid,
    pub created_at: String,
    pub updated_at: String,
}

impl From<&SubmissionBatchEntity> for BatchResponse {
    fn from(batch: &SubmissionBatchEntity) -> Self {
        Self {
            id: batch.id,
            event_type: batch.event.event_type,
            event_id: batch.event.event_id,
            status: batch.status,
            match_ids: batch.match_ids.clone(),
            results: batch.results.iter().map(OutcomeDto::from).collect(),
            retry_count: batch.retry_count,
            next_retry_at: batch.next_retry_at.map(format_system_time),
            requested_by: batch.requested_by,
            created_at: format_system_time(batch.created_at),
            updated_at: format_system_time(batch.updated_at),
        }
    }
}

/// Outcome of the token-exchange test.
#[derive(Debug, Serialize, ToSchema)]
pub struct ConnectionTestResponse {
    pub ok: bool,
    pub message: String,
    pub elapsed_ms: u64,
}

impl From<ConnectionReport> for ConnectionTestResponse {
    fn from(report: ConnectionReport) -> Self {
        Self {
            ok: report.ok,
            message: report.message,
            elapsed_ms: report.elapsed_ms,
        }
    }
}

/// Single-match diagnostic submission.
#[derive(Debug, Deserialize, ToSchema)]
pub struct TestSubmitRequest {
    pub match_id: Uuid,
}
