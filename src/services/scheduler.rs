//! Background jobs: retry queue, correction pass and daily rating sync.

use std::{future::Future, time::Duration};

use tokio::{
    task::JoinHandle,
    time::{MissedTickBehavior, interval},
};
use tracing::{debug, info, warn};

use crate::{
    error::ServiceError,
    services::{rating_sync_service, submission_service},
    state::SharedState,
};

/// Spawn every periodic job. Handles are returned so callers can abort them on shutdown.
pub fn spawn_all(state: SharedState) -> Vec<JoinHandle<()>> {
    let submission = state.config().submission.clone();
    let sync = state.config().rating_sync.clone();

    vec![
        spawn_job(
            "submission_queue",
            submission.queue_interval,
            state.clone(),
            |state| async move { submission_service::process_queue(&state).await.map(|n| n as u64) },
        ),
        spawn_job(
            "correction_pass",
            submission.correction_interval,
            state.clone(),
            |state| async move {
                submission_service::process_corrections(&state)
                    .await
                    .map(|summary| summary.corrected as u64)
            },
        ),
        spawn_job("rating_sync", sync.interval, state, |state| async move {
            rating_sync_service::sync_all(&state)
                .await
                .map(|summary| summary.updated as u64)
        }),
    ]
}

/// Run `job` every `period`. Runs that overrun push the next tick back instead of bursting.
fn spawn_job<F, Fut>(
    name: &'static str,
    period: Duration,
    state: SharedState,
    job: F,
) -> JoinHandle<()>
where
    F: Fn(SharedState) -> Fut + Send + 'static,
    Fut: Future<Output = Result<u64, ServiceError>> + Send + 'static,
{
    tokio::spawn(async move {
        info!(job = name, period_secs = period.as_secs(), "starting scheduled job");
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; jobs start one period after boot.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            if state.is_degraded().await {
                debug!(job = name, "storage degraded; skipping run");
                continue;
            }
            match job(state.clone()).await {
                Ok(count) => debug!(job = name, count, "scheduled job finished"),
                Err(err) => warn!(job = name, error = %err, "scheduled job failed"),
            }
        }
    })
}
