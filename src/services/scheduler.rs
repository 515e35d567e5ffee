// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Background polling loops.
//!
//! The queue worker and the job runner poll independently. Both sleep
//! only when a poll found nothing to do (or after a rate limit) and both
//! stop promptly when the shared token is cancelled.

use crate::services::jobs::JobRunner;
use crate::services::worker::{PollOutcome, QueueWorker};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Sleep for `duration` unless cancelled first. Returns false on cancel.
pub(crate) async fn sleep_or_cancel(duration: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}

/// Drain the activity queue until cancelled.
pub async fn run_queue_worker(
    mut worker: QueueWorker,
    poll_interval: Duration,
    cancel: CancellationToken,
) {
    tracing::info!(poll_ms = poll_interval.as_millis() as u64, "Queue worker started");

    while !cancel.is_cancelled() {
        let pause = match worker.process_next().await {
            Ok(PollOutcome::Processed) => None,
            // A failed entry went to the back of the queue; pausing keeps a
            // queue of only broken entries from spinning.
            Ok(PollOutcome::Empty) | Ok(PollOutcome::Failed) => Some(poll_interval),
            Ok(PollOutcome::RateLimited { wait }) => Some(wait),
            Err(e) => {
                tracing::error!(error = %e, "Queue poll failed");
                Some(poll_interval)
            }
        };

        if let Some(pause) = pause {
            if !sleep_or_cancel(pause, &cancel).await {
                break;
            }
        }
    }

    tracing::info!("Queue worker stopped");
}

/// Advance backfill jobs until cancelled.
pub async fn run_job_runner(runner: JobRunner, poll_interval: Duration, cancel: CancellationToken) {
    tracing::info!(poll_ms = poll_interval.as_millis() as u64, "Job runner started");

    while !cancel.is_cancelled() {
        let worked = match runner.process_next().await {
            Ok(worked) => worked,
            Err(e) => {
                tracing::error!(error = %e, "Job poll failed");
                false
            }
        };

        if !worked && !sleep_or_cancel(poll_interval, &cancel).await {
            break;
        }
    }

    tracing::info!("Job runner stopped");
}
