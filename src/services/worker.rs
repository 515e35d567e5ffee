// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Per-activity queue worker.
//!
//! Each poll claims at most one queue entry, runs it through a
//! [`Processor`] and records the outcome. The caller owns the sleeping;
//! see `services::scheduler`.

use crate::db::SqliteDb;
use crate::error::Result;
use crate::services::pipeline::Processor;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

const BACKOFF_INITIAL: Duration = Duration::from_secs(15);
const BACKOFF_MAX: Duration = Duration::from_secs(600);

/// How long a claimed entry stays invisible to other workers.
pub const DEFAULT_LEASE: Duration = Duration::from_secs(600);

/// Result of one queue poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// Nothing was due.
    Empty,
    Processed,
    /// Processing failed; the entry was moved to the back of the queue.
    Failed,
    /// Upstream rate limit; the entry was released and the caller should
    /// wait this long before polling again.
    RateLimited { wait: Duration },
}

/// Exponential backoff for upstream rate limiting.
///
/// Starts at 15s and doubles up to 10 minutes. A provider hint replaces
/// the computed delay but the doubling still advances.
#[derive(Debug, Clone)]
pub struct RateLimitBackoff {
    next: Duration,
}

impl Default for RateLimitBackoff {
    fn default() -> Self {
        Self {
            next: BACKOFF_INITIAL,
        }
    }
}

impl RateLimitBackoff {
    pub fn next_delay(&mut self, hint: Option<Duration>) -> Duration {
        let computed = self.next;
        self.next = (self.next * 2).min(BACKOFF_MAX);
        match hint {
            Some(hint) if !hint.is_zero() => hint,
            _ => computed,
        }
    }

    pub fn reset(&mut self) {
        self.next = BACKOFF_INITIAL;
    }
}

/// Drains the activity queue one entry at a time.
pub struct QueueWorker {
    db: SqliteDb,
    processor: Arc<dyn Processor>,
    lease: Duration,
    backoff: RateLimitBackoff,
}

impl QueueWorker {
    pub fn new(db: SqliteDb, processor: Arc<dyn Processor>) -> Self {
        Self {
            db,
            processor,
            lease: DEFAULT_LEASE,
            backoff: RateLimitBackoff::default(),
        }
    }

    pub fn with_lease(mut self, lease: Duration) -> Self {
        self.lease = lease;
        self
    }

    /// Claim and process the oldest due entry.
    ///
    /// Only store failures are returned as errors; processing failures
    /// are logged and folded into the outcome.
    pub async fn process_next(&mut self) -> Result<PollOutcome> {
        let lease = chrono::Duration::from_std(self.lease).unwrap_or(chrono::Duration::minutes(10));
        let Some(entry) = self.db.dequeue_activity(Utc::now(), lease).await? else {
            return Ok(PollOutcome::Empty);
        };

        match self.processor.process(entry.activity_id).await {
            Ok(()) => {
                self.db.mark_processed(entry.id).await?;
                self.backoff.reset();
                tracing::info!(
                    queue_id = entry.id,
                    activity_id = entry.activity_id,
                    "Processed activity"
                );
                Ok(PollOutcome::Processed)
            }
            Err(e) if e.is_rate_limited() => {
                self.db.release_claim(entry.id).await?;
                let wait = self.backoff.next_delay(e.rate_limit_backoff());
                tracing::warn!(
                    activity_id = entry.activity_id,
                    wait_secs = wait.as_secs(),
                    error = %e,
                    "Rate limited, backing off"
                );
                Ok(PollOutcome::RateLimited { wait })
            }
            Err(e) => {
                let new_id = self.db.requeue_to_tail(&entry).await?;
                tracing::error!(
                    queue_id = entry.id,
                    requeued_as = new_id,
                    activity_id = entry.activity_id,
                    error = %e,
                    "Activity processing failed"
                );
                Ok(PollOutcome::Failed)
            }
        }
    }
}
