// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Resumable backfill jobs.
//!
//! A job is claimed atomically from the store, advanced by one step, and
//! written back as queued (more to do), retry, failed or completed. The
//! payload and cursor of each job type are decoded only by its handler.

use crate::db::SqliteDb;
use crate::error::{AppError, Result};
use crate::models::Job;
use crate::services::ingest::Ingestor;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const JOB_TYPE_SYNC_ACTIVITIES_SINCE: &str = "sync_activities_since";
pub const JOB_TYPE_SYNC_LATEST: &str = "sync_latest";

/// Default window after which a `running` job may be reclaimed.
pub const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(600);

const DEFAULT_PER_PAGE: u32 = 100;
/// Pause between pages of one backfill.
const DEFAULT_PAGE_DELAY: Duration = Duration::from_secs(2);
const RETRY_BASE: Duration = Duration::from_secs(30);
const RETRY_MAX: Duration = Duration::from_secs(600);
const RATE_LIMIT_MIN: Duration = Duration::from_secs(300);

/// Parameters of a `sync_activities_since` job.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncSincePayload {
    #[serde(default)]
    pub user_id: i64,
    /// Only activities starting after this time; 0 means everything
    #[serde(default)]
    pub after_unix: i64,
    #[serde(default)]
    pub per_page: u32,
}

/// Progress of a `sync_activities_since` job.
///
/// Pages are walked newest first. `before_unix` is the upper time bound
/// of the current window and `page` the page within that window.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncSinceCursor {
    #[serde(default)]
    pub page: u32,
    #[serde(default)]
    pub enqueued: u64,
    #[serde(default)]
    pub before_unix: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncLatestCursor {
    pub enqueued: u64,
}

/// What a handler wants done with its job.
enum StepOutcome {
    /// More work remains; run again at the given time.
    Continue { cursor: String, next_run_at: DateTime<Utc> },
    Completed { cursor: String },
    Failed { cursor: String, error: String },
    /// Transient failure; the cursor is kept as it was.
    Retry(AppError),
}

/// Claims and advances backfill jobs.
pub struct JobRunner {
    db: SqliteDb,
    ingestor: Ingestor,
    stale_after: Duration,
    page_delay: Duration,
}

impl JobRunner {
    pub fn new(db: SqliteDb, ingestor: Ingestor) -> Self {
        Self {
            db,
            ingestor,
            stale_after: DEFAULT_STALE_AFTER,
            page_delay: DEFAULT_PAGE_DELAY,
        }
    }

    pub fn with_stale_after(mut self, stale_after: Duration) -> Self {
        self.stale_after = stale_after;
        self
    }

    pub fn with_page_delay(mut self, page_delay: Duration) -> Self {
        self.page_delay = page_delay;
        self
    }

    /// Claim one due job and advance it. Returns false if nothing was due.
    pub async fn process_next(&self) -> Result<bool> {
        let stale = chrono::Duration::from_std(self.stale_after)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("invalid stale window: {}", e)))?;
        let Some(job) = self.db.claim_job(Utc::now(), stale).await? else {
            return Ok(false);
        };

        tracing::info!(
            job_id = job.id,
            job_type = %job.job_type,
            attempt = job.attempts,
            "Claimed job"
        );

        if job.max_attempts > 0 && job.attempts > job.max_attempts {
            self.db
                .mark_job_failed(job.id, &job.cursor, "max attempts exceeded")
                .await?;
            tracing::error!(job_id = job.id, attempts = job.attempts, "Job exhausted its attempts");
            return Ok(true);
        }

        let outcome = match job.job_type.as_str() {
            JOB_TYPE_SYNC_ACTIVITIES_SINCE => self.sync_activities_since(&job).await,
            JOB_TYPE_SYNC_LATEST => self.sync_latest().await,
            _ => StepOutcome::Failed {
                cursor: job.cursor.clone(),
                error: "unknown job type".to_string(),
            },
        };

        self.record(&job, outcome).await?;
        Ok(true)
    }

    async fn record(&self, job: &Job, outcome: StepOutcome) -> Result<()> {
        match outcome {
            StepOutcome::Continue {
                cursor,
                next_run_at,
            } => {
                self.db.mark_job_queued(job.id, &cursor, next_run_at).await?;
                tracing::debug!(job_id = job.id, cursor = %cursor, "Job advanced");
            }
            StepOutcome::Completed { cursor } => {
                self.db.mark_job_completed(job.id, &cursor).await?;
                tracing::info!(job_id = job.id, cursor = %cursor, "Job completed");
            }
            StepOutcome::Failed { cursor, error } => {
                self.db.mark_job_failed(job.id, &cursor, &error).await?;
                tracing::error!(job_id = job.id, error = %error, "Job failed");
            }
            StepOutcome::Retry(err) => {
                let delay = retry_delay_for(job.attempts, &err);
                let next_run_at = Utc::now()
                    + chrono::Duration::from_std(delay).unwrap_or(chrono::Duration::minutes(10));
                self.db
                    .mark_job_retry(job.id, &job.cursor, &err.to_string(), next_run_at)
                    .await?;
                tracing::warn!(
                    job_id = job.id,
                    attempt = job.attempts,
                    delay_secs = delay.as_secs(),
                    error = %err,
                    "Job will retry"
                );
            }
        }
        Ok(())
    }

    async fn sync_activities_since(&self, job: &Job) -> StepOutcome {
        let payload: SyncSincePayload = match serde_json::from_str(&job.payload) {
            Ok(p) => p,
            Err(e) => {
                return StepOutcome::Failed {
                    cursor: job.cursor.clone(),
                    error: format!("invalid payload: {}", e),
                }
            }
        };

        let mut cursor: SyncSinceCursor = match serde_json::from_str(&job.cursor) {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!(job_id = job.id, error = %e, "Invalid job cursor, restarting");
                SyncSinceCursor::default()
            }
        };

        let now = Utc::now().timestamp();
        if cursor.page == 0 {
            cursor.page = 1;
        }
        if cursor.before_unix <= 0 {
            cursor.before_unix = now;
        }
        let per_page = if payload.per_page == 0 {
            DEFAULT_PER_PAGE
        } else {
            payload.per_page
        };
        let after = (payload.after_unix > 0).then_some(payload.after_unix);

        let page = match self
            .ingestor
            .feed()
            .list_activities(after, Some(cursor.before_unix), cursor.page, per_page)
            .await
        {
            Ok(page) => page,
            Err(e) => return StepOutcome::Retry(e),
        };

        if page.is_empty() {
            return StepOutcome::Completed {
                cursor: encode(&cursor),
            };
        }

        let mut oldest = cursor.before_unix;
        for summary in &page {
            if let Err(e) = self.db.enqueue_activity(summary.id).await {
                return StepOutcome::Retry(e);
            }
            cursor.enqueued += 1;
            oldest = oldest.min(summary.start_date.timestamp());
        }

        // A page whose oldest start equals the window bound can't shrink the
        // window, so step to the next page instead.
        if oldest == cursor.before_unix {
            cursor.page += 1;
        } else {
            cursor.before_unix = oldest;
            cursor.page = 1;
        }

        tracing::info!(
            job_id = job.id,
            user_id = payload.user_id,
            fetched = page.len(),
            enqueued = cursor.enqueued,
            before_unix = cursor.before_unix,
            "Backfill page enqueued"
        );

        if payload.after_unix > 0 && cursor.before_unix <= payload.after_unix {
            return StepOutcome::Completed {
                cursor: encode(&cursor),
            };
        }

        StepOutcome::Continue {
            cursor: encode(&cursor),
            next_run_at: Utc::now()
                + chrono::Duration::from_std(self.page_delay).unwrap_or(chrono::Duration::seconds(2)),
        }
    }

    async fn sync_latest(&self) -> StepOutcome {
        match self.ingestor.sync_latest_activity().await {
            Ok(enqueued) => StepOutcome::Completed {
                cursor: encode(&SyncLatestCursor {
                    enqueued: enqueued as u64,
                }),
            },
            Err(e) => StepOutcome::Retry(e),
        }
    }
}

fn encode<T: Serialize>(cursor: &T) -> String {
    serde_json::to_string(cursor).unwrap_or_else(|_| "{}".to_string())
}

/// Backoff after a failed attempt: 30s doubling per attempt, capped at 10 min.
pub fn retry_delay(attempts: i64) -> Duration {
    let doublings = attempts.saturating_sub(1).clamp(0, 16) as u32;
    (RETRY_BASE * (1u32 << doublings)).min(RETRY_MAX)
}

fn retry_delay_for(attempts: i64, err: &AppError) -> Duration {
    let delay = retry_delay(attempts);
    if !err.is_rate_limited() {
        return delay;
    }
    match err.rate_limit_backoff() {
        Some(hint) if !hint.is_zero() => hint,
        _ => delay.max(RATE_LIMIT_MIN),
    }
}
