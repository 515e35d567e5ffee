// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Work queue and backfill job models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Retry,
    Failed,
    Completed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Retry => "retry",
            JobStatus::Failed => "failed",
            JobStatus::Completed => "completed",
        }
    }

    /// Terminal states are never claimed again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Failed | JobStatus::Completed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(JobStatus::Queued),
            "running" => Ok(JobStatus::Running),
            "retry" => Ok(JobStatus::Retry),
            "failed" => Ok(JobStatus::Failed),
            "completed" => Ok(JobStatus::Completed),
            other => Err(format!("unknown job status: {}", other)),
        }
    }
}

/// A resumable unit of bulk work.
///
/// `payload` holds the immutable parameters and `cursor` the mutable
/// progress. Both are JSON interpreted only by the handler for `job_type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: i64,
    pub job_type: String,
    pub status: JobStatus,
    pub payload: String,
    pub cursor: String,
    pub attempts: i64,
    pub max_attempts: i64,
    pub last_error: String,
    pub next_run_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Parameters for creating a job. Unset fields take store defaults.
#[derive(Debug, Clone, Default)]
pub struct NewJob {
    pub job_type: String,
    pub payload: Option<String>,
    pub cursor: Option<String>,
    pub max_attempts: Option<i64>,
    pub next_run_at: Option<DateTime<Utc>>,
}

impl NewJob {
    pub fn new(job_type: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            job_type: job_type.into(),
            payload: Some(payload.into()),
            ..Default::default()
        }
    }
}

/// One pending entry in the per-activity queue.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueEntry {
    pub id: i64,
    pub activity_id: i64,
    pub enqueued_at: DateTime<Utc>,
}
