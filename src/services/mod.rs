// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - business logic layer.

pub mod ingest;
pub mod jobs;
pub mod maps;
pub mod overpass;
pub mod pipeline;
pub mod scheduler;
pub mod strava;
pub mod worker;

pub use ingest::Ingestor;
pub use jobs::{JobRunner, JOB_TYPE_SYNC_ACTIVITIES_SINCE, JOB_TYPE_SYNC_LATEST};
pub use maps::MapFeatureProvider;
pub use overpass::OverpassClient;
pub use pipeline::{PipelineProcessor, Processor, RulesProcessor, StopStatsProcessor};
pub use scheduler::{run_job_runner, run_queue_worker};
pub use strava::{ActivityFeed, StravaClient};
pub use worker::{PollOutcome, QueueWorker, RateLimitBackoff};
