// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Data models for the application.

pub mod activity;
pub mod job;
pub mod map;
pub mod rule;
pub mod stats;
pub mod webhook;

pub use activity::{Activity, GpsPoint};
pub use job::{Job, JobStatus, NewJob, QueueEntry};
pub use map::{BBox, Feature, FeatureType, LatLon, Poi, Road};
pub use rule::HideRule;
pub use stats::{ActivityStop, StopStats};
pub use webhook::WebhookEvent;
