// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Derived per-activity statistics.
//!
//! Stats and stops are recomputed in full on every analysis and replace
//! whatever was stored before.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Aggregate stop statistics for one activity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StopStats {
    #[serde(default)]
    pub stop_count: i64,
    #[serde(default)]
    pub stop_total_seconds: i64,
    #[serde(default)]
    pub traffic_light_stop_count: i64,
    /// Derived effort score (see `gps::effort`)
    #[serde(default)]
    pub effort_score: f64,
    #[serde(default)]
    pub effort_version: i64,
    pub updated_at: DateTime<Utc>,
}

impl Default for StopStats {
    fn default() -> Self {
        Self {
            stop_count: 0,
            stop_total_seconds: 0,
            traffic_light_stop_count: 0,
            effort_score: 0.0,
            effort_version: 0,
            updated_at: DateTime::<Utc>::UNIX_EPOCH,
        }
    }
}

/// One detected stop as persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityStop {
    /// Position within the activity's stop list
    pub seq: i64,
    /// Position of the first stopped sample
    pub lat: f64,
    pub lon: f64,
    /// Seconds from the activity's first sample
    pub start_seconds: f64,
    pub duration_seconds: i64,
    pub has_traffic_light: bool,
    pub has_road_crossing: bool,
    /// Name of the crossed road, empty when none
    pub crossing_road: String,
}
