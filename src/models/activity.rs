// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Activity and GPS point models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stored activity record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    /// Upstream activity ID (also the primary key)
    pub id: i64,
    /// Owning user
    pub user_id: i64,
    /// Activity type (Ride, Run, Hike, etc.)
    pub activity_type: String,
    /// Activity name/title
    pub name: String,
    /// Start date/time
    pub start_time: DateTime<Utc>,
    pub description: String,
    /// Distance in meters
    pub distance_m: f64,
    /// Moving time in seconds
    pub moving_time_s: i64,
    /// Average power in watts (0 when unknown)
    pub average_power: f64,
    /// Average heart rate in bpm (0 when unknown)
    pub average_heart_rate: f64,
    /// Upstream visibility setting ("everyone", "only_me", ...)
    pub visibility: String,
    pub is_private: bool,
    pub hide_from_home: bool,
    /// Set only by rule evaluation
    pub hidden_by_rule: bool,
}

impl Activity {
    /// Start time as unix seconds.
    pub fn start_unix(&self) -> i64 {
        self.start_time.timestamp()
    }
}

/// A single GPS sample. Samples are ordered by sequence number and
/// assumed to have non-decreasing timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GpsPoint {
    pub lat: f64,
    pub lon: f64,
    pub time: DateTime<Utc>,
    /// Instantaneous speed in m/s
    pub speed: f64,
}
