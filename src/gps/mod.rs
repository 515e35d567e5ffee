// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! GPS trace analysis.
//!
//! Pure functions over ordered point sequences:
//! - Stop detection (low-speed intervals)
//! - Road-crossing detection right after a stop
//! - Derived effort scoring
//!
//! Nothing here performs I/O. "Nothing found" is always an empty or
//! zero-valued result, never an error.

pub mod crossing;
pub mod effort;
pub mod stops;

pub use crossing::{detect_road_crossing, find_stop_end_index, CrossingResult};
pub use effort::{compute_effort, median, EFFORT_VERSION};
pub use stops::{detect_stops, Stop, StopOptions};

use geo::{Distance, Haversine, Point};

/// Great-circle distance between two coordinates in meters.
pub fn haversine_meters(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    Haversine.distance(Point::new(lon1, lat1), Point::new(lon2, lat2))
}
