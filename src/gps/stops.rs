// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Stop detection.
//!
//! A two-state machine (moving / stopped) over consecutive samples. A
//! sample at or below the speed threshold enters (or extends) a stop.
//! When movement resumes, or the trace ends, the interval is emitted if it
//! lasted at least `min_duration`. Duration runs from the first stopped
//! sample to the last stopped sample, and the stop is located at the
//! first stopped sample. Speeds are trusted as given.

use crate::models::GpsPoint;
use chrono::{DateTime, Duration, Utc};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StopOptions {
    /// Speeds at or below this (m/s) count as stopped.
    pub speed_threshold: f64,
    pub min_duration: Duration,
}

impl Default for StopOptions {
    fn default() -> Self {
        Self {
            speed_threshold: 0.5,
            min_duration: Duration::seconds(60),
        }
    }
}

/// A detected low-speed interval.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Stop {
    pub lat: f64,
    pub lon: f64,
    /// Timestamp of the first stopped sample
    pub start_time: DateTime<Utc>,
    pub duration: Duration,
}

/// Detect stops in an ordered point sequence.
pub fn detect_stops(points: &[GpsPoint], opts: &StopOptions) -> Vec<Stop> {
    let mut stops = Vec::new();
    let mut stop_start: Option<&GpsPoint> = None;
    let mut last_stopped: Option<&GpsPoint> = None;

    for point in points {
        if point.speed <= opts.speed_threshold {
            if stop_start.is_none() {
                stop_start = Some(point);
            }
            last_stopped = Some(point);
        } else if let (Some(start), Some(last)) = (stop_start.take(), last_stopped.take()) {
            push_if_long_enough(&mut stops, start, last, opts);
        }
    }

    if let (Some(start), Some(last)) = (stop_start, last_stopped) {
        push_if_long_enough(&mut stops, start, last, opts);
    }

    stops
}

fn push_if_long_enough(stops: &mut Vec<Stop>, start: &GpsPoint, last: &GpsPoint, opts: &StopOptions) {
    let duration = last.time - start.time;
    if duration >= opts.min_duration {
        stops.push(Stop {
            lat: start.lat,
            lon: start.lon,
            start_time: start.time,
            duration,
        });
    }
}
