// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Road-crossing detection after a stop.
//!
//! From the point where a stop ends we take a short forward path segment
//! (until 15 m are covered or 14 points are consumed) and test it against
//! every edge of every nearby road with `geo::Intersects`, which counts
//! collinear overlap and touching endpoints as a crossing. The first
//! intersecting road wins.

use super::haversine_meters;
use crate::models::{GpsPoint, Road};
use geo::{coord, Intersects, Line};

/// Forward distance that ends the path segment.
const PATH_DISTANCE_M: f64 = 15.0;
/// Maximum number of forward points consumed.
const PATH_MAX_POINTS: usize = 14;

/// Outcome of crossing detection. `Default` means "no crossing".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrossingResult {
    pub crossed: bool,
    pub road_name: String,
    /// Road class tag (residential, primary, ...)
    pub road_type: String,
}

/// Check whether the path leaving `stop_end_idx` crosses any of `roads`.
///
/// An out-of-range index, the last point, or an empty road list all yield
/// "no crossing".
pub fn detect_road_crossing(
    points: &[GpsPoint],
    stop_end_idx: usize,
    roads: &[Road],
) -> CrossingResult {
    if roads.is_empty() || stop_end_idx >= points.len().saturating_sub(1) {
        return CrossingResult::default();
    }

    let start = &points[stop_end_idx];
    let mut end_idx = stop_end_idx + 1;
    for (i, p) in points
        .iter()
        .enumerate()
        .skip(stop_end_idx + 1)
        .take(PATH_MAX_POINTS)
    {
        end_idx = i;
        if haversine_meters(start.lat, start.lon, p.lat, p.lon) >= PATH_DISTANCE_M {
            break;
        }
    }
    let end = &points[end_idx];

    let path = line(start.lon, start.lat, end.lon, end.lat);

    for road in roads {
        let crosses = road.geometry.windows(2).any(|edge| {
            let edge = line(edge[0].lon, edge[0].lat, edge[1].lon, edge[1].lat);
            path.intersects(&edge)
        });
        if crosses {
            return CrossingResult {
                crossed: true,
                road_name: road.name.clone(),
                road_type: road.highway.clone(),
            };
        }
    }

    CrossingResult::default()
}

/// Index of the first point, at or after `stop_start_secs` into the
/// activity, whose speed is above `threshold`.
pub fn find_stop_end_index(
    points: &[GpsPoint],
    stop_start_secs: f64,
    threshold: f64,
) -> Option<usize> {
    let first = points.first()?;
    points.iter().position(|p| {
        let elapsed = (p.time - first.time).num_milliseconds() as f64 / 1000.0;
        elapsed >= stop_start_secs && p.speed > threshold
    })
}

/// Planar line with x = longitude, y = latitude.
fn line(x1: f64, y1: f64, x2: f64, y2: f64) -> Line<f64> {
    Line::new(coord! { x: x1, y: y1 }, coord! { x: x2, y: y2 })
}
