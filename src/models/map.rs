// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Map feature types returned by the map feature provider.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of point of interest near a coordinate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureType {
    TrafficLight,
    RoadCrossing,
    Cafe,
    Restaurant,
    FastFood,
    Bar,
    /// Any amenity tag we don't classify
    Other(String),
}

impl fmt::Display for FeatureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeatureType::TrafficLight => f.write_str("traffic_light"),
            FeatureType::RoadCrossing => f.write_str("road_crossing"),
            FeatureType::Cafe => f.write_str("cafe"),
            FeatureType::Restaurant => f.write_str("restaurant"),
            FeatureType::FastFood => f.write_str("fast_food"),
            FeatureType::Bar => f.write_str("bar"),
            FeatureType::Other(tag) => f.write_str(tag),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    pub feature_type: FeatureType,
    pub name: String,
}

/// A located point of interest with its raw OSM tags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Poi {
    pub feature: Feature,
    pub lat: f64,
    pub lon: f64,
    pub tags: std::collections::HashMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLon {
    pub lat: f64,
    pub lon: f64,
}

/// A road polyline from OSM.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Road {
    pub id: i64,
    pub name: String,
    /// Road class: primary, secondary, residential, ...
    pub highway: String,
    pub geometry: Vec<LatLon>,
}

/// Bounding box in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    pub south: f64,
    pub west: f64,
    pub north: f64,
    pub east: f64,
}

impl fmt::Display for BBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:.6},{:.6},{:.6},{:.6}",
            self.south, self.west, self.north, self.east
        )
    }
}
