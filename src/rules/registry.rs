// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Metric registry and operator table.
//!
//! Both are built once at startup and shared read-only (`Arc<Registry>`).

use crate::models::{Activity, StopStats};
use chrono::Timelike;
use serde::Serialize;
use std::collections::HashMap;

/// Declared type of a metric's value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    Number,
    Enum,
}

/// A resolved metric value.
#[derive(Debug, Clone, PartialEq)]
pub enum MetricValue {
    Number(f64),
    Enum(String),
}

/// Activity fields visible to rules.
#[derive(Debug, Clone, Default)]
pub struct ActivityFacts {
    pub id: i64,
    pub activity_type: String,
    pub name: String,
    /// Unix seconds; 0 when unknown.
    pub start_unix: i64,
    pub distance_m: f64,
    pub moving_time_s: i64,
}

/// Stop statistics visible to rules.
#[derive(Debug, Clone, Copy, Default)]
pub struct StatsFacts {
    pub stop_count: i64,
    pub stop_total_seconds: i64,
    pub traffic_light_stop_count: i64,
}

/// Everything a metric resolver may look at.
#[derive(Debug, Clone, Default)]
pub struct EvalContext {
    pub activity: ActivityFacts,
    pub stats: StatsFacts,
}

impl EvalContext {
    pub fn new(activity: &Activity, stats: &StopStats) -> Self {
        Self {
            activity: ActivityFacts {
                id: activity.id,
                activity_type: activity.activity_type.clone(),
                name: activity.name.clone(),
                start_unix: activity.start_unix(),
                distance_m: activity.distance_m,
                moving_time_s: activity.moving_time_s,
            },
            stats: StatsFacts {
                stop_count: stats.stop_count,
                stop_total_seconds: stats.stop_total_seconds,
                traffic_light_stop_count: stats.traffic_light_stop_count,
            },
        }
    }
}

/// A named, typed value derived from an activity and its stats.
#[derive(Debug, Clone)]
pub struct Metric {
    pub id: &'static str,
    pub label: &'static str,
    pub description: &'static str,
    pub unit: &'static str,
    pub example: &'static str,
    pub value_type: ValueType,
    pub enum_values: &'static [&'static str],
    pub resolve: fn(&EvalContext) -> MetricValue,
}

/// How a UI should collect an operator's values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueMode {
    Single,
    Range,
    List,
}

/// An operator legal for one value type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OperatorSpec {
    pub id: &'static str,
    pub label: &'static str,
    /// 1, 2, or -1 for "one or more".
    pub value_count: i32,
    pub value_mode: ValueMode,
}

const fn op(
    id: &'static str,
    label: &'static str,
    value_count: i32,
    value_mode: ValueMode,
) -> OperatorSpec {
    OperatorSpec {
        id,
        label,
        value_count,
        value_mode,
    }
}

const NUMBER_OPERATORS: &[OperatorSpec] = &[
    op("eq", "=", 1, ValueMode::Single),
    op("neq", "!=", 1, ValueMode::Single),
    op("lt", "<", 1, ValueMode::Single),
    op("lte", "<=", 1, ValueMode::Single),
    op("gt", ">", 1, ValueMode::Single),
    op("gte", ">=", 1, ValueMode::Single),
    op("between", "between", 2, ValueMode::Range),
];

const ENUM_OPERATORS: &[OperatorSpec] = &[
    op("eq", "is", 1, ValueMode::Single),
    op("neq", "is not", 1, ValueMode::Single),
    op("in", "in", -1, ValueMode::List),
    op("not_in", "not in", -1, ValueMode::List),
];

const ACTIVITY_TYPES: &[&str] = &[
    "Ride",
    "Run",
    "Walk",
    "Hike",
    "Swim",
    "Workout",
    "VirtualRide",
    "EBikeRide",
    "GravelRide",
    "TrailRun",
    "Rowing",
    "NordicSki",
];

fn start_hour(ctx: &EvalContext) -> MetricValue {
    if ctx.activity.start_unix == 0 {
        return MetricValue::Number(0.0);
    }
    let hour = crate::time_utils::from_unix(ctx.activity.start_unix).hour();
    MetricValue::Number(f64::from(hour))
}

fn default_metrics() -> Vec<Metric> {
    vec![
        Metric {
            id: "distance_m",
            label: "Distance",
            description: "Total distance in meters",
            unit: "m",
            example: "20000",
            value_type: ValueType::Number,
            enum_values: &[],
            resolve: |ctx| MetricValue::Number(ctx.activity.distance_m),
        },
        Metric {
            id: "moving_time_s",
            label: "Moving time",
            description: "Moving time in seconds",
            unit: "s",
            example: "3600",
            value_type: ValueType::Number,
            enum_values: &[],
            resolve: |ctx| MetricValue::Number(ctx.activity.moving_time_s as f64),
        },
        Metric {
            id: "activity_type",
            label: "Activity type",
            description: "Strava activity type",
            unit: "",
            example: "Ride",
            value_type: ValueType::Enum,
            enum_values: ACTIVITY_TYPES,
            resolve: |ctx| MetricValue::Enum(ctx.activity.activity_type.clone()),
        },
        Metric {
            id: "start_hour",
            label: "Start hour",
            description: "Hour of day activity started (0-23, UTC)",
            unit: "h",
            example: "22",
            value_type: ValueType::Number,
            enum_values: &[],
            resolve: start_hour,
        },
        Metric {
            id: "stop_count",
            label: "Stop count",
            description: "Number of detected stops",
            unit: "",
            example: "5",
            value_type: ValueType::Number,
            enum_values: &[],
            resolve: |ctx| MetricValue::Number(ctx.stats.stop_count as f64),
        },
        Metric {
            id: "stop_total_seconds",
            label: "Stop total time",
            description: "Total stop time in seconds",
            unit: "s",
            example: "600",
            value_type: ValueType::Number,
            enum_values: &[],
            resolve: |ctx| MetricValue::Number(ctx.stats.stop_total_seconds as f64),
        },
        Metric {
            id: "traffic_light_stop_count",
            label: "Traffic light stops",
            description: "Stops near traffic lights",
            unit: "",
            example: "3",
            value_type: ValueType::Number,
            enum_values: &[],
            resolve: |ctx| MetricValue::Number(ctx.stats.traffic_light_stop_count as f64),
        },
    ]
}

/// Immutable set of metrics plus the operator table.
#[derive(Debug, Clone)]
pub struct Registry {
    metrics: HashMap<&'static str, Metric>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::from_metrics(default_metrics())
    }
}

impl Registry {
    pub fn from_metrics(metrics: Vec<Metric>) -> Self {
        Self {
            metrics: metrics.into_iter().map(|m| (m.id, m)).collect(),
        }
    }

    pub fn metric(&self, id: &str) -> Option<&Metric> {
        self.metrics.get(id)
    }

    pub fn metrics(&self) -> impl Iterator<Item = &Metric> {
        self.metrics.values()
    }

    /// Operators legal for a value type.
    pub fn operators(&self, value_type: ValueType) -> &'static [OperatorSpec] {
        match value_type {
            ValueType::Number => NUMBER_OPERATORS,
            ValueType::Enum => ENUM_OPERATORS,
        }
    }

    pub fn operator(&self, value_type: ValueType, id: &str) -> Option<&'static OperatorSpec> {
        self.operators(value_type).iter().find(|o| o.id == id)
    }
}
