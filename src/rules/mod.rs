// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Hide-rule engine: metric registry, condition evaluation and
//! deterministic sampling overrides.
//!
//! Rules are stored as JSON:
//!
//! ```json
//! {"match":"all","conditions":[{"metric":"distance_m","op":"lt","values":[20000]}],
//!  "action":{"type":"hide","override":{"one_in":10}}}
//! ```

pub mod eval;
pub mod metadata;
pub mod registry;

pub use eval::{allow_one_in, describe, evaluate, parse_rule_json, validate_rule, Evaluation};
pub use metadata::{build_metadata, Metadata, MetricMeta};
pub use registry::{
    ActivityFacts, EvalContext, Metric, MetricValue, OperatorSpec, Registry, StatsFacts,
    ValueMode, ValueType,
};

use serde::{Deserialize, Serialize};

/// Errors from parsing, validating or evaluating a rule.
#[derive(Debug, thiserror::Error)]
pub enum RuleError {
    #[error("invalid rule: {0}")]
    InvalidRule(String),

    #[error("invalid operator: {0}")]
    InvalidOperator(String),

    #[error("unknown metric: {0}")]
    UnknownMetric(String),

    #[error("malformed rule JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// How conditions combine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMode {
    #[default]
    All,
    Any,
}

/// A parsed hide rule.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    #[serde(default, rename = "match")]
    pub match_mode: MatchMode,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub action: Action,
}

/// One `(metric, op, values)` triple. Values stay raw JSON until they are
/// checked against the metric type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub metric: String,
    pub op: String,
    #[serde(default)]
    pub values: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    #[serde(default = "default_action_type", rename = "type")]
    pub action_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub r#override: Option<SamplingOverride>,
    /// Older rules spell the override as `allow`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow: Option<SamplingOverride>,
}

impl Default for Action {
    fn default() -> Self {
        Self {
            action_type: default_action_type(),
            r#override: None,
            allow: None,
        }
    }
}

impl Action {
    /// The effective `one_in`, preferring `override` over the legacy `allow`.
    /// A zero on either side means "unset".
    pub fn one_in(&self) -> Option<u64> {
        [self.r#override, self.allow]
            .into_iter()
            .flatten()
            .map(|o| o.one_in)
            .find(|&n| n > 0)
    }
}

fn default_action_type() -> String {
    "hide".to_string()
}

/// Unmute 1 in `one_in` otherwise-hidden activities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SamplingOverride {
    #[serde(default)]
    pub one_in: u64,
}
