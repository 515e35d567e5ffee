// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Registry description for rule-builder UIs.

use super::registry::{OperatorSpec, Registry, ValueType};
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Serialize)]
pub struct MetricMeta {
    pub id: &'static str,
    pub label: &'static str,
    pub description: &'static str,
    pub unit: &'static str,
    pub example: &'static str,
    #[serde(rename = "type")]
    pub value_type: ValueType,
    #[serde(rename = "enum", skip_serializing_if = "Vec::is_empty")]
    pub enum_values: Vec<&'static str>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Metadata {
    pub metrics: Vec<MetricMeta>,
    pub operators: BTreeMap<ValueType, Vec<OperatorSpec>>,
}

/// Metrics sorted by id, plus the operators for each value type.
pub fn build_metadata(registry: &Registry) -> Metadata {
    let mut metrics: Vec<MetricMeta> = registry
        .metrics()
        .map(|m| MetricMeta {
            id: m.id,
            label: m.label,
            description: m.description,
            unit: m.unit,
            example: m.example,
            value_type: m.value_type,
            enum_values: m.enum_values.to_vec(),
        })
        .collect();
    metrics.sort_by_key(|m| m.id);

    let operators = [ValueType::Number, ValueType::Enum]
        .into_iter()
        .map(|t| (t, registry.operators(t).to_vec()))
        .collect();

    Metadata { metrics, operators }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_is_sorted_and_serializes() {
        let metadata = build_metadata(&Registry::default());
        let ids: Vec<_> = metadata.metrics.iter().map(|m| m.id).collect();
        let mut sorted = ids.clone();
        sorted.sort_unstable();
        assert_eq!(ids, sorted);

        let json = serde_json::to_value(&metadata).unwrap();
        assert_eq!(json["metrics"][0]["id"], "activity_type");
        assert_eq!(json["metrics"][0]["type"], "enum");
        assert_eq!(json["metrics"][0]["enum"][0], "Ride");
        assert!(json["metrics"][1].get("enum").is_none());
        assert_eq!(json["operators"]["enum"][2]["value_count"], -1);
        assert_eq!(json["operators"]["number"][6]["value_mode"], "range");
    }
}
