// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Parsing, validation, evaluation and description of hide rules.

use super::registry::{EvalContext, MetricValue, OperatorSpec, Registry, ValueType};
use super::{Condition, MatchMode, Rule, RuleError};
use serde::Deserialize;
use serde_json::Value;

/// Result of evaluating one rule against one activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Evaluation {
    pub matched: bool,
    pub hide: bool,
}

/// Parse a stored rule, filling in defaults. Anything after the JSON object
/// is rejected.
pub fn parse_rule_json(raw: &str) -> Result<Rule, RuleError> {
    let mut de = serde_json::Deserializer::from_str(raw);
    let mut rule = Rule::deserialize(&mut de)?;
    de.end()
        .map_err(|_| RuleError::InvalidRule("trailing data".to_string()))?;

    if rule.action.action_type.is_empty() {
        rule.action.action_type = "hide".to_string();
    }
    Ok(rule)
}

/// Check a rule against the registry before it is stored or evaluated.
pub fn validate_rule(rule: &Rule, registry: &Registry) -> Result<(), RuleError> {
    if rule.conditions.is_empty() {
        return Err(invalid("at least one condition required"));
    }
    if rule.action.action_type != "hide" {
        return Err(invalid(format!(
            "unsupported action {}",
            rule.action.action_type
        )));
    }

    let action = &rule.action;
    if let (Some(a), Some(b)) = (action.r#override, action.allow) {
        if a.one_in > 0 && b.one_in > 0 && a.one_in != b.one_in {
            return Err(invalid("override.one_in and allow.one_in disagree"));
        }
    }
    if let Some(n) = action.one_in() {
        if n < 2 {
            return Err(invalid("override.one_in must be >= 2"));
        }
    }

    for cond in &rule.conditions {
        check_condition(cond, registry)?;
    }
    Ok(())
}

/// Evaluate `rule` for the activity in `ctx`.
///
/// `all` stops at the first false condition, `any` at the first true one.
/// A matched rule hides the activity unless its sampling override lets this
/// particular `(rule_id, activity)` pair through.
pub fn evaluate(
    rule: &Rule,
    registry: &Registry,
    ctx: &EvalContext,
    rule_id: i64,
) -> Result<Evaluation, RuleError> {
    let match_all = rule.match_mode == MatchMode::All;
    let mut matched = match_all;

    for cond in &rule.conditions {
        let value_type = check_condition(cond, registry)?;
        let metric = registry
            .metric(&cond.metric)
            .ok_or_else(|| RuleError::UnknownMetric(cond.metric.clone()))?;
        let value = (metric.resolve)(ctx);
        let hit = eval_condition(value_type, &cond.op, &value, &cond.values)?;

        if match_all && !hit {
            matched = false;
            break;
        }
        if !match_all && hit {
            matched = true;
            break;
        }
    }

    if !matched {
        return Ok(Evaluation::default());
    }
    if rule.action.action_type != "hide" {
        return Err(invalid(format!(
            "unsupported action {}",
            rule.action.action_type
        )));
    }

    let hide = match rule.action.one_in() {
        Some(n) if n >= 2 => !allow_one_in(rule_id, ctx.activity.id, n),
        _ => true,
    };
    Ok(Evaluation {
        matched: true,
        hide,
    })
}

/// Human-readable rendering of a rule for lists and logs.
pub fn describe(rule: &Rule, registry: &Registry) -> String {
    let joiner = match rule.match_mode {
        MatchMode::All => " AND ",
        MatchMode::Any => " OR ",
    };

    let parts: Vec<String> = rule
        .conditions
        .iter()
        .map(|cond| {
            let Some(metric) = registry.metric(&cond.metric) else {
                return cond.metric.clone();
            };
            let label = registry
                .operator(metric.value_type, &cond.op)
                .map(|o| o.label)
                .unwrap_or(cond.op.as_str());
            let values = format_values(metric.value_type, metric.unit, &cond.values);
            format!("{} {} {}", metric.label, label, values)
        })
        .collect();

    let mut description = parts.join(joiner);
    if let Some(n) = rule.action.one_in().filter(|&n| n >= 2) {
        description.push_str(&format!(" · override: unmute 1 in {n}"));
    }
    description
}

/// Deterministic 1-in-`n` sample keyed on `(rule_id, activity_id)`.
pub fn allow_one_in(rule_id: i64, activity_id: i64, n: u64) -> bool {
    if n <= 1 {
        return true;
    }
    fnv1a_64(format!("{rule_id}:{activity_id}").as_bytes()) % n == 0
}

fn fnv1a_64(bytes: &[u8]) -> u64 {
    const OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    bytes.iter().fold(OFFSET_BASIS, |hash, &b| {
        (hash ^ u64::from(b)).wrapping_mul(PRIME)
    })
}

fn invalid(msg: impl Into<String>) -> RuleError {
    RuleError::InvalidRule(msg.into())
}

/// Metric exists, operator is legal for its type, values fit arity and type.
fn check_condition(cond: &Condition, registry: &Registry) -> Result<ValueType, RuleError> {
    let metric = registry
        .metric(&cond.metric)
        .ok_or_else(|| RuleError::UnknownMetric(cond.metric.clone()))?;
    let operator = registry
        .operator(metric.value_type, &cond.op)
        .ok_or_else(|| RuleError::InvalidOperator(cond.op.clone()))?;
    check_values(metric.value_type, operator, &cond.values)?;
    Ok(metric.value_type)
}

fn check_values(
    value_type: ValueType,
    operator: &OperatorSpec,
    values: &[Value],
) -> Result<(), RuleError> {
    let count = values.len();
    match operator.value_count {
        1 if count != 1 => {
            return Err(invalid(format!(
                "operator {} expects one value",
                operator.id
            )))
        }
        2 if count != 2 => {
            return Err(invalid(format!(
                "operator {} expects two values",
                operator.id
            )))
        }
        -1 if count < 1 => {
            return Err(invalid(format!(
                "operator {} expects at least one value",
                operator.id
            )))
        }
        _ => {}
    }

    match value_type {
        ValueType::Number if values.iter().any(|v| as_number(v).is_none()) => {
            Err(invalid("numeric value expected"))
        }
        ValueType::Enum if values.iter().any(|v| as_text(v).is_none()) => {
            Err(invalid("string value expected"))
        }
        _ => Ok(()),
    }
}

/// JSON numbers or numeric strings.
fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Strings, or numbers in their textual form.
fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn parse_numbers(values: &[Value]) -> Result<Vec<f64>, RuleError> {
    values
        .iter()
        .map(|v| as_number(v).ok_or_else(|| invalid("invalid number")))
        .collect()
}

fn parse_texts(values: &[Value]) -> Result<Vec<String>, RuleError> {
    values
        .iter()
        .map(|v| as_text(v).ok_or_else(|| invalid("invalid string")))
        .collect()
}

fn eval_condition(
    value_type: ValueType,
    op: &str,
    metric: &MetricValue,
    raw: &[Value],
) -> Result<bool, RuleError> {
    match (value_type, metric) {
        (ValueType::Number, MetricValue::Number(x)) => eval_number(op, *x, &parse_numbers(raw)?),
        (ValueType::Enum, MetricValue::Enum(s)) => eval_enum(op, s, &parse_texts(raw)?),
        _ => Err(invalid("metric resolved to the wrong value type")),
    }
}

fn eval_number(op: &str, x: f64, values: &[f64]) -> Result<bool, RuleError> {
    let first = *values
        .first()
        .ok_or_else(|| invalid(format!("operator {op} has no values")))?;
    let hit = match op {
        "eq" => x == first,
        "neq" => x != first,
        "lt" => x < first,
        "lte" => x <= first,
        "gt" => x > first,
        "gte" => x >= first,
        "between" => {
            let second = *values
                .get(1)
                .ok_or_else(|| invalid("operator between expects two values"))?;
            let (lo, hi) = if first > second {
                (second, first)
            } else {
                (first, second)
            };
            x >= lo && x <= hi
        }
        other => return Err(RuleError::InvalidOperator(other.to_string())),
    };
    Ok(hit)
}

fn eval_enum(op: &str, actual: &str, values: &[String]) -> Result<bool, RuleError> {
    let actual = actual.to_lowercase();
    let mut hits = values.iter().map(|v| v.to_lowercase() == actual);
    let hit = match op {
        "eq" => hits.next().unwrap_or(false),
        "neq" => !hits.next().unwrap_or(true),
        "in" => hits.any(|h| h),
        "not_in" => !hits.any(|h| h),
        other => return Err(RuleError::InvalidOperator(other.to_string())),
    };
    Ok(hit)
}

fn format_values(value_type: ValueType, unit: &str, values: &[Value]) -> String {
    match value_type {
        ValueType::Number => match parse_numbers(values) {
            Ok(nums) => nums
                .iter()
                .map(|&n| format_number(n, unit))
                .collect::<Vec<_>>()
                .join(" and "),
            Err(_) => "?".to_string(),
        },
        ValueType::Enum => match parse_texts(values) {
            Ok(texts) => texts.join(", "),
            Err(_) => "?".to_string(),
        },
    }
}

fn format_number(value: f64, unit: &str) -> String {
    let text = if value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
        format!("{}", value as i64)
    } else {
        format!("{value:.2}")
    };
    if unit.is_empty() {
        text
    } else {
        format!("{text} {unit}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(id: i64, activity_type: &str, distance_m: f64) -> EvalContext {
        let mut ctx = EvalContext::default();
        ctx.activity.id = id;
        ctx.activity.activity_type = activity_type.to_string();
        ctx.activity.distance_m = distance_m;
        ctx.activity.moving_time_s = 3600;
        ctx.activity.start_unix = 1_700_000_000;
        ctx
    }

    fn parse_valid(raw: &str) -> Rule {
        let rule = parse_rule_json(raw).unwrap();
        validate_rule(&rule, &Registry::default()).unwrap();
        rule
    }

    #[test]
    fn test_parse_fills_defaults() {
        let rule =
            parse_rule_json(r#"{"conditions":[{"metric":"stop_count","op":"gt","values":[3]}]}"#)
                .unwrap();
        assert_eq!(rule.match_mode, MatchMode::All);
        assert_eq!(rule.action.action_type, "hide");

        let rule = parse_rule_json(
            r#"{"conditions":[{"metric":"stop_count","op":"gt","values":[3]}],"action":{"type":""}}"#,
        )
        .unwrap();
        assert_eq!(rule.action.action_type, "hide");
    }

    #[test]
    fn test_parse_rejects_trailing_data() {
        let err = parse_rule_json(r#"{"conditions":[]} {"extra":true}"#).unwrap_err();
        assert!(matches!(err, RuleError::InvalidRule(_)));

        let err = parse_rule_json("{not json").unwrap_err();
        assert!(matches!(err, RuleError::Json(_)));
    }

    #[test]
    fn test_validate_rule() {
        let registry = Registry::default();
        parse_valid(
            r#"{"match":"all","conditions":[{"metric":"distance_m","op":"lt","values":[20000]}],"action":{"type":"hide"}}"#,
        );

        let between_one = parse_rule_json(
            r#"{"conditions":[{"metric":"distance_m","op":"between","values":[100]}]}"#,
        )
        .unwrap();
        assert!(matches!(
            validate_rule(&between_one, &registry),
            Err(RuleError::InvalidRule(_))
        ));

        let unknown = parse_rule_json(r#"{"conditions":[{"metric":"elevation","op":"gt","values":[1]}]}"#)
            .unwrap();
        assert!(matches!(
            validate_rule(&unknown, &registry),
            Err(RuleError::UnknownMetric(_))
        ));

        let bad_op = parse_rule_json(
            r#"{"conditions":[{"metric":"activity_type","op":"lt","values":["Ride"]}]}"#,
        )
        .unwrap();
        assert!(matches!(
            validate_rule(&bad_op, &registry),
            Err(RuleError::InvalidOperator(_))
        ));

        let not_a_number = parse_rule_json(
            r#"{"conditions":[{"metric":"distance_m","op":"lt","values":["far"]}]}"#,
        )
        .unwrap();
        assert!(validate_rule(&not_a_number, &registry).is_err());

        let empty = parse_rule_json(r#"{"conditions":[]}"#).unwrap();
        assert!(validate_rule(&empty, &registry).is_err());

        let mute = parse_rule_json(
            r#"{"conditions":[{"metric":"stop_count","op":"gt","values":[1]}],"action":{"type":"mute"}}"#,
        )
        .unwrap();
        assert!(validate_rule(&mute, &registry).is_err());
    }

    #[test]
    fn test_validate_override_bounds() {
        let registry = Registry::default();
        parse_valid(
            r#"{"conditions":[{"metric":"activity_type","op":"eq","values":["Workout"]}],"action":{"type":"hide","override":{"one_in":10}}}"#,
        );

        let one = parse_rule_json(
            r#"{"conditions":[{"metric":"activity_type","op":"eq","values":["Workout"]}],"action":{"override":{"one_in":1}}}"#,
        )
        .unwrap();
        assert!(validate_rule(&one, &registry).is_err());

        let conflict = parse_rule_json(
            r#"{"conditions":[{"metric":"activity_type","op":"eq","values":["Workout"]}],"action":{"type":"hide","override":{"one_in":10},"allow":{"one_in":12}}}"#,
        )
        .unwrap();
        assert!(validate_rule(&conflict, &registry).is_err());

        parse_valid(
            r#"{"conditions":[{"metric":"activity_type","op":"eq","values":["Workout"]}],"action":{"override":{"one_in":10},"allow":{"one_in":10}}}"#,
        );
    }

    #[test]
    fn test_zero_override_falls_back_to_allow() {
        let registry = Registry::default();
        let rule = parse_valid(
            r#"{"conditions":[{"metric":"activity_type","op":"eq","values":["Workout"]}],"action":{"type":"hide","override":{"one_in":0},"allow":{"one_in":10}}}"#,
        );

        assert_eq!(rule.action.one_in(), Some(10));
        assert!(describe(&rule, &registry).ends_with("override: unmute 1 in 10"));
    }

    #[test]
    fn test_distance_rule_scenario() {
        let registry = Registry::default();
        let rule = parse_valid(
            r#"{"match":"all","conditions":[{"metric":"distance_m","op":"lt","values":[20000]}],"action":{"type":"hide"}}"#,
        );

        let short = evaluate(&rule, &registry, &ctx(1, "Ride", 15000.0), 1).unwrap();
        assert_eq!(
            short,
            Evaluation {
                matched: true,
                hide: true
            }
        );

        let long = evaluate(&rule, &registry, &ctx(1, "Ride", 25000.0), 1).unwrap();
        assert!(!long.matched);
        assert!(!long.hide);
    }

    #[test]
    fn test_between_bounds_are_unordered() {
        let registry = Registry::default();
        let forward = parse_valid(
            r#"{"conditions":[{"metric":"distance_m","op":"between","values":[10,20]}]}"#,
        );
        let reversed = parse_valid(
            r#"{"conditions":[{"metric":"distance_m","op":"between","values":[20,10]}]}"#,
        );

        for distance in [5.0, 10.0, 15.0, 20.0, 25.0] {
            let a = evaluate(&forward, &registry, &ctx(1, "Run", distance), 1).unwrap();
            let b = evaluate(&reversed, &registry, &ctx(1, "Run", distance), 1).unwrap();
            assert_eq!(a, b, "distance {distance}");
        }
        let inside = evaluate(&reversed, &registry, &ctx(1, "Run", 15.0), 1).unwrap();
        assert!(inside.matched);
    }

    #[test]
    fn test_enum_comparisons_ignore_case() {
        let registry = Registry::default();
        let rule = parse_valid(
            r#"{"conditions":[{"metric":"activity_type","op":"in","values":["ride","RUN"]}]}"#,
        );
        assert!(evaluate(&rule, &registry, &ctx(1, "Ride", 0.0), 1).unwrap().matched);
        assert!(evaluate(&rule, &registry, &ctx(1, "run", 0.0), 1).unwrap().matched);
        assert!(!evaluate(&rule, &registry, &ctx(1, "Swim", 0.0), 1).unwrap().matched);

        let not_in = parse_valid(
            r#"{"conditions":[{"metric":"activity_type","op":"not_in","values":["Ride"]}]}"#,
        );
        assert!(!evaluate(&not_in, &registry, &ctx(1, "RIDE", 0.0), 1).unwrap().matched);
    }

    #[test]
    fn test_numeric_strings_are_numbers() {
        let registry = Registry::default();
        let rule = parse_valid(
            r#"{"conditions":[{"metric":"distance_m","op":"gte","values":[" 1000 "]}]}"#,
        );
        assert!(evaluate(&rule, &registry, &ctx(1, "Ride", 1000.0), 1).unwrap().matched);
    }

    #[test]
    fn test_any_short_circuits_on_first_true() {
        let registry = Registry::default();
        let rule = parse_valid(
            r#"{"match":"any","conditions":[{"metric":"distance_m","op":"lt","values":[100]},{"metric":"activity_type","op":"eq","values":["Ride"]}]}"#,
        );
        assert!(evaluate(&rule, &registry, &ctx(1, "Ride", 5000.0), 1).unwrap().matched);
        assert!(!evaluate(&rule, &registry, &ctx(1, "Run", 5000.0), 1).unwrap().matched);
    }

    #[test]
    fn test_unvalidated_rule_errors_on_evaluate() {
        let registry = Registry::default();
        let rule = parse_rule_json(
            r#"{"conditions":[{"metric":"distance_m","op":"approx","values":[1]}]}"#,
        )
        .unwrap();
        assert!(matches!(
            evaluate(&rule, &registry, &ctx(1, "Ride", 0.0), 1),
            Err(RuleError::InvalidOperator(_))
        ));
    }

    #[test]
    fn test_override_hides_inverse_of_sample() {
        let registry = Registry::default();
        let rule = parse_valid(
            r#"{"match":"all","conditions":[{"metric":"distance_m","op":"lt","values":[20000]},{"metric":"activity_type","op":"eq","values":["Ride"]}],"action":{"type":"hide","override":{"one_in":10}}}"#,
        );
        let result = evaluate(&rule, &registry, &ctx(42, "Ride", 15000.0), 7).unwrap();
        assert!(result.matched);
        assert_eq!(result.hide, !allow_one_in(7, 42, 10));

        let legacy = parse_valid(
            r#"{"conditions":[{"metric":"activity_type","op":"eq","values":["Workout"]}],"action":{"type":"hide","allow":{"one_in":10}}}"#,
        );
        let result = evaluate(&legacy, &registry, &ctx(55, "Workout", 0.0), 9).unwrap();
        assert!(result.matched);
        assert_eq!(result.hide, !allow_one_in(9, 55, 10));
    }

    #[test]
    fn test_allow_one_in_is_deterministic_and_near_rate() {
        for id in 0..50 {
            assert_eq!(allow_one_in(3, id, 7), allow_one_in(3, id, 7));
        }
        assert!(allow_one_in(3, 1, 1));

        let allowed = (0..10_000).filter(|&id| allow_one_in(11, id, 10)).count();
        assert!((700..=1300).contains(&allowed), "allowed = {allowed}");
    }

    #[test]
    fn test_fnv1a_known_vectors() {
        assert_eq!(fnv1a_64(b""), 0xcbf2_9ce4_8422_2325);
        assert_eq!(fnv1a_64(b"a"), 0xaf63_dc4c_8601_ec8c);
    }

    #[test]
    fn test_describe() {
        let registry = Registry::default();
        let rule = parse_rule_json(
            r#"{"match":"any","conditions":[{"metric":"distance_m","op":"between","values":[1000,2500.5]},{"metric":"activity_type","op":"in","values":["Ride","Run"]},{"metric":"stop_count","op":"gt","values":[3]},{"metric":"mystery","op":"eq","values":[1]}],"action":{"override":{"one_in":10}}}"#,
        )
        .unwrap();

        assert_eq!(
            describe(&rule, &registry),
            "Distance between 1000 m and 2500.50 m OR Activity type in Ride, Run OR Stop count > 3 OR mystery · override: unmute 1 in 10"
        );
    }
}
