// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Derived effort score.

/// Bumped whenever the scoring formula changes so stored scores can be told apart.
pub const EFFORT_VERSION: i64 = 1;

/// Reference heart rate used when the owner has no history.
pub const DEFAULT_HR_REF: f64 = 120.0;

const HR_FACTOR_MIN: f64 = 0.6;
const HR_FACTOR_MAX: f64 = 2.5;

const SPORT_FACTORS: &[(&str, f64)] = &[
    ("swim", 2.2),
    ("openwaterswim", 2.2),
    ("poolswim", 2.2),
    ("run", 2.0),
    ("trailrun", 2.0),
    ("virtualrun", 2.0),
    ("treadmill", 2.0),
    ("ride", 1.6),
    ("virtualride", 1.6),
    ("mountainbikeride", 1.6),
    ("gravelride", 1.6),
    ("ebikeride", 1.5),
    ("walk", 1.0),
    ("hike", 1.8),
    ("workout", 1.7),
    ("weighttraining", 1.6),
    ("strengthtraining", 1.6),
    ("crossfit", 1.7),
    ("hiit", 1.8),
    ("rowing", 1.7),
    ("rowergometer", 1.7),
    ("kayaking", 1.5),
    ("canoeing", 1.5),
    ("alpineski", 1.6),
    ("nordicski", 1.6),
    ("backcountryski", 1.7),
    ("snowboard", 1.6),
    ("snowshoe", 1.6),
    ("yoga", 0.7),
    ("pilates", 0.7),
    ("elliptical", 1.5),
    ("stairstepper", 1.7),
    ("stairclimber", 1.7),
];

fn normalize_activity_type(activity_type: &str) -> String {
    activity_type
        .chars()
        .filter(|c| !matches!(c, ' ' | '_' | '-'))
        .flat_map(char::to_lowercase)
        .collect()
}

/// Multiplier for an activity type; unknown types score as walking.
pub fn sport_factor(activity_type: &str) -> f64 {
    let key = normalize_activity_type(activity_type);
    SPORT_FACTORS
        .iter()
        .find(|(name, _)| *name == key)
        .map(|(_, factor)| *factor)
        .unwrap_or(1.0)
}

/// Effort score for one activity.
///
/// `avg_hr <= 0` means no heart-rate data. `hr_ref <= 0` falls back to
/// [`DEFAULT_HR_REF`].
pub fn compute_effort(moving_time_s: i64, activity_type: &str, avg_hr: f64, hr_ref: f64) -> f64 {
    if moving_time_s <= 0 {
        return 0.0;
    }
    let minutes = moving_time_s as f64 / 60.0;

    let hr_factor = if avg_hr > 0.0 {
        let reference = if hr_ref > 0.0 { hr_ref } else { DEFAULT_HR_REF };
        (avg_hr / reference).powi(2).clamp(HR_FACTOR_MIN, HR_FACTOR_MAX)
    } else {
        1.0
    };

    minutes * sport_factor(activity_type) * hr_factor
}

/// Median of a sample, `None` when empty.
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}
