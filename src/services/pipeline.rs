// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Per-activity processing pipeline.
//!
//! Handles the core workflow:
//! 1. Ensure the activity and its points are stored (fetch if missing)
//! 2. Detect stops, traffic lights and road crossings; score effort
//! 3. Evaluate the owner's hide rules
//!
//! Every stage fully replaces what it derived before, so processing the
//! same activity twice leaves the same stored state.

use crate::db::SqliteDb;
use crate::error::{AppError, Result};
use crate::gps::{
    compute_effort, detect_road_crossing, detect_stops, find_stop_end_index, median, StopOptions,
    EFFORT_VERSION,
};
use crate::gps::effort::DEFAULT_HR_REF;
use crate::models::{ActivityStop, FeatureType, StopStats};
use crate::rules::{self, EvalContext, Registry};
use crate::services::ingest::Ingestor;
use crate::services::maps::MapFeatureProvider;
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;

/// Road search radius around a stop, in meters.
const ROAD_RADIUS_M: f64 = 30.0;
/// Heart-rate samples used for the owner's reference heart rate.
const HR_HISTORY: i64 = 50;

/// Something that processes one activity id.
#[async_trait]
pub trait Processor: Send + Sync {
    async fn process(&self, activity_id: i64) -> Result<()>;
}

/// Detects stops and recomputes the stop statistics.
#[derive(Clone)]
pub struct StopStatsProcessor {
    db: SqliteDb,
    maps: Option<Arc<dyn MapFeatureProvider>>,
    options: StopOptions,
}

impl StopStatsProcessor {
    /// Without a map provider stops are still detected, but none are
    /// classified as traffic lights or road crossings.
    pub fn new(
        db: SqliteDb,
        maps: Option<Arc<dyn MapFeatureProvider>>,
        options: StopOptions,
    ) -> Self {
        Self { db, maps, options }
    }

    async fn reference_heart_rate(&self, user_id: i64, before: chrono::DateTime<Utc>) -> Result<f64> {
        let history = self.db.recent_heart_rates(user_id, before, HR_HISTORY).await?;
        Ok(median(&history).unwrap_or(DEFAULT_HR_REF))
    }
}

#[async_trait]
impl Processor for StopStatsProcessor {
    async fn process(&self, activity_id: i64) -> Result<()> {
        let activity = self
            .db
            .get_activity(activity_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("activity {}", activity_id)))?;
        let points = self.db.load_activity_points(activity_id).await?;

        let stops = detect_stops(&points, &self.options);
        let first_time = points.first().map(|p| p.time);

        let mut stats = StopStats {
            stop_count: stops.len() as i64,
            ..Default::default()
        };
        let mut rows = Vec::with_capacity(stops.len());

        // All network lookups happen before the store transaction below.
        for (seq, stop) in stops.iter().enumerate() {
            let start_seconds = first_time
                .map(|t| (stop.start_time - t).num_milliseconds() as f64 / 1000.0)
                .unwrap_or(0.0);
            let duration_seconds = stop.duration.num_seconds();
            stats.stop_total_seconds += duration_seconds;

            let mut has_light = false;
            let mut crossing_road = None;

            if let Some(maps) = &self.maps {
                let features = maps.nearby_features(stop.lat, stop.lon).await?;
                has_light = features
                    .iter()
                    .any(|f| f.feature_type == FeatureType::TrafficLight);

                if !has_light {
                    if let Some(end_idx) =
                        find_stop_end_index(&points, start_seconds, self.options.speed_threshold)
                    {
                        let roads = maps
                            .fetch_nearby_roads(stop.lat, stop.lon, ROAD_RADIUS_M)
                            .await?;
                        let crossing = detect_road_crossing(&points, end_idx, &roads);
                        if crossing.crossed {
                            crossing_road = Some(crossing.road_name);
                        }
                    }
                }
            }

            if has_light {
                stats.traffic_light_stop_count += 1;
            }

            rows.push(ActivityStop {
                seq: seq as i64,
                lat: stop.lat,
                lon: stop.lon,
                start_seconds,
                duration_seconds,
                has_traffic_light: has_light,
                has_road_crossing: crossing_road.is_some(),
                crossing_road: crossing_road.unwrap_or_default(),
            });
        }

        let hr_ref = if activity.average_heart_rate > 0.0 {
            self.reference_heart_rate(activity.user_id, activity.start_time)
                .await?
        } else {
            DEFAULT_HR_REF
        };
        stats.effort_score = compute_effort(
            activity.moving_time_s,
            &activity.activity_type,
            activity.average_heart_rate,
            hr_ref,
        );
        stats.effort_version = EFFORT_VERSION;
        stats.updated_at = Utc::now();

        self.db
            .replace_activity_analysis(activity_id, &stats, &rows)
            .await?;

        tracing::info!(
            activity_id,
            stops = stats.stop_count,
            stop_seconds = stats.stop_total_seconds,
            traffic_lights = stats.traffic_light_stop_count,
            effort = stats.effort_score,
            "Computed stop stats"
        );
        Ok(())
    }
}

/// Evaluates the owner's hide rules and stores the decision.
#[derive(Clone)]
pub struct RulesProcessor {
    db: SqliteDb,
    registry: Arc<Registry>,
}

impl RulesProcessor {
    pub fn new(db: SqliteDb, registry: Arc<Registry>) -> Self {
        Self { db, registry }
    }
}

#[async_trait]
impl Processor for RulesProcessor {
    async fn process(&self, activity_id: i64) -> Result<()> {
        let activity = self
            .db
            .get_activity(activity_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("activity {}", activity_id)))?;
        let stats = self
            .db
            .get_activity_stats(activity_id)
            .await?
            .unwrap_or_default();
        let hide_rules = self.db.list_hide_rules(activity.user_id).await?;
        let ctx = EvalContext::new(&activity, &stats);

        let mut hide = false;
        for row in hide_rules.iter().filter(|r| r.enabled) {
            let outcome = rules::parse_rule_json(&row.condition)
                .and_then(|rule| {
                    rules::validate_rule(&rule, &self.registry)?;
                    Ok(rule)
                })
                .and_then(|rule| rules::evaluate(&rule, &self.registry, &ctx, row.id));

            match outcome {
                Ok(eval) if eval.matched && eval.hide => {
                    tracing::debug!(activity_id, rule_id = row.id, "Hide rule matched");
                    hide = true;
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(rule_id = row.id, error = %e, "Skipping invalid hide rule");
                }
            }
        }

        self.db
            .update_activity_hidden_by_rule(activity_id, hide)
            .await?;
        if hide != activity.hidden_by_rule {
            tracing::info!(activity_id, hidden = hide, "Hidden-by-rule changed");
        }
        Ok(())
    }
}

/// Ingest, then stats, then rules.
#[derive(Clone)]
pub struct PipelineProcessor {
    ingest: Option<Ingestor>,
    stats: StopStatsProcessor,
    rules: RulesProcessor,
}

impl PipelineProcessor {
    /// With no ingestor, activities must already be in the store.
    pub fn new(ingest: Option<Ingestor>, stats: StopStatsProcessor, rules: RulesProcessor) -> Self {
        Self {
            ingest,
            stats,
            rules,
        }
    }
}

#[async_trait]
impl Processor for PipelineProcessor {
    async fn process(&self, activity_id: i64) -> Result<()> {
        if let Some(ingest) = &self.ingest {
            ingest.ensure_activity(activity_id).await?;
        }
        self.stats.process(activity_id).await?;
        self.rules.process(activity_id).await
    }
}
