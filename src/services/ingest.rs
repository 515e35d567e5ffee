// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Activity ingestion: fetch an activity and its streams from Strava and
//! store them, but only when we don't already have the points.

use crate::db::SqliteDb;
use crate::error::AppError;
use crate::models::{Activity, GpsPoint};
use crate::services::strava::{ActivityFeed, StravaActivity, StreamSet};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

/// Fetches upstream activities into the store.
#[derive(Clone)]
pub struct Ingestor {
    db: SqliteDb,
    feed: Arc<dyn ActivityFeed>,
}

impl Ingestor {
    pub fn new(db: SqliteDb, feed: Arc<dyn ActivityFeed>) -> Self {
        Self { db, feed }
    }

    /// The upstream feed, for callers that page through activity lists.
    pub fn feed(&self) -> &dyn ActivityFeed {
        self.feed.as_ref()
    }

    /// Make sure `activity_id` and its points are stored.
    ///
    /// Fetches only if the activity is missing or has no points.
    pub async fn ensure_activity(&self, activity_id: i64) -> Result<(), AppError> {
        if self.db.has_activity(activity_id).await?
            && self.db.count_activity_points(activity_id).await? > 0
        {
            return Ok(());
        }
        self.fetch_and_store(activity_id).await
    }

    /// Fetch an activity and its streams and upsert both.
    pub async fn fetch_and_store(&self, activity_id: i64) -> Result<(), AppError> {
        let detail = self.feed.get_activity(activity_id).await?;
        let streams = self.feed.get_streams(activity_id).await?;

        let points = build_points(detail.start_date, &streams)?;
        if points.is_empty() {
            tracing::info!(
                activity_id,
                name = %detail.name,
                "Activity has no GPS data"
            );
        }

        let activity = activity_from_detail(detail);
        self.db.upsert_activity(&activity, &points).await?;

        tracing::info!(
            activity_id = activity.id,
            activity_type = %activity.activity_type,
            points = points.len(),
            "Ingested activity"
        );
        Ok(())
    }

    /// Ingest and enqueue the athlete's newest activity. Returns how many
    /// activities were enqueued (0 or 1).
    pub async fn sync_latest_activity(&self) -> Result<usize, AppError> {
        let latest = self.feed.list_activities(None, None, 1, 1).await?;
        let Some(summary) = latest.first() else {
            return Ok(0);
        };

        self.fetch_and_store(summary.id).await?;
        self.db.enqueue_activity(summary.id).await?;
        Ok(1)
    }
}

fn activity_from_detail(detail: StravaActivity) -> Activity {
    Activity {
        id: detail.id,
        user_id: detail.athlete.map(|a| a.id).unwrap_or_default(),
        activity_type: detail.activity_type,
        name: detail.name,
        start_time: detail.start_date,
        description: detail.description.unwrap_or_default(),
        distance_m: detail.distance,
        moving_time_s: detail.moving_time,
        average_power: detail.average_watts.unwrap_or_default(),
        average_heart_rate: detail.average_heartrate.unwrap_or_default(),
        visibility: detail.visibility.unwrap_or_default(),
        is_private: detail.private,
        hide_from_home: detail.hide_from_home,
        hidden_by_rule: false,
    }
}

/// Zip the `latlng`, `time` and `velocity_smooth` streams into points.
///
/// No position or no time stream means an indoor or manual activity and
/// yields no points. Speed defaults to 0 where the velocity stream is short.
pub fn build_points(start: DateTime<Utc>, streams: &StreamSet) -> Result<Vec<GpsPoint>, AppError> {
    if streams.latlng.is_empty() || streams.time.is_empty() {
        return Ok(Vec::new());
    }
    if streams.latlng.len() != streams.time.len() {
        return Err(AppError::StravaApi(format!(
            "latlng/time length mismatch ({} vs {})",
            streams.latlng.len(),
            streams.time.len()
        )));
    }

    Ok(streams
        .latlng
        .iter()
        .zip(&streams.time)
        .enumerate()
        .map(|(i, (&[lat, lon], &offset))| GpsPoint {
            lat,
            lon,
            time: start + Duration::seconds(offset),
            speed: streams.velocity_smooth.get(i).copied().unwrap_or(0.0),
        })
        .collect())
}
