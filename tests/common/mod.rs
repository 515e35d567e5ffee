// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use weirdstats::config::Config;
use weirdstats::db::SqliteDb;
use weirdstats::error::AppError;
use weirdstats::gps::haversine_meters;
use weirdstats::models::{Activity, Feature, FeatureType, GpsPoint, LatLon, Road};
use weirdstats::routes::create_router;
use weirdstats::rules::Registry;
use weirdstats::services::strava::{
    ActivityFeed, ActivitySummary, AthleteRef, RateLimitInfo, StravaActivity, StravaApiError,
    StreamSet,
};
use weirdstats::services::MapFeatureProvider;
use weirdstats::AppState;

/// Degrees of latitude covered by one moving sample in [`stop_trace`].
#[allow(dead_code)]
pub const STEP_DEG: f64 = 0.00045;

/// A sqlite store in a throwaway directory. Keep the struct alive for the
/// whole test.
#[allow(dead_code)]
pub struct TestDb {
    pub db: SqliteDb,
    _dir: TempDir,
}

/// Create a fresh database.
#[allow(dead_code)]
pub async fn test_db() -> TestDb {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let db = SqliteDb::connect(dir.path().join("test.db"))
        .await
        .expect("Failed to open test database");
    TestDb { db, _dir: dir }
}

/// Create a test app over a fresh database.
/// Returns the router, the shared state and the database guard.
#[allow(dead_code)]
pub async fn create_test_app(config: Config) -> (axum::Router, Arc<AppState>, TestDb) {
    let test_db = test_db().await;
    let state = Arc::new(AppState {
        config,
        db: test_db.db.clone(),
        registry: Arc::new(Registry::default()),
    });
    (create_router(state.clone()), state, test_db)
}

#[allow(dead_code)]
pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 14, 0, 0).unwrap()
}

#[allow(dead_code)]
pub fn sample_activity(id: i64, user_id: i64, distance_m: f64) -> Activity {
    Activity {
        id,
        user_id,
        activity_type: "Ride".to_string(),
        name: format!("Ride {}", id),
        start_time: start_time(),
        description: String::new(),
        distance_m,
        moving_time_s: 3600,
        average_power: 0.0,
        average_heart_rate: 0.0,
        visibility: "everyone".to_string(),
        is_private: false,
        hide_from_home: false,
        hidden_by_rule: false,
    }
}

/// 25 samples at 10 s spacing heading north along lon -122.0: moving for
/// samples 0-4, stopped for 5-14 (90 s), moving again from 15.
#[allow(dead_code)]
pub fn stop_trace(start: DateTime<Utc>) -> Vec<GpsPoint> {
    let mut lat = 37.0;
    (0..25)
        .map(|i| {
            let stopped = (5..15).contains(&i);
            if i > 0 && !stopped {
                lat += STEP_DEG;
            }
            GpsPoint {
                lat,
                lon: -122.0,
                time: start + Duration::seconds(i * 10),
                speed: if stopped { 0.0 } else { 5.0 },
            }
        })
        .collect()
}

/// Where the stop in [`stop_trace`] sits.
#[allow(dead_code)]
pub fn stop_location() -> (f64, f64) {
    (37.0 + 4.0 * STEP_DEG, -122.0)
}

/// An east-west road between samples 15 and 16 of [`stop_trace`].
#[allow(dead_code)]
pub fn crossing_road(name: &str) -> Road {
    let lat = 37.0 + 5.5 * STEP_DEG;
    Road {
        id: 1,
        name: name.to_string(),
        highway: "residential".to_string(),
        geometry: vec![
            LatLon { lat, lon: -122.001 },
            LatLon { lat, lon: -121.999 },
        ],
    }
}

/// An east-west road well south of the trace's stop.
#[allow(dead_code)]
pub fn road_behind(name: &str) -> Road {
    let lat = 37.0 + 0.5 * STEP_DEG;
    Road {
        id: 2,
        name: name.to_string(),
        highway: "primary".to_string(),
        geometry: vec![
            LatLon { lat, lon: -122.001 },
            LatLon { lat, lon: -121.999 },
        ],
    }
}

/// Upstream rate-limit error with an optional `Retry-After`.
#[allow(dead_code)]
pub fn rate_limited(retry_after_secs: Option<u64>) -> AppError {
    AppError::StravaStatus(StravaApiError {
        status: 429,
        body: "Rate Limit Exceeded".to_string(),
        method: "GET".to_string(),
        path: "/athlete/activities".to_string(),
        request_id: None,
        rate_limit: RateLimitInfo {
            retry_after: retry_after_secs.map(std::time::Duration::from_secs),
            ..Default::default()
        },
    })
}

/// In-memory activity feed. Listing mimics Strava: newest first, filtered
/// by `after`/`before`, then paged.
#[allow(dead_code)]
#[derive(Default)]
pub struct FakeFeed {
    activities: Mutex<HashMap<i64, (StravaActivity, StreamSet)>>,
    summaries: Mutex<Vec<ActivitySummary>>,
    pub list_calls: Mutex<Vec<(Option<i64>, Option<i64>, u32, u32)>>,
    pub fetches: AtomicUsize,
    pub rate_limited: AtomicBool,
}

#[allow(dead_code)]
impl FakeFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an activity with the given trace for detail/stream calls
    /// and for listing.
    pub fn add_activity(&self, id: i64, athlete_id: i64, start: DateTime<Utc>, points: &[GpsPoint]) {
        let detail = StravaActivity {
            id,
            athlete: Some(AthleteRef { id: athlete_id }),
            name: format!("Activity {}", id),
            activity_type: "Ride".to_string(),
            start_date: start,
            description: None,
            distance: 12_000.0,
            moving_time: 2400,
            average_watts: None,
            average_heartrate: None,
            visibility: Some("everyone".to_string()),
            private: false,
            hide_from_home: false,
        };
        let streams = StreamSet {
            latlng: points.iter().map(|p| [p.lat, p.lon]).collect(),
            time: points.iter().map(|p| (p.time - start).num_seconds()).collect(),
            velocity_smooth: points.iter().map(|p| p.speed).collect(),
        };
        self.activities.lock().unwrap().insert(id, (detail, streams));
        self.add_summary(id, start);
    }

    /// Register a listing-only activity.
    pub fn add_summary(&self, id: i64, start: DateTime<Utc>) {
        let mut summaries = self.summaries.lock().unwrap();
        summaries.push(ActivitySummary {
            id,
            name: format!("Activity {}", id),
            activity_type: "Ride".to_string(),
            start_date: start,
        });
        summaries.sort_by(|a, b| b.start_date.cmp(&a.start_date).then(b.id.cmp(&a.id)));
    }

    fn check_rate_limit(&self) -> Result<(), AppError> {
        if self.rate_limited.load(Ordering::SeqCst) {
            return Err(rate_limited(Some(42)));
        }
        Ok(())
    }
}

#[async_trait]
impl ActivityFeed for FakeFeed {
    async fn get_activity(&self, activity_id: i64) -> Result<StravaActivity, AppError> {
        self.check_rate_limit()?;
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.activities
            .lock()
            .unwrap()
            .get(&activity_id)
            .map(|(detail, _)| detail.clone())
            .ok_or_else(|| AppError::NotFound(format!("activity {}", activity_id)))
    }

    async fn get_streams(&self, activity_id: i64) -> Result<StreamSet, AppError> {
        self.check_rate_limit()?;
        self.activities
            .lock()
            .unwrap()
            .get(&activity_id)
            .map(|(_, streams)| streams.clone())
            .ok_or_else(|| AppError::NotFound(format!("activity {}", activity_id)))
    }

    async fn list_activities(
        &self,
        after: Option<i64>,
        before: Option<i64>,
        page: u32,
        per_page: u32,
    ) -> Result<Vec<ActivitySummary>, AppError> {
        self.list_calls
            .lock()
            .unwrap()
            .push((after, before, page, per_page));
        self.check_rate_limit()?;

        let page = page.max(1) as usize;
        let per_page = per_page.max(1) as usize;
        Ok(self
            .summaries
            .lock()
            .unwrap()
            .iter()
            .filter(|s| after.is_none_or(|a| s.start_date.timestamp() > a))
            .filter(|s| before.is_none_or(|b| s.start_date.timestamp() < b))
            .skip((page - 1) * per_page)
            .take(per_page)
            .cloned()
            .collect())
    }
}

/// Map provider with fixed traffic lights and roads.
#[allow(dead_code)]
#[derive(Default)]
pub struct FakeMaps {
    pub lights: Vec<(f64, f64)>,
    pub roads: Vec<Road>,
    pub road_lookups: AtomicUsize,
}

#[async_trait]
impl MapFeatureProvider for FakeMaps {
    async fn nearby_features(&self, lat: f64, lon: f64) -> Result<Vec<Feature>, AppError> {
        Ok(self
            .lights
            .iter()
            .filter(|(llat, llon)| haversine_meters(lat, lon, *llat, *llon) <= 40.0)
            .map(|_| Feature {
                feature_type: FeatureType::TrafficLight,
                name: String::new(),
            })
            .collect())
    }

    async fn fetch_nearby_roads(
        &self,
        _lat: f64,
        _lon: f64,
        _radius_m: f64,
    ) -> Result<Vec<Road>, AppError> {
        self.road_lookups.fetch_add(1, Ordering::SeqCst);
        Ok(self.roads.clone())
    }
}

/// Serve `app` on an ephemeral local port and return its base URL.
#[allow(dead_code)]
pub async fn spawn_server(app: axum::Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind test server");
    let addr = listener.local_addr().expect("No local address");
    tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });
    format!("http://{}", addr)
}
