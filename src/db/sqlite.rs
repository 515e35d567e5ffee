// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! SQLite store with typed operations.
//!
//! Provides operations for:
//! - Activities and their GPS points
//! - Derived stop stats and stops (replace-only)
//! - The per-activity processing queue
//! - Backfill jobs
//! - Webhook events and hide rules
//!
//! All timestamps are stored as unix seconds. Claims on the queue and the
//! job table are single `UPDATE ... RETURNING` statements so a row is handed
//! to at most one caller.

use crate::error::AppError;
use crate::models::{
    Activity, ActivityStop, GpsPoint, HideRule, Job, JobStatus, NewJob, QueueEntry, StopStats,
    WebhookEvent,
};
use crate::time_utils::from_unix;
use chrono::{DateTime, Duration, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use std::path::Path;
use std::str::FromStr;

const DEFAULT_MAX_ATTEMPTS: i64 = 10;

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS activities (
        id INTEGER PRIMARY KEY,
        user_id INTEGER NOT NULL,
        type TEXT NOT NULL,
        name TEXT NOT NULL,
        start_time INTEGER NOT NULL,
        description TEXT NOT NULL DEFAULT '',
        distance REAL NOT NULL DEFAULT 0,
        moving_time INTEGER NOT NULL DEFAULT 0,
        average_power REAL NOT NULL DEFAULT 0,
        average_heart_rate REAL NOT NULL DEFAULT 0,
        visibility TEXT NOT NULL DEFAULT '',
        is_private INTEGER NOT NULL DEFAULT 0,
        hide_from_home INTEGER NOT NULL DEFAULT 0,
        hidden_by_rule INTEGER NOT NULL DEFAULT 0,
        updated_at INTEGER NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_activities_user_start
        ON activities (user_id, start_time)",
    "CREATE TABLE IF NOT EXISTS activity_points (
        activity_id INTEGER NOT NULL,
        seq INTEGER NOT NULL,
        lat REAL NOT NULL,
        lon REAL NOT NULL,
        ts INTEGER NOT NULL,
        speed REAL NOT NULL,
        PRIMARY KEY (activity_id, seq)
    )",
    "CREATE TABLE IF NOT EXISTS activity_stats (
        activity_id INTEGER PRIMARY KEY,
        stop_count INTEGER NOT NULL,
        stop_total_seconds INTEGER NOT NULL,
        traffic_light_stop_count INTEGER NOT NULL,
        effort_score REAL NOT NULL DEFAULT 0,
        effort_version INTEGER NOT NULL DEFAULT 0,
        updated_at INTEGER NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS activity_stops (
        activity_id INTEGER NOT NULL,
        seq INTEGER NOT NULL,
        lat REAL NOT NULL,
        lon REAL NOT NULL,
        start_seconds REAL NOT NULL,
        duration_seconds INTEGER NOT NULL,
        has_traffic_light INTEGER NOT NULL,
        has_road_crossing INTEGER NOT NULL,
        crossing_road TEXT NOT NULL,
        updated_at INTEGER NOT NULL,
        PRIMARY KEY (activity_id, seq)
    )",
    "CREATE TABLE IF NOT EXISTS activity_queue (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        activity_id INTEGER NOT NULL,
        enqueued_at INTEGER NOT NULL,
        claimed_at INTEGER,
        processed_at INTEGER
    )",
    "CREATE INDEX IF NOT EXISTS idx_activity_queue_pending
        ON activity_queue (processed_at, id)",
    "CREATE TABLE IF NOT EXISTS jobs (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        type TEXT NOT NULL,
        status TEXT NOT NULL,
        payload TEXT NOT NULL,
        cursor TEXT NOT NULL,
        attempts INTEGER NOT NULL,
        max_attempts INTEGER NOT NULL,
        last_error TEXT NOT NULL,
        next_run_at INTEGER NOT NULL,
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS webhook_events (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        object_id INTEGER NOT NULL,
        object_type TEXT NOT NULL,
        aspect_type TEXT NOT NULL,
        owner_id INTEGER NOT NULL,
        raw_payload TEXT NOT NULL,
        received_at INTEGER NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS hide_rules (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id INTEGER NOT NULL,
        name TEXT NOT NULL,
        condition TEXT NOT NULL,
        enabled INTEGER NOT NULL,
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL
    )",
];

const ACTIVITY_COLUMNS: &str = "id, user_id, type, name, start_time, description, distance, \
     moving_time, average_power, average_heart_rate, visibility, is_private, hide_from_home, \
     hidden_by_rule";

const JOB_COLUMNS: &str = "id, type, status, payload, cursor, attempts, max_attempts, \
     last_error, next_run_at, created_at, updated_at";

fn db(e: sqlx::Error) -> AppError {
    AppError::Database(e.to_string())
}

/// SQLite database client.
#[derive(Clone)]
pub struct SqliteDb {
    pool: SqlitePool,
}

impl SqliteDb {
    /// Open (creating if needed) the database at `path` and apply the schema.
    pub async fn connect(path: impl AsRef<Path>) -> Result<Self, AppError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| AppError::Database(format!("Failed to create {:?}: {}", parent, e)))?;
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))
            .map_err(db)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| AppError::Database(format!("Failed to open database: {}", e)))?;

        let store = Self { pool };
        store.init_schema().await?;

        tracing::info!(path = %path.display(), "Opened SQLite database");
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), AppError> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(db)?;
        }
        Ok(())
    }

    // ─── Activities ──────────────────────────────────────────────

    /// Insert or update an activity and replace its points in one transaction.
    ///
    /// `hidden_by_rule` is left alone on update; only rule evaluation sets it.
    pub async fn upsert_activity(
        &self,
        activity: &Activity,
        points: &[GpsPoint],
    ) -> Result<(), AppError> {
        if activity.activity_type.is_empty() {
            return Err(AppError::BadRequest("activity type required".to_string()));
        }

        let mut tx = self.pool.begin().await.map_err(db)?;

        sqlx::query(
            "INSERT INTO activities (id, user_id, type, name, start_time, description, distance,
                 moving_time, average_power, average_heart_rate, visibility, is_private,
                 hide_from_home, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 user_id = excluded.user_id,
                 type = excluded.type,
                 name = excluded.name,
                 start_time = excluded.start_time,
                 description = excluded.description,
                 distance = excluded.distance,
                 moving_time = excluded.moving_time,
                 average_power = excluded.average_power,
                 average_heart_rate = excluded.average_heart_rate,
                 visibility = excluded.visibility,
                 is_private = excluded.is_private,
                 hide_from_home = excluded.hide_from_home,
                 updated_at = excluded.updated_at",
        )
        .bind(activity.id)
        .bind(activity.user_id)
        .bind(&activity.activity_type)
        .bind(&activity.name)
        .bind(activity.start_unix())
        .bind(&activity.description)
        .bind(activity.distance_m)
        .bind(activity.moving_time_s)
        .bind(activity.average_power)
        .bind(activity.average_heart_rate)
        .bind(&activity.visibility)
        .bind(activity.is_private)
        .bind(activity.hide_from_home)
        .bind(Utc::now().timestamp())
        .execute(&mut *tx)
        .await
        .map_err(db)?;

        sqlx::query("DELETE FROM activity_points WHERE activity_id = ?")
            .bind(activity.id)
            .execute(&mut *tx)
            .await
            .map_err(db)?;

        for (seq, p) in points.iter().enumerate() {
            sqlx::query(
                "INSERT INTO activity_points (activity_id, seq, lat, lon, ts, speed)
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(activity.id)
            .bind(seq as i64)
            .bind(p.lat)
            .bind(p.lon)
            .bind(p.time.timestamp())
            .bind(p.speed)
            .execute(&mut *tx)
            .await
            .map_err(db)?;
        }

        tx.commit().await.map_err(db)?;

        tracing::debug!(
            activity_id = activity.id,
            points = points.len(),
            "Upserted activity"
        );
        Ok(())
    }

    pub async fn get_activity(&self, activity_id: i64) -> Result<Option<Activity>, AppError> {
        let sql = format!("SELECT {} FROM activities WHERE id = ?", ACTIVITY_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(activity_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db)?;
        row.map(|r| activity_from_row(&r)).transpose()
    }

    pub async fn has_activity(&self, activity_id: i64) -> Result<bool, AppError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM activities WHERE id = ?")
            .bind(activity_id)
            .fetch_one(&self.pool)
            .await
            .map_err(db)?;
        Ok(count > 0)
    }

    pub async fn count_activity_points(&self, activity_id: i64) -> Result<i64, AppError> {
        sqlx::query_scalar("SELECT COUNT(*) FROM activity_points WHERE activity_id = ?")
            .bind(activity_id)
            .fetch_one(&self.pool)
            .await
            .map_err(db)
    }

    /// Points in sequence order.
    pub async fn load_activity_points(&self, activity_id: i64) -> Result<Vec<GpsPoint>, AppError> {
        let rows = sqlx::query(
            "SELECT lat, lon, ts, speed FROM activity_points
             WHERE activity_id = ? ORDER BY seq",
        )
        .bind(activity_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db)?;

        rows.iter()
            .map(|r| {
                Ok(GpsPoint {
                    lat: r.try_get("lat").map_err(db)?,
                    lon: r.try_get("lon").map_err(db)?,
                    time: from_unix(r.try_get("ts").map_err(db)?),
                    speed: r.try_get("speed").map_err(db)?,
                })
            })
            .collect()
    }

    pub async fn update_activity_hidden_by_rule(
        &self,
        activity_id: i64,
        hidden: bool,
    ) -> Result<(), AppError> {
        sqlx::query("UPDATE activities SET hidden_by_rule = ? WHERE id = ?")
            .bind(hidden)
            .bind(activity_id)
            .execute(&self.pool)
            .await
            .map_err(db)?;
        Ok(())
    }

    /// Latest non-zero average heart rates of `user_id`'s activities that
    /// started before `before`, newest first.
    pub async fn recent_heart_rates(
        &self,
        user_id: i64,
        before: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<f64>, AppError> {
        sqlx::query_scalar(
            "SELECT average_heart_rate FROM activities
             WHERE user_id = ? AND start_time < ? AND average_heart_rate > 0
             ORDER BY start_time DESC
             LIMIT ?",
        )
        .bind(user_id)
        .bind(before.timestamp())
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(db)
    }

    // ─── Stats & stops ───────────────────────────────────────────

    pub async fn get_activity_stats(&self, activity_id: i64) -> Result<Option<StopStats>, AppError> {
        let row = sqlx::query(
            "SELECT stop_count, stop_total_seconds, traffic_light_stop_count, effort_score,
                    effort_version, updated_at
             FROM activity_stats WHERE activity_id = ?",
        )
        .bind(activity_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db)?;

        row.map(|r| {
            Ok(StopStats {
                stop_count: r.try_get("stop_count").map_err(db)?,
                stop_total_seconds: r.try_get("stop_total_seconds").map_err(db)?,
                traffic_light_stop_count: r.try_get("traffic_light_stop_count").map_err(db)?,
                effort_score: r.try_get("effort_score").map_err(db)?,
                effort_version: r.try_get("effort_version").map_err(db)?,
                updated_at: from_unix(r.try_get("updated_at").map_err(db)?),
            })
        })
        .transpose()
    }

    pub async fn load_activity_stops(
        &self,
        activity_id: i64,
    ) -> Result<Vec<ActivityStop>, AppError> {
        let rows = sqlx::query(
            "SELECT seq, lat, lon, start_seconds, duration_seconds, has_traffic_light,
                    has_road_crossing, crossing_road
             FROM activity_stops WHERE activity_id = ? ORDER BY seq",
        )
        .bind(activity_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db)?;

        rows.iter()
            .map(|r| {
                Ok(ActivityStop {
                    seq: r.try_get("seq").map_err(db)?,
                    lat: r.try_get("lat").map_err(db)?,
                    lon: r.try_get("lon").map_err(db)?,
                    start_seconds: r.try_get("start_seconds").map_err(db)?,
                    duration_seconds: r.try_get("duration_seconds").map_err(db)?,
                    has_traffic_light: r.try_get("has_traffic_light").map_err(db)?,
                    has_road_crossing: r.try_get("has_road_crossing").map_err(db)?,
                    crossing_road: r.try_get("crossing_road").map_err(db)?,
                })
            })
            .collect()
    }

    /// Replace the stats row and the full stop list in one transaction.
    pub async fn replace_activity_analysis(
        &self,
        activity_id: i64,
        stats: &StopStats,
        stops: &[ActivityStop],
    ) -> Result<(), AppError> {
        let updated_at = stats.updated_at.timestamp();
        let mut tx = self.pool.begin().await.map_err(db)?;

        sqlx::query(
            "INSERT INTO activity_stats (activity_id, stop_count, stop_total_seconds,
                 traffic_light_stop_count, effort_score, effort_version, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(activity_id) DO UPDATE SET
                 stop_count = excluded.stop_count,
                 stop_total_seconds = excluded.stop_total_seconds,
                 traffic_light_stop_count = excluded.traffic_light_stop_count,
                 effort_score = excluded.effort_score,
                 effort_version = excluded.effort_version,
                 updated_at = excluded.updated_at",
        )
        .bind(activity_id)
        .bind(stats.stop_count)
        .bind(stats.stop_total_seconds)
        .bind(stats.traffic_light_stop_count)
        .bind(stats.effort_score)
        .bind(stats.effort_version)
        .bind(updated_at)
        .execute(&mut *tx)
        .await
        .map_err(db)?;

        sqlx::query("DELETE FROM activity_stops WHERE activity_id = ?")
            .bind(activity_id)
            .execute(&mut *tx)
            .await
            .map_err(db)?;

        for stop in stops {
            sqlx::query(
                "INSERT INTO activity_stops (activity_id, seq, lat, lon, start_seconds,
                     duration_seconds, has_traffic_light, has_road_crossing, crossing_road,
                     updated_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(activity_id)
            .bind(stop.seq)
            .bind(stop.lat)
            .bind(stop.lon)
            .bind(stop.start_seconds)
            .bind(stop.duration_seconds)
            .bind(stop.has_traffic_light)
            .bind(stop.has_road_crossing)
            .bind(&stop.crossing_road)
            .bind(updated_at)
            .execute(&mut *tx)
            .await
            .map_err(db)?;
        }

        tx.commit().await.map_err(db)?;
        Ok(())
    }

    // ─── Activity queue ──────────────────────────────────────────

    /// Append an activity id to the queue. Duplicates are allowed.
    pub async fn enqueue_activity(&self, activity_id: i64) -> Result<i64, AppError> {
        let result =
            sqlx::query("INSERT INTO activity_queue (activity_id, enqueued_at) VALUES (?, ?)")
                .bind(activity_id)
                .bind(Utc::now().timestamp())
                .execute(&self.pool)
                .await
                .map_err(db)?;
        Ok(result.last_insert_rowid())
    }

    /// Claim the oldest unprocessed entry that is unclaimed or whose claim
    /// is older than `lease`.
    pub async fn dequeue_activity(
        &self,
        now: DateTime<Utc>,
        lease: Duration,
    ) -> Result<Option<QueueEntry>, AppError> {
        let row = sqlx::query(
            "UPDATE activity_queue SET claimed_at = ?
             WHERE id = (
                 SELECT id FROM activity_queue
                 WHERE processed_at IS NULL
                   AND (claimed_at IS NULL OR claimed_at <= ?)
                 ORDER BY id
                 LIMIT 1
             )
             RETURNING id, activity_id, enqueued_at",
        )
        .bind(now.timestamp())
        .bind((now - lease).timestamp())
        .fetch_optional(&self.pool)
        .await
        .map_err(db)?;

        row.map(|r| {
            Ok(QueueEntry {
                id: r.try_get("id").map_err(db)?,
                activity_id: r.try_get("activity_id").map_err(db)?,
                enqueued_at: from_unix(r.try_get("enqueued_at").map_err(db)?),
            })
        })
        .transpose()
    }

    pub async fn mark_processed(&self, queue_id: i64) -> Result<(), AppError> {
        sqlx::query("UPDATE activity_queue SET processed_at = ? WHERE id = ?")
            .bind(Utc::now().timestamp())
            .bind(queue_id)
            .execute(&self.pool)
            .await
            .map_err(db)?;
        Ok(())
    }

    /// Drop a claim so the entry is immediately eligible again.
    pub async fn release_claim(&self, queue_id: i64) -> Result<(), AppError> {
        sqlx::query("UPDATE activity_queue SET claimed_at = NULL WHERE id = ?")
            .bind(queue_id)
            .execute(&self.pool)
            .await
            .map_err(db)?;
        Ok(())
    }

    /// Retire `entry` and append a fresh entry for the same activity, in one
    /// transaction, so a failing activity goes behind everything else.
    pub async fn requeue_to_tail(&self, entry: &QueueEntry) -> Result<i64, AppError> {
        let now = Utc::now().timestamp();
        let mut tx = self.pool.begin().await.map_err(db)?;

        sqlx::query("UPDATE activity_queue SET processed_at = ? WHERE id = ?")
            .bind(now)
            .bind(entry.id)
            .execute(&mut *tx)
            .await
            .map_err(db)?;

        let result =
            sqlx::query("INSERT INTO activity_queue (activity_id, enqueued_at) VALUES (?, ?)")
                .bind(entry.activity_id)
                .bind(now)
                .execute(&mut *tx)
                .await
                .map_err(db)?;

        tx.commit().await.map_err(db)?;
        Ok(result.last_insert_rowid())
    }

    pub async fn count_pending_queue(&self) -> Result<i64, AppError> {
        sqlx::query_scalar("SELECT COUNT(*) FROM activity_queue WHERE processed_at IS NULL")
            .fetch_one(&self.pool)
            .await
            .map_err(db)
    }

    /// Activity ids of unprocessed entries in queue order.
    pub async fn pending_activity_ids(&self) -> Result<Vec<i64>, AppError> {
        sqlx::query_scalar(
            "SELECT activity_id FROM activity_queue WHERE processed_at IS NULL ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db)
    }

    // ─── Jobs ────────────────────────────────────────────────────

    /// Insert a job. Defaults: status `queued`, payload and cursor `{}`,
    /// ten attempts, runnable now.
    pub async fn create_job(&self, job: &NewJob) -> Result<i64, AppError> {
        if job.job_type.is_empty() {
            return Err(AppError::BadRequest("job type required".to_string()));
        }
        let now = Utc::now();
        let payload = job.payload.as_deref().filter(|s| !s.is_empty()).unwrap_or("{}");
        let cursor = job.cursor.as_deref().filter(|s| !s.is_empty()).unwrap_or("{}");
        let max_attempts = job
            .max_attempts
            .filter(|&n| n > 0)
            .unwrap_or(DEFAULT_MAX_ATTEMPTS);
        let next_run_at = job.next_run_at.unwrap_or(now);

        let result = sqlx::query(
            "INSERT INTO jobs (type, status, payload, cursor, attempts, max_attempts, last_error,
                 next_run_at, created_at, updated_at)
             VALUES (?, ?, ?, ?, 0, ?, '', ?, ?, ?)",
        )
        .bind(&job.job_type)
        .bind(JobStatus::Queued.as_str())
        .bind(payload)
        .bind(cursor)
        .bind(max_attempts)
        .bind(next_run_at.timestamp())
        .bind(now.timestamp())
        .bind(now.timestamp())
        .execute(&self.pool)
        .await
        .map_err(db)?;

        let id = result.last_insert_rowid();
        tracing::info!(job_id = id, job_type = %job.job_type, "Created job");
        Ok(id)
    }

    pub async fn get_job(&self, job_id: i64) -> Result<Option<Job>, AppError> {
        let sql = format!("SELECT {} FROM jobs WHERE id = ?", JOB_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db)?;
        row.map(|r| job_from_row(&r)).transpose()
    }

    /// Most recently created jobs first.
    pub async fn list_jobs(&self, limit: i64) -> Result<Vec<Job>, AppError> {
        let sql = format!("SELECT {} FROM jobs ORDER BY id DESC LIMIT ?", JOB_COLUMNS);
        let rows = sqlx::query(&sql)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(db)?;
        rows.iter().map(job_from_row).collect()
    }

    /// Atomically claim the next eligible job and mark it `running`.
    ///
    /// Eligible means queued/retry and due, or running with no update for
    /// `stale_after` (its worker is presumed dead).
    pub async fn claim_job(
        &self,
        now: DateTime<Utc>,
        stale_after: Duration,
    ) -> Result<Option<Job>, AppError> {
        let sql = format!(
            "UPDATE jobs SET status = 'running', attempts = attempts + 1, updated_at = ?
             WHERE id = (
                 SELECT id FROM jobs
                 WHERE (status IN ('queued', 'retry') AND next_run_at <= ?)
                    OR (status = 'running' AND updated_at <= ?)
                 ORDER BY next_run_at, id
                 LIMIT 1
             )
             RETURNING {}",
            JOB_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(now.timestamp())
            .bind(now.timestamp())
            .bind((now - stale_after).timestamp())
            .fetch_optional(&self.pool)
            .await
            .map_err(db)?;
        row.map(|r| job_from_row(&r)).transpose()
    }

    pub async fn mark_job_queued(
        &self,
        job_id: i64,
        cursor: &str,
        next_run_at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        sqlx::query(
            "UPDATE jobs SET status = 'queued', cursor = ?, last_error = '', next_run_at = ?,
                 updated_at = ?
             WHERE id = ?",
        )
        .bind(cursor)
        .bind(next_run_at.timestamp())
        .bind(Utc::now().timestamp())
        .bind(job_id)
        .execute(&self.pool)
        .await
        .map_err(db)?;
        Ok(())
    }

    pub async fn mark_job_retry(
        &self,
        job_id: i64,
        cursor: &str,
        last_error: &str,
        next_run_at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        sqlx::query(
            "UPDATE jobs SET status = 'retry', cursor = ?, last_error = ?, next_run_at = ?,
                 updated_at = ?
             WHERE id = ?",
        )
        .bind(cursor)
        .bind(last_error)
        .bind(next_run_at.timestamp())
        .bind(Utc::now().timestamp())
        .bind(job_id)
        .execute(&self.pool)
        .await
        .map_err(db)?;
        Ok(())
    }

    pub async fn mark_job_failed(
        &self,
        job_id: i64,
        cursor: &str,
        last_error: &str,
    ) -> Result<(), AppError> {
        sqlx::query(
            "UPDATE jobs SET status = 'failed', cursor = ?, last_error = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(cursor)
        .bind(last_error)
        .bind(Utc::now().timestamp())
        .bind(job_id)
        .execute(&self.pool)
        .await
        .map_err(db)?;
        Ok(())
    }

    pub async fn mark_job_completed(&self, job_id: i64, cursor: &str) -> Result<(), AppError> {
        sqlx::query(
            "UPDATE jobs SET status = 'completed', cursor = ?, last_error = '', updated_at = ?
             WHERE id = ?",
        )
        .bind(cursor)
        .bind(Utc::now().timestamp())
        .bind(job_id)
        .execute(&self.pool)
        .await
        .map_err(db)?;
        Ok(())
    }

    // ─── Webhook events ──────────────────────────────────────────

    pub async fn insert_webhook_event(&self, event: &WebhookEvent) -> Result<i64, AppError> {
        let result = sqlx::query(
            "INSERT INTO webhook_events (object_id, object_type, aspect_type, owner_id,
                 raw_payload, received_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(event.object_id)
        .bind(&event.object_type)
        .bind(&event.aspect_type)
        .bind(event.owner_id)
        .bind(&event.raw_payload)
        .bind(event.received_at.timestamp())
        .execute(&self.pool)
        .await
        .map_err(db)?;
        Ok(result.last_insert_rowid())
    }

    pub async fn count_webhook_events(&self) -> Result<i64, AppError> {
        sqlx::query_scalar("SELECT COUNT(*) FROM webhook_events")
            .fetch_one(&self.pool)
            .await
            .map_err(db)
    }

    // ─── Hide rules ──────────────────────────────────────────────

    /// A user's rules, newest first.
    pub async fn list_hide_rules(&self, user_id: i64) -> Result<Vec<HideRule>, AppError> {
        let rows = sqlx::query(
            "SELECT id, user_id, name, condition, enabled, created_at, updated_at
             FROM hide_rules WHERE user_id = ?
             ORDER BY created_at DESC, id DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db)?;

        rows.iter()
            .map(|r| {
                Ok(HideRule {
                    id: r.try_get("id").map_err(db)?,
                    user_id: r.try_get("user_id").map_err(db)?,
                    name: r.try_get("name").map_err(db)?,
                    condition: r.try_get("condition").map_err(db)?,
                    enabled: r.try_get("enabled").map_err(db)?,
                    created_at: from_unix(r.try_get("created_at").map_err(db)?),
                    updated_at: from_unix(r.try_get("updated_at").map_err(db)?),
                })
            })
            .collect()
    }

    /// Store a rule. The caller validates `condition` first.
    pub async fn create_hide_rule(
        &self,
        user_id: i64,
        name: &str,
        condition: &str,
        enabled: bool,
    ) -> Result<i64, AppError> {
        let now = Utc::now().timestamp();
        let result = sqlx::query(
            "INSERT INTO hide_rules (user_id, name, condition, enabled, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(user_id)
        .bind(name)
        .bind(condition)
        .bind(enabled)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(db)?;
        Ok(result.last_insert_rowid())
    }

    pub async fn set_hide_rule_enabled(&self, rule_id: i64, enabled: bool) -> Result<(), AppError> {
        let result = sqlx::query("UPDATE hide_rules SET enabled = ?, updated_at = ? WHERE id = ?")
            .bind(enabled)
            .bind(Utc::now().timestamp())
            .bind(rule_id)
            .execute(&self.pool)
            .await
            .map_err(db)?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("rule {}", rule_id)));
        }
        Ok(())
    }

    pub async fn delete_hide_rule(&self, rule_id: i64) -> Result<(), AppError> {
        let result = sqlx::query("DELETE FROM hide_rules WHERE id = ?")
            .bind(rule_id)
            .execute(&self.pool)
            .await
            .map_err(db)?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("rule {}", rule_id)));
        }
        Ok(())
    }
}

fn activity_from_row(r: &SqliteRow) -> Result<Activity, AppError> {
    Ok(Activity {
        id: r.try_get("id").map_err(db)?,
        user_id: r.try_get("user_id").map_err(db)?,
        activity_type: r.try_get("type").map_err(db)?,
        name: r.try_get("name").map_err(db)?,
        start_time: from_unix(r.try_get("start_time").map_err(db)?),
        description: r.try_get("description").map_err(db)?,
        distance_m: r.try_get("distance").map_err(db)?,
        moving_time_s: r.try_get("moving_time").map_err(db)?,
        average_power: r.try_get("average_power").map_err(db)?,
        average_heart_rate: r.try_get("average_heart_rate").map_err(db)?,
        visibility: r.try_get("visibility").map_err(db)?,
        is_private: r.try_get("is_private").map_err(db)?,
        hide_from_home: r.try_get("hide_from_home").map_err(db)?,
        hidden_by_rule: r.try_get("hidden_by_rule").map_err(db)?,
    })
}

fn job_from_row(r: &SqliteRow) -> Result<Job, AppError> {
    let status: String = r.try_get("status").map_err(db)?;
    Ok(Job {
        id: r.try_get("id").map_err(db)?,
        job_type: r.try_get("type").map_err(db)?,
        status: status.parse().map_err(AppError::Database)?,
        payload: r.try_get("payload").map_err(db)?,
        cursor: r.try_get("cursor").map_err(db)?,
        attempts: r.try_get("attempts").map_err(db)?,
        max_attempts: r.try_get("max_attempts").map_err(db)?,
        last_error: r.try_get("last_error").map_err(db)?,
        next_run_at: from_unix(r.try_get("next_run_at").map_err(db)?),
        created_at: from_unix(r.try_get("created_at").map_err(db)?),
        updated_at: from_unix(r.try_get("updated_at").map_err(db)?),
    })
}
