// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Integration tests for the sqlite store: queue, jobs, rules, analysis.

mod common;

use chrono::{Duration, Utc};
use common::{sample_activity, start_time, stop_trace, test_db};
use weirdstats::error::AppError;
use weirdstats::models::{ActivityStop, JobStatus, NewJob, StopStats};

// ─── Activity queue ──────────────────────────────────────────

#[tokio::test]
async fn test_queue_is_fifo_and_claims_are_exclusive() {
    let t = test_db().await;
    t.db.enqueue_activity(10).await.unwrap();
    t.db.enqueue_activity(20).await.unwrap();

    let lease = Duration::minutes(10);
    let first = t.db.dequeue_activity(Utc::now(), lease).await.unwrap().unwrap();
    let second = t.db.dequeue_activity(Utc::now(), lease).await.unwrap().unwrap();
    assert_eq!(first.activity_id, 10);
    assert_eq!(second.activity_id, 20);

    // Both are claimed; nothing else is due.
    assert!(t.db.dequeue_activity(Utc::now(), lease).await.unwrap().is_none());
    assert_eq!(t.db.count_pending_queue().await.unwrap(), 2);

    t.db.mark_processed(first.id).await.unwrap();
    assert_eq!(t.db.pending_activity_ids().await.unwrap(), vec![20]);
}

#[tokio::test]
async fn test_expired_claim_is_reclaimable() {
    let t = test_db().await;
    t.db.enqueue_activity(7).await.unwrap();

    let now = Utc::now();
    let lease = Duration::minutes(10);
    let entry = t.db.dequeue_activity(now, lease).await.unwrap().unwrap();

    assert!(t
        .db
        .dequeue_activity(now + Duration::minutes(5), lease)
        .await
        .unwrap()
        .is_none());

    let again = t
        .db
        .dequeue_activity(now + Duration::minutes(11), lease)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(again.id, entry.id);
}

#[tokio::test]
async fn test_release_and_requeue() {
    let t = test_db().await;
    t.db.enqueue_activity(1).await.unwrap();
    t.db.enqueue_activity(2).await.unwrap();
    let lease = Duration::minutes(10);

    // A released claim is immediately due again, at its original position.
    let entry = t.db.dequeue_activity(Utc::now(), lease).await.unwrap().unwrap();
    t.db.release_claim(entry.id).await.unwrap();
    let same = t.db.dequeue_activity(Utc::now(), lease).await.unwrap().unwrap();
    assert_eq!(same.id, entry.id);

    // A requeued entry goes behind activity 2.
    let new_id = t.db.requeue_to_tail(&same).await.unwrap();
    assert!(new_id > same.id);
    assert_eq!(t.db.pending_activity_ids().await.unwrap(), vec![2, 1]);
}

// ─── Jobs ────────────────────────────────────────────────────

#[tokio::test]
async fn test_create_job_defaults() {
    let t = test_db().await;
    let id = t
        .db
        .create_job(&NewJob {
            job_type: "sync_latest".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();

    let job = t.db.get_job(id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Queued);
    assert_eq!(job.payload, "{}");
    assert_eq!(job.cursor, "{}");
    assert_eq!(job.max_attempts, 10);
    assert_eq!(job.attempts, 0);
    assert!(job.next_run_at <= Utc::now());
}

#[tokio::test]
async fn test_create_job_requires_type() {
    let t = test_db().await;
    let err = t.db.create_job(&NewJob::default()).await.unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));
}

#[tokio::test]
async fn test_running_job_is_reclaimable_only_when_stale() {
    let t = test_db().await;
    let id = t.db.create_job(&NewJob::new("sync_latest", "{}")).await.unwrap();

    let now = Utc::now();
    let stale = Duration::minutes(10);
    let claimed = t.db.claim_job(now, stale).await.unwrap().unwrap();
    assert_eq!(claimed.id, id);
    assert_eq!(claimed.status, JobStatus::Running);
    assert_eq!(claimed.attempts, 1);

    // Not yet stale.
    assert!(t.db.claim_job(now, stale).await.unwrap().is_none());

    // Past the staleness window another worker takes it over.
    let reclaimed = t
        .db
        .claim_job(now + Duration::minutes(11), stale)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reclaimed.id, id);
    assert_eq!(reclaimed.attempts, 2);
}

#[tokio::test]
async fn test_future_and_terminal_jobs_are_not_claimed() {
    let t = test_db().await;
    t.db.create_job(&NewJob {
        job_type: "sync_latest".to_string(),
        next_run_at: Some(Utc::now() + Duration::hours(1)),
        ..Default::default()
    })
    .await
    .unwrap();
    let done = t.db.create_job(&NewJob::new("sync_latest", "{}")).await.unwrap();
    t.db.mark_job_completed(done, r#"{"enqueued":1}"#).await.unwrap();

    assert!(t
        .db
        .claim_job(Utc::now(), Duration::minutes(10))
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_job_transitions_record_cursor_and_error() {
    let t = test_db().await;
    let id = t.db.create_job(&NewJob::new("sync_latest", "{}")).await.unwrap();

    let next = Utc::now() + Duration::minutes(1);
    t.db.mark_job_retry(id, r#"{"page":2}"#, "boom", next).await.unwrap();
    let job = t.db.get_job(id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Retry);
    assert_eq!(job.cursor, r#"{"page":2}"#);
    assert_eq!(job.last_error, "boom");
    assert_eq!(job.next_run_at.timestamp(), next.timestamp());

    t.db.mark_job_failed(id, r#"{"page":2}"#, "gave up").await.unwrap();
    let job = t.db.get_job(id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.last_error, "gave up");
}

// ─── Activities & analysis ───────────────────────────────────

#[tokio::test]
async fn test_upsert_replaces_points_and_keeps_rule_flag() {
    let t = test_db().await;
    let activity = sample_activity(100, 1, 15_000.0);
    let points = stop_trace(start_time());

    t.db.upsert_activity(&activity, &points).await.unwrap();
    assert_eq!(t.db.count_activity_points(100).await.unwrap(), points.len() as i64);
    assert_eq!(t.db.load_activity_points(100).await.unwrap(), points);

    t.db.update_activity_hidden_by_rule(100, true).await.unwrap();

    let mut renamed = activity.clone();
    renamed.name = "Renamed".to_string();
    t.db.upsert_activity(&renamed, &points[..3]).await.unwrap();

    let stored = t.db.get_activity(100).await.unwrap().unwrap();
    assert_eq!(stored.name, "Renamed");
    assert!(stored.hidden_by_rule);
    assert_eq!(t.db.count_activity_points(100).await.unwrap(), 3);
}

#[tokio::test]
async fn test_missing_activity() {
    let t = test_db().await;
    assert!(t.db.get_activity(404).await.unwrap().is_none());
    assert!(!t.db.has_activity(404).await.unwrap());
    assert!(t.db.get_activity_stats(404).await.unwrap().is_none());
}

#[tokio::test]
async fn test_replace_activity_analysis_replaces_stops() {
    let t = test_db().await;
    t.db.upsert_activity(&sample_activity(5, 1, 1000.0), &[])
        .await
        .unwrap();

    let stop = |seq| ActivityStop {
        seq,
        lat: 37.0,
        lon: -122.0,
        start_seconds: 50.0 * seq as f64,
        duration_seconds: 90,
        has_traffic_light: seq == 0,
        has_road_crossing: false,
        crossing_road: String::new(),
    };
    let stats = StopStats {
        stop_count: 2,
        stop_total_seconds: 180,
        traffic_light_stop_count: 1,
        effort_score: 64.0,
        effort_version: 1,
        updated_at: start_time(),
    };
    t.db.replace_activity_analysis(5, &stats, &[stop(0), stop(1)])
        .await
        .unwrap();
    assert_eq!(t.db.load_activity_stops(5).await.unwrap().len(), 2);

    let fewer = StopStats {
        stop_count: 1,
        stop_total_seconds: 90,
        ..stats.clone()
    };
    t.db.replace_activity_analysis(5, &fewer, &[stop(0)])
        .await
        .unwrap();

    assert_eq!(t.db.load_activity_stops(5).await.unwrap(), vec![stop(0)]);
    assert_eq!(t.db.get_activity_stats(5).await.unwrap().unwrap(), fewer);
}

#[tokio::test]
async fn test_recent_heart_rates_skip_zero_and_later_activities() {
    let t = test_db().await;
    let base = start_time();
    for (id, offset_days, hr) in [(1, -3, 140.0), (2, -2, 0.0), (3, -1, 150.0), (4, 1, 170.0)] {
        let mut a = sample_activity(id, 9, 1000.0);
        a.start_time = base + Duration::days(offset_days);
        a.average_heart_rate = hr;
        t.db.upsert_activity(&a, &[]).await.unwrap();
    }

    let rates = t.db.recent_heart_rates(9, base, 50).await.unwrap();
    assert_eq!(rates, vec![150.0, 140.0]);
    assert!(t.db.recent_heart_rates(8, base, 50).await.unwrap().is_empty());
}

// ─── Hide rules ──────────────────────────────────────────────

#[tokio::test]
async fn test_hide_rules_newest_first_and_scoped_to_user() {
    let t = test_db().await;
    let older = t.db.create_hide_rule(1, "older", "{}", true).await.unwrap();
    let newer = t.db.create_hide_rule(1, "newer", "{}", false).await.unwrap();
    t.db.create_hide_rule(2, "other user", "{}", true).await.unwrap();

    let rules = t.db.list_hide_rules(1).await.unwrap();
    let ids: Vec<i64> = rules.iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![newer, older]);
    assert!(!rules[0].enabled);

    t.db.set_hide_rule_enabled(newer, true).await.unwrap();
    t.db.delete_hide_rule(older).await.unwrap();
    let rules = t.db.list_hide_rules(1).await.unwrap();
    assert_eq!(rules.len(), 1);
    assert!(rules[0].enabled);
}

#[tokio::test]
async fn test_rule_updates_on_missing_rule_are_not_found() {
    let t = test_db().await;
    assert!(matches!(
        t.db.set_hide_rule_enabled(99, true).await,
        Err(AppError::NotFound(_))
    ));
    assert!(matches!(
        t.db.delete_hide_rule(99).await,
        Err(AppError::NotFound(_))
    ));
}
