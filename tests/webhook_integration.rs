// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Integration tests for webhook handling.

mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use common::create_test_app;
use serde_json::json;
use tower::ServiceExt;
use weirdstats::config::Config;

fn config_with_token() -> Config {
    Config {
        strava_verify_token: Some("test_verify_token".to_string()),
        ..Config::default()
    }
}

fn post_event(body: String) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/webhook")
        .header("Content-Type", "application/json")
        .body(Body::from(body))
        .unwrap()
}

#[tokio::test]
async fn test_webhook_verification() {
    let (app, _state, _db) = create_test_app(config_with_token()).await;

    let response = app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/webhook?hub.mode=subscribe&hub.challenge=test_challenge_123&hub.verify_token=test_verify_token")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), 1024)
        .await
        .unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["hub.challenge"], "test_challenge_123");
}

#[tokio::test]
async fn test_webhook_verification_wrong_token() {
    let (app, _state, _db) = create_test_app(config_with_token()).await;

    let response = app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/webhook?hub.mode=subscribe&hub.challenge=abc&hub.verify_token=wrong_token")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_webhook_verification_without_configured_token() {
    let (app, _state, _db) = create_test_app(Config::default()).await;

    let response = app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/webhook?hub.challenge=abc&hub.verify_token=anything")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_webhook_verification_missing_challenge() {
    let (app, _state, _db) = create_test_app(config_with_token()).await;

    let response = app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/webhook?hub.verify_token=test_verify_token")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_activity_create_is_recorded_and_queued() {
    let (app, state, _db) = create_test_app(Config::default()).await;

    let event = json!({
        "object_type": "activity",
        "object_id": 12345678,
        "aspect_type": "create",
        "owner_id": 98765,
        "subscription_id": 1,
        "event_time": 1704067200
    });

    let response = app.oneshot(post_event(event.to_string())).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(state.db.count_webhook_events().await.unwrap(), 1);
    assert_eq!(state.db.pending_activity_ids().await.unwrap(), vec![12345678]);
}

#[tokio::test]
async fn test_activity_update_is_queued_but_delete_is_only_recorded() {
    let (app, state, _db) = create_test_app(Config::default()).await;

    for (id, aspect) in [(1, "update"), (2, "delete")] {
        let event = json!({
            "object_type": "activity",
            "object_id": id,
            "aspect_type": aspect,
            "owner_id": 98765
        });
        let response = app
            .clone()
            .oneshot(post_event(event.to_string()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    assert_eq!(state.db.count_webhook_events().await.unwrap(), 2);
    assert_eq!(state.db.pending_activity_ids().await.unwrap(), vec![1]);
}

#[tokio::test]
async fn test_athlete_event_is_not_queued() {
    let (app, state, _db) = create_test_app(Config::default()).await;

    let event = json!({
        "object_type": "athlete",
        "object_id": 98765,
        "aspect_type": "update",
        "owner_id": 98765,
        "updates": {"authorized": "false"}
    });
    let response = app.oneshot(post_event(event.to_string())).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(state.db.count_webhook_events().await.unwrap(), 1);
    assert_eq!(state.db.count_pending_queue().await.unwrap(), 0);
}

#[tokio::test]
async fn test_malformed_event_is_rejected() {
    let (app, state, _db) = create_test_app(Config::default()).await;

    let response = app
        .clone()
        .oneshot(post_event("{not json".to_string()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let missing_owner = json!({
        "object_type": "activity",
        "object_id": 1,
        "aspect_type": "create"
    });
    let response = app
        .oneshot(post_event(missing_owner.to_string()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    assert_eq!(state.db.count_webhook_events().await.unwrap(), 0);
}
