// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Webhook routes for Strava events.

use crate::error::AppError;
use crate::models::WebhookEvent;
use crate::AppState;
use axum::{
    extract::{Json, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Webhook routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/webhook", get(verify).post(handle_event))
}

/// Strava webhook verification query params.
#[derive(Deserialize)]
struct VerifyParams {
    #[serde(rename = "hub.challenge", default)]
    challenge: String,
    #[serde(rename = "hub.verify_token", default)]
    verify_token: String,
}

/// Verification response.
#[derive(Serialize)]
struct VerifyResponse {
    #[serde(rename = "hub.challenge")]
    challenge: String,
}

/// Verify webhook subscription (GET).
async fn verify(
    State(state): State<Arc<AppState>>,
    Query(params): Query<VerifyParams>,
) -> Result<Json<VerifyResponse>, AppError> {
    if params.challenge.is_empty() {
        return Err(AppError::BadRequest("missing challenge".to_string()));
    }

    if let Some(expected) = &state.config.strava_verify_token {
        if params.verify_token != *expected {
            tracing::warn!("Webhook verification failed: invalid token");
            return Err(AppError::Forbidden("invalid verify token".to_string()));
        }
    }

    tracing::info!("Webhook subscription verified");
    Ok(Json(VerifyResponse {
        challenge: params.challenge,
    }))
}

/// Strava webhook event payload.
#[derive(Deserialize, Debug)]
struct EventPayload {
    #[serde(default)]
    object_type: String, // "activity" or "athlete"
    #[serde(default)]
    object_id: i64,
    #[serde(default)]
    aspect_type: String, // "create", "update", "delete"
    #[serde(default)]
    owner_id: i64,
}

/// Handle incoming webhook events (POST).
///
/// Every well-formed event is recorded; activity creates and updates are
/// also queued for processing.
async fn handle_event(
    State(state): State<Arc<AppState>>,
    body: String,
) -> Result<Response, AppError> {
    let event: EventPayload = serde_json::from_str(&body)
        .map_err(|e| AppError::BadRequest(format!("invalid json: {}", e)))?;

    if event.object_type.is_empty()
        || event.object_id == 0
        || event.aspect_type.is_empty()
        || event.owner_id == 0
    {
        return Err(AppError::BadRequest("missing required fields".to_string()));
    }

    tracing::info!(
        object_type = %event.object_type,
        object_id = event.object_id,
        aspect_type = %event.aspect_type,
        owner_id = event.owner_id,
        "Webhook event received"
    );

    state
        .db
        .insert_webhook_event(&WebhookEvent {
            object_id: event.object_id,
            object_type: event.object_type.clone(),
            aspect_type: event.aspect_type.clone(),
            owner_id: event.owner_id,
            raw_payload: body,
            received_at: Utc::now(),
        })
        .await?;

    match (event.object_type.as_str(), event.aspect_type.as_str()) {
        ("activity", "create") | ("activity", "update") => {
            let queue_id = state.db.enqueue_activity(event.object_id).await?;
            tracing::info!(activity_id = event.object_id, queue_id, "Activity queued");
        }
        _ => {
            tracing::debug!(
                object_type = %event.object_type,
                aspect_type = %event.aspect_type,
                "Ignoring unhandled event type"
            );
        }
    }

    Ok(StatusCode::OK.into_response())
}
