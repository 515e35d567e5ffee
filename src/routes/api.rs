// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! JSON API for hide rules and backfill jobs.

use crate::error::{AppError, Result};
use crate::models::{Job, NewJob};
use crate::rules::{self, Metadata};
use crate::services::jobs::{SyncSincePayload, JOB_TYPE_SYNC_ACTIVITIES_SINCE, JOB_TYPE_SYNC_LATEST};
use crate::time_utils::format_utc_rfc3339;
use crate::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/rules/metadata", get(get_rules_metadata))
        .route("/api/rules", get(list_rules).post(create_rule))
        .route("/api/rules/{id}", axum::routing::delete(delete_rule))
        .route("/api/rules/{id}/enabled", post(set_rule_enabled))
        .route("/api/jobs", get(list_jobs).post(create_job))
}

// ─── Rules ───────────────────────────────────────────────────

async fn get_rules_metadata(State(state): State<Arc<AppState>>) -> Json<Metadata> {
    Json(rules::build_metadata(&state.registry))
}

#[derive(Deserialize)]
struct RulesQuery {
    user_id: i64,
}

#[derive(Serialize)]
pub struct RuleResponse {
    pub id: i64,
    pub name: String,
    pub enabled: bool,
    /// Stored rule JSON, or null if it no longer parses
    pub rule: Option<serde_json::Value>,
    /// Human-readable rendering; empty for unparseable rules
    pub description: String,
    pub created_at: String,
}

async fn list_rules(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RulesQuery>,
) -> Result<Json<Vec<RuleResponse>>> {
    let rows = state.db.list_hide_rules(query.user_id).await?;

    let rules = rows
        .into_iter()
        .map(|row| {
            let parsed = rules::parse_rule_json(&row.condition).ok();
            RuleResponse {
                id: row.id,
                name: row.name,
                enabled: row.enabled,
                rule: parsed
                    .as_ref()
                    .and_then(|r| serde_json::to_value(r).ok()),
                description: parsed
                    .as_ref()
                    .map(|r| rules::describe(r, &state.registry))
                    .unwrap_or_default(),
                created_at: format_utc_rfc3339(row.created_at),
            }
        })
        .collect();

    Ok(Json(rules))
}

#[derive(Deserialize)]
struct CreateRuleRequest {
    user_id: i64,
    #[serde(default)]
    name: String,
    rule: serde_json::Value,
    #[serde(default = "default_enabled")]
    enabled: bool,
}

fn default_enabled() -> bool {
    true
}

#[derive(Serialize)]
pub struct CreatedResponse {
    pub id: i64,
}

/// Validate and store a rule. Invalid rules never reach the store.
async fn create_rule(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateRuleRequest>,
) -> Result<(StatusCode, Json<CreatedResponse>)> {
    let rule = rules::parse_rule_json(&req.rule.to_string())?;
    rules::validate_rule(&rule, &state.registry)?;

    let name = match req.name.trim() {
        "" => rules::describe(&rule, &state.registry),
        name => name.to_string(),
    };
    let condition = serde_json::to_string(&rule).map_err(|e| AppError::Internal(e.into()))?;

    let id = state
        .db
        .create_hide_rule(req.user_id, &name, &condition, req.enabled)
        .await?;
    tracing::info!(rule_id = id, user_id = req.user_id, "Hide rule created");

    Ok((StatusCode::CREATED, Json(CreatedResponse { id })))
}

#[derive(Deserialize)]
struct EnabledRequest {
    enabled: bool,
}

async fn set_rule_enabled(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(req): Json<EnabledRequest>,
) -> Result<StatusCode> {
    state.db.set_hide_rule_enabled(id, req.enabled).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn delete_rule(State(state): State<Arc<AppState>>, Path(id): Path<i64>) -> Result<StatusCode> {
    state.db.delete_hide_rule(id).await?;
    tracing::info!(rule_id = id, "Hide rule deleted");
    Ok(StatusCode::NO_CONTENT)
}

// ─── Jobs ────────────────────────────────────────────────────

#[derive(Deserialize)]
struct CreateJobRequest {
    #[serde(rename = "type")]
    job_type: String,
    #[serde(default)]
    user_id: i64,
    #[serde(default)]
    after_unix: i64,
    #[serde(default)]
    per_page: u32,
    max_attempts: Option<i64>,
}

async fn create_job(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateJobRequest>,
) -> Result<(StatusCode, Json<CreatedResponse>)> {
    let payload = match req.job_type.as_str() {
        JOB_TYPE_SYNC_ACTIVITIES_SINCE => serde_json::to_string(&SyncSincePayload {
            user_id: req.user_id,
            after_unix: req.after_unix,
            per_page: req.per_page,
        })
        .map_err(|e| AppError::Internal(e.into()))?,
        JOB_TYPE_SYNC_LATEST => "{}".to_string(),
        other => {
            return Err(AppError::BadRequest(format!("unknown job type: {}", other)));
        }
    };

    let id = state
        .db
        .create_job(&NewJob {
            max_attempts: req.max_attempts,
            ..NewJob::new(req.job_type.clone(), payload)
        })
        .await?;
    tracing::info!(job_id = id, job_type = %req.job_type, "Job created");

    Ok((StatusCode::CREATED, Json(CreatedResponse { id })))
}

#[derive(Deserialize)]
struct JobsQuery {
    #[serde(default = "default_jobs_limit")]
    limit: i64,
}

fn default_jobs_limit() -> i64 {
    50
}

const MAX_JOBS_LIMIT: i64 = 500;

async fn list_jobs(
    State(state): State<Arc<AppState>>,
    Query(query): Query<JobsQuery>,
) -> Result<Json<Vec<Job>>> {
    let limit = query.limit.clamp(1, MAX_JOBS_LIMIT);
    Ok(Json(state.db.list_jobs(limit).await?))
}
