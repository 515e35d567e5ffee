// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application error types with consistent API responses.

use crate::rules::RuleError;
use crate::services::strava::StravaApiError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::time::Duration;

/// Application error type that converts to HTTP responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Invalid rule: {0}")]
    Rule(#[from] RuleError),

    /// Transport or decoding failure talking to Strava.
    #[error("Strava API error: {0}")]
    StravaApi(String),

    /// Strava answered with a non-success status.
    #[error("{0}")]
    StravaStatus(#[from] StravaApiError),

    #[error("Map provider error: {0}")]
    MapProvider(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// True when Strava rejected the call with HTTP 429.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, AppError::StravaStatus(e) if e.status == 429)
    }

    /// How long Strava asked us to wait, if it said.
    pub fn rate_limit_backoff(&self) -> Option<Duration> {
        match self {
            AppError::StravaStatus(e) => e.rate_limit.backoff(chrono::Utc::now()),
            _ => None,
        }
    }
}

/// JSON error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, details) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", Some(msg.clone())),
            AppError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, "bad_request", Some(msg.clone()))
            }
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, "forbidden", Some(msg.clone())),
            AppError::Rule(err) => (StatusCode::BAD_REQUEST, "invalid_rule", Some(err.to_string())),
            AppError::StravaApi(msg) => {
                (StatusCode::BAD_GATEWAY, "strava_error", Some(msg.clone()))
            }
            AppError::StravaStatus(err) if err.status == 429 => (
                StatusCode::SERVICE_UNAVAILABLE,
                "strava_rate_limited",
                Some(err.to_string()),
            ),
            AppError::StravaStatus(err) => {
                (StatusCode::BAD_GATEWAY, "strava_error", Some(err.to_string()))
            }
            AppError::MapProvider(msg) => {
                (StatusCode::BAD_GATEWAY, "map_provider_error", Some(msg.clone()))
            }
            AppError::Database(msg) => {
                tracing::error!(error = %msg, "Database error");
                (StatusCode::INTERNAL_SERVER_ERROR, "database_error", None)
            }
            AppError::Internal(err) => {
                tracing::error!(error = %err, "Internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None)
            }
        };

        let body = ErrorResponse {
            error: error.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for handlers
pub type Result<T> = std::result::Result<T, AppError>;
