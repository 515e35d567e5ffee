// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! HTTP surface: health, the Strava webhook, and the rules/jobs API.

pub mod api;
pub mod webhook;

use crate::error::AppError;
use crate::AppState;
use axum::{http::Uri, routing::get, Json, Router};
use serde::Serialize;
use std::sync::Arc;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    /// `BUILD_ID` at compile time, else the crate version
    pub build_id: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        build_id: option_env!("BUILD_ID").unwrap_or(env!("CARGO_PKG_VERSION")),
    })
}

/// Unknown paths get the same JSON error body as everything else.
async fn not_found(uri: Uri) -> AppError {
    AppError::NotFound(format!("no route for {}", uri.path()))
}

/// Build the service router over shared state.
pub fn create_router(state: Arc<AppState>) -> Router {
    let trace = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_response(DefaultOnResponse::new().level(Level::INFO));

    Router::new()
        .route("/health", get(health))
        .merge(webhook::routes())
        .merge(api::routes())
        .fallback(not_found)
        .layer(trace)
        .with_state(state)
}
