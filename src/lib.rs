// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! weirdstats: derived statistics and hide rules for Strava activities
//!
//! This crate ingests activities from Strava webhooks and backfill jobs,
//! detects stops, traffic lights and road crossings in their GPS traces,
//! and applies user-defined rules that decide which activities to hide.

pub mod config;
pub mod db;
pub mod error;
pub mod gps;
pub mod models;
pub mod routes;
pub mod rules;
pub mod services;
pub mod time_utils;

use config::Config;
use db::SqliteDb;
use rules::Registry;
use std::sync::Arc;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub db: SqliteDb,
    pub registry: Arc<Registry>,
}
