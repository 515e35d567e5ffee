// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! weirdstats server
//!
//! Serves the webhook and rules API, and runs the activity queue worker
//! and the backfill job runner until Ctrl-C.

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use weirdstats::{
    config::Config,
    db::SqliteDb,
    gps::StopOptions,
    rules::Registry,
    services::{
        run_job_runner, run_queue_worker, Ingestor, JobRunner, MapFeatureProvider, OverpassClient,
        PipelineProcessor, QueueWorker, RulesProcessor, StopStatsProcessor, StravaClient,
    },
    AppState,
};

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();

    let config = Config::from_env().expect("Failed to load configuration");
    tracing::info!(port = config.port, "Starting weirdstats");

    let db = SqliteDb::connect(&config.database_path)
        .await
        .expect("Failed to open database");
    tracing::info!(path = %config.database_path.display(), "Database ready");

    let registry = Arc::new(Registry::default());

    if config.strava_access_token.is_none() {
        tracing::warn!("STRAVA_ACCESS_TOKEN not set; upstream calls will be unauthenticated");
    }
    let strava = StravaClient::new(
        config.strava_base_url.clone(),
        config.strava_access_token.clone(),
        config.strava_timeout,
    )
    .expect("Failed to build Strava client");
    let ingestor = Ingestor::new(db.clone(), Arc::new(strava));

    let cancel = CancellationToken::new();

    let overpass = OverpassClient::new(
        config.overpass_urls.clone(),
        config.overpass_timeout,
        config.overpass_cache_ttl,
    )
    .expect("Failed to build Overpass client")
    .with_cancel(cancel.clone());
    let maps: Arc<dyn MapFeatureProvider> = Arc::new(overpass);

    let stop_options = StopOptions {
        speed_threshold: config.stop_speed_threshold,
        min_duration: chrono::Duration::from_std(config.stop_min_duration)
            .expect("STOP_MIN_DURATION_SECONDS out of range"),
    };
    let pipeline = PipelineProcessor::new(
        Some(ingestor.clone()),
        StopStatsProcessor::new(db.clone(), Some(maps), stop_options),
        RulesProcessor::new(db.clone(), registry.clone()),
    );

    let worker = QueueWorker::new(db.clone(), Arc::new(pipeline));
    let runner = JobRunner::new(db.clone(), ingestor).with_stale_after(config.job_stale_after);
    let loops = vec![
        tokio::spawn(run_queue_worker(
            worker,
            config.worker_poll_interval,
            cancel.clone(),
        )),
        tokio::spawn(run_job_runner(
            runner,
            config.worker_poll_interval,
            cancel.clone(),
        )),
    ];

    let state = Arc::new(AppState {
        config: config.clone(),
        db,
        registry,
    });
    let app = weirdstats::routes::create_router(state);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    let shutdown = cancel.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            }
            tracing::info!("Shutdown requested");
            shutdown.cancel();
        })
        .await?;

    cancel.cancel();
    let wait_all = async {
        for handle in loops {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "Background loop panicked");
            }
        }
    };
    match tokio::time::timeout(SHUTDOWN_TIMEOUT, wait_all).await {
        Ok(()) => tracing::info!("Background loops stopped"),
        Err(_) => tracing::warn!(timeout_secs = SHUTDOWN_TIMEOUT.as_secs(), "Shutdown timed out"),
    }
    Ok(())
}

/// Initialize structured JSON logging.
fn init_logging() {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("weirdstats=debug".parse().unwrap())
                .add_directive("info".parse().unwrap()),
        )
        .with(format)
        .init();
}
