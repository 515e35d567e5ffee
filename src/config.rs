// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application configuration loaded from environment variables.
//!
//! A `.env` file in the working directory is honored for local runs.

use crate::services::overpass::DEFAULT_OVERPASS_URL;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_STRAVA_BASE_URL: &str = "https://www.strava.com/api/v3";

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// sqlite database file
    pub database_path: PathBuf,
    /// Server port
    pub port: u16,

    // --- Upstream activity API ---
    pub strava_base_url: String,
    /// Bearer token for all upstream calls
    pub strava_access_token: Option<String>,
    pub strava_timeout: Duration,
    /// Webhook subscription verify token; unset accepts any token
    pub strava_verify_token: Option<String>,

    // --- Map feature provider ---
    /// Endpoints tried round-robin
    pub overpass_urls: Vec<String>,
    pub overpass_timeout: Duration,
    /// Zero disables the response cache
    pub overpass_cache_ttl: Duration,

    // --- Background loops ---
    pub worker_poll_interval: Duration,
    pub job_stale_after: Duration,

    // --- Stop detection ---
    /// m/s
    pub stop_speed_threshold: f64,
    pub stop_min_duration: Duration,
}

impl Default for Config {
    /// Default config for testing only.
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("weirdstats.db"),
            port: 8080,
            strava_base_url: DEFAULT_STRAVA_BASE_URL.to_string(),
            strava_access_token: None,
            strava_timeout: Duration::from_secs(30),
            strava_verify_token: None,
            overpass_urls: vec![DEFAULT_OVERPASS_URL.to_string()],
            overpass_timeout: Duration::from_secs(15),
            overpass_cache_ttl: Duration::from_secs(24 * 3600),
            worker_poll_interval: Duration::from_millis(2000),
            job_stale_after: Duration::from_secs(600),
            stop_speed_threshold: 0.5,
            stop_min_duration: Duration::from_secs(60),
        }
    }
}

impl Config {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a config from an arbitrary variable lookup. Unset and empty
    /// variables take their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let defaults = Self::default();

        let overpass_urls = match get("OVERPASS_URLS") {
            Some(list) => list
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect(),
            None => vec![get("OVERPASS_URL").unwrap_or_else(|| DEFAULT_OVERPASS_URL.to_string())],
        };

        Ok(Self {
            database_path: get("DATABASE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.database_path),
            port: parse(&get, "PORT")?.unwrap_or(defaults.port),
            strava_base_url: get("STRAVA_BASE_URL")
                .map(|u| u.trim_end_matches('/').to_string())
                .unwrap_or(defaults.strava_base_url),
            strava_access_token: get("STRAVA_ACCESS_TOKEN"),
            strava_timeout: parse(&get, "STRAVA_TIMEOUT_SECONDS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.strava_timeout),
            strava_verify_token: get("STRAVA_VERIFY_TOKEN"),
            overpass_urls,
            overpass_timeout: parse(&get, "OVERPASS_TIMEOUT_SECONDS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.overpass_timeout),
            overpass_cache_ttl: parse::<u64, _>(&get, "OVERPASS_CACHE_HOURS")?
                .map(|h| Duration::from_secs(h * 3600))
                .unwrap_or(defaults.overpass_cache_ttl),
            worker_poll_interval: parse(&get, "WORKER_POLL_INTERVAL_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.worker_poll_interval),
            job_stale_after: parse(&get, "JOB_STALE_AFTER_SECONDS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.job_stale_after),
            stop_speed_threshold: parse(&get, "STOP_SPEED_THRESHOLD")?
                .unwrap_or(defaults.stop_speed_threshold),
            stop_min_duration: parse(&get, "STOP_MIN_DURATION_SECONDS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.stop_min_duration),
        })
    }
}

fn parse<T, G>(get: &G, key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    get(key)
        .map(|raw| {
            raw.parse().map_err(|_| ConfigError::Invalid {
                key,
                value: raw.clone(),
            })
        })
        .transpose()
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = load(&[]).expect("Config should load");

        assert_eq!(config.port, 8080);
        assert_eq!(config.database_path, PathBuf::from("weirdstats.db"));
        assert_eq!(config.strava_base_url, DEFAULT_STRAVA_BASE_URL);
        assert_eq!(config.overpass_urls, vec![DEFAULT_OVERPASS_URL.to_string()]);
        assert_eq!(config.worker_poll_interval, Duration::from_secs(2));
        assert_eq!(config.stop_min_duration, Duration::from_secs(60));
        assert!(config.strava_access_token.is_none());
    }

    #[test]
    fn test_overrides() {
        let config = load(&[
            ("PORT", "9000"),
            ("STRAVA_ACCESS_TOKEN", " abc "),
            ("OVERPASS_CACHE_HOURS", "0"),
            ("STOP_SPEED_THRESHOLD", "1.25"),
            ("JOB_STALE_AFTER_SECONDS", "30"),
        ])
        .expect("Config should load");

        assert_eq!(config.port, 9000);
        assert_eq!(config.strava_access_token.as_deref(), Some("abc"));
        assert!(config.overpass_cache_ttl.is_zero());
        assert_eq!(config.stop_speed_threshold, 1.25);
        assert_eq!(config.job_stale_after, Duration::from_secs(30));
    }

    #[test]
    fn test_mirror_list_overrides_single_url() {
        let config = load(&[
            ("OVERPASS_URL", "http://one"),
            ("OVERPASS_URLS", "http://a, http://b,,"),
        ])
        .expect("Config should load");
        assert_eq!(config.overpass_urls, vec!["http://a", "http://b"]);

        let config = load(&[("OVERPASS_URL", "http://one")]).expect("Config should load");
        assert_eq!(config.overpass_urls, vec!["http://one"]);
    }

    #[test]
    fn test_malformed_number_is_error() {
        let err = load(&[("WORKER_POLL_INTERVAL_MS", "soon")]).unwrap_err();
        assert!(err.to_string().contains("WORKER_POLL_INTERVAL_MS"));
    }
}
