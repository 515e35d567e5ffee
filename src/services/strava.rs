// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Strava API client for fetching activities, streams and activity lists.
//!
//! Handles:
//! - Bearer auth with a single configured access token
//! - Request timeouts
//! - Structured non-2xx errors with rate-limit details, so callers can
//!   back off for as long as Strava asks

use crate::error::AppError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::HeaderMap;
use serde::Deserialize;
use std::fmt;
use std::time::Duration;

/// Longest error body kept on a [`StravaApiError`].
const MAX_ERROR_BODY: usize = 2048;

/// Upstream activity source used by ingestion and backfill jobs.
#[async_trait]
pub trait ActivityFeed: Send + Sync {
    async fn get_activity(&self, activity_id: i64) -> Result<StravaActivity, AppError>;

    async fn get_streams(&self, activity_id: i64) -> Result<StreamSet, AppError>;

    /// One page of the athlete's activities, newest first. `after` and
    /// `before` are unix seconds.
    async fn list_activities(
        &self,
        after: Option<i64>,
        before: Option<i64>,
        page: u32,
        per_page: u32,
    ) -> Result<Vec<ActivitySummary>, AppError>;
}

/// Strava API client.
#[derive(Clone)]
pub struct StravaClient {
    http: reqwest::Client,
    base_url: String,
    access_token: Option<String>,
}

impl StravaClient {
    pub fn new(
        base_url: impl Into<String>,
        access_token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, AppError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::StravaApi(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            access_token,
        })
    }

    /// Generic GET request with JSON response.
    async fn get_json<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, AppError> {
        let url = format!("{}{}", self.base_url, path);

        let mut request = self.http.get(&url).query(query);
        if let Some(token) = &self.access_token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| AppError::StravaApi(e.to_string()))?;

        self.check_response_json(response, "GET").await
    }

    /// Check response and parse JSON body.
    async fn check_response_json<T: for<'de> Deserialize<'de>>(
        &self,
        response: reqwest::Response,
        method: &str,
    ) -> Result<T, AppError> {
        if !response.status().is_success() {
            let err = StravaApiError::from_response(response, method).await;
            if err.status == 429 {
                tracing::warn!(
                    path = %err.path,
                    rate_limit = %err.rate_limit,
                    "Strava rate limit hit (429)"
                );
            }
            return Err(err.into());
        }

        response
            .json()
            .await
            .map_err(|e| AppError::StravaApi(format!("JSON parse error: {}", e)))
    }
}

#[async_trait]
impl ActivityFeed for StravaClient {
    async fn get_activity(&self, activity_id: i64) -> Result<StravaActivity, AppError> {
        self.get_json(&format!("/activities/{}", activity_id), &[])
            .await
    }

    async fn get_streams(&self, activity_id: i64) -> Result<StreamSet, AppError> {
        let raw: RawStreams = self
            .get_json(
                &format!("/activities/{}/streams", activity_id),
                &[
                    ("keys", "latlng,time,velocity_smooth".to_string()),
                    ("key_by_type", "true".to_string()),
                ],
            )
            .await?;
        Ok(raw.into())
    }

    async fn list_activities(
        &self,
        after: Option<i64>,
        before: Option<i64>,
        page: u32,
        per_page: u32,
    ) -> Result<Vec<ActivitySummary>, AppError> {
        let mut query = Vec::new();
        if let Some(after) = after.filter(|&t| t > 0) {
            query.push(("after", after.to_string()));
        }
        if let Some(before) = before.filter(|&t| t > 0) {
            query.push(("before", before.to_string()));
        }
        if page > 0 {
            query.push(("page", page.to_string()));
        }
        if per_page > 0 {
            query.push(("per_page", per_page.to_string()));
        }

        self.get_json("/athlete/activities", &query).await
    }
}

/// Detailed activity response.
#[derive(Debug, Clone, Deserialize)]
pub struct StravaActivity {
    pub id: i64,
    #[serde(default)]
    pub athlete: Option<AthleteRef>,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default)]
    pub activity_type: String,
    pub start_date: DateTime<Utc>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub distance: f64,
    #[serde(default)]
    pub moving_time: i64,
    #[serde(default)]
    pub average_watts: Option<f64>,
    #[serde(default)]
    pub average_heartrate: Option<f64>,
    #[serde(default)]
    pub visibility: Option<String>,
    #[serde(default)]
    pub private: bool,
    #[serde(default)]
    pub hide_from_home: bool,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct AthleteRef {
    pub id: i64,
}

/// Summary activity for list endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct ActivitySummary {
    pub id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default)]
    pub activity_type: String,
    pub start_date: DateTime<Utc>,
}

/// Per-sample streams for one activity.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamSet {
    pub latlng: Vec<[f64; 2]>,
    /// Seconds since the activity start
    pub time: Vec<i64>,
    /// m/s
    pub velocity_smooth: Vec<f64>,
}

#[derive(Deserialize)]
struct RawStream<T> {
    #[serde(default = "Vec::new")]
    data: Vec<T>,
}

/// `key_by_type=true` response shape.
#[derive(Deserialize)]
struct RawStreams {
    #[serde(default)]
    latlng: Option<RawStream<[f64; 2]>>,
    #[serde(default)]
    time: Option<RawStream<i64>>,
    #[serde(default)]
    velocity_smooth: Option<RawStream<f64>>,
}

impl From<RawStreams> for StreamSet {
    fn from(raw: RawStreams) -> Self {
        Self {
            latlng: raw.latlng.map(|s| s.data).unwrap_or_default(),
            time: raw.time.map(|s| s.data).unwrap_or_default(),
            velocity_smooth: raw.velocity_smooth.map(|s| s.data).unwrap_or_default(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Errors and rate limits
// ─────────────────────────────────────────────────────────────────────────────

/// Rate-limit headers from a Strava response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RateLimitInfo {
    pub limit_short: Option<i64>,
    pub limit_long: Option<i64>,
    pub usage_short: Option<i64>,
    pub usage_long: Option<i64>,
    /// `Retry-After` in seconds
    pub retry_after: Option<Duration>,
    /// `Retry-After` as an HTTP date
    pub retry_at: Option<DateTime<Utc>>,
    /// `Retry-After` exactly as sent
    pub retry_after_raw: Option<String>,
}

impl RateLimitInfo {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
        };

        let mut info = Self::default();
        if let Some(limit) = header("X-RateLimit-Limit") {
            (info.limit_short, info.limit_long) = parse_pair(limit);
        }
        if let Some(usage) = header("X-RateLimit-Usage") {
            (info.usage_short, info.usage_long) = parse_pair(usage);
        }
        if let Some(retry) = header("Retry-After") {
            info.retry_after_raw = Some(retry.to_string());
            match retry.parse::<u64>() {
                Ok(secs) if secs > 0 => info.retry_after = Some(Duration::from_secs(secs)),
                Ok(_) => {}
                Err(_) => info.retry_at = crate::time_utils::parse_http_date(retry),
            }
        }
        info
    }

    pub fn has_data(&self) -> bool {
        self.limit_short.is_some()
            || self.limit_long.is_some()
            || self.usage_short.is_some()
            || self.usage_long.is_some()
            || self.retry_after_raw.is_some()
    }

    /// How long Strava asked us to wait, measured from `now`.
    pub fn backoff(&self, now: DateTime<Utc>) -> Option<Duration> {
        if let Some(wait) = self.retry_after {
            return Some(wait);
        }
        self.retry_at
            .and_then(|at| (at - now).to_std().ok())
            .filter(|wait| !wait.is_zero())
    }
}

fn parse_pair(value: &str) -> (Option<i64>, Option<i64>) {
    let mut parts = value.split(',').map(|p| p.trim().parse::<i64>().ok());
    let short = parts.next().flatten();
    let long = parts.next().flatten();
    (short, long)
}

fn usage_limit(usage: Option<i64>, limit: Option<i64>) -> String {
    let show = |v: Option<i64>| v.map_or_else(|| "?".to_string(), |n| n.to_string());
    format!("{}/{}", show(usage), show(limit))
}

impl fmt::Display for RateLimitInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.has_data() {
            return Ok(());
        }
        f.write_str("rate-limit")?;
        if self.usage_short.is_some() || self.limit_short.is_some() {
            write!(f, " short={}", usage_limit(self.usage_short, self.limit_short))?;
        }
        if self.usage_long.is_some() || self.limit_long.is_some() {
            write!(f, " long={}", usage_limit(self.usage_long, self.limit_long))?;
        }
        if let Some(wait) = self.retry_after {
            write!(f, " retry-after={}s", wait.as_secs())?;
        } else if let Some(at) = self.retry_at {
            write!(f, " retry-at={}", crate::time_utils::format_utc_rfc3339(at))?;
        } else if let Some(raw) = &self.retry_after_raw {
            write!(f, " retry-after={}", raw)?;
        }
        Ok(())
    }
}

/// A non-2xx response from Strava.
#[derive(Debug, Clone)]
pub struct StravaApiError {
    pub status: u16,
    pub body: String,
    pub method: String,
    /// Path and query of the failed request
    pub path: String,
    pub request_id: Option<String>,
    pub rate_limit: RateLimitInfo,
}

impl StravaApiError {
    async fn from_response(response: reqwest::Response, method: &str) -> Self {
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let url = response.url();
        let path = match url.query() {
            Some(q) => format!("{}?{}", url.path(), q),
            None => url.path().to_string(),
        };
        let body = response.text().await.unwrap_or_default();

        Self {
            status,
            body: truncate(&body, MAX_ERROR_BODY),
            method: method.to_string(),
            path,
            request_id: headers
                .get("X-Request-Id")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string),
            rate_limit: RateLimitInfo::from_headers(&headers),
        }
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    s[..end].to_string()
}

impl fmt::Display for StravaApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "strava error {}", self.status)?;
        match (self.method.is_empty(), self.path.is_empty()) {
            (false, false) => write!(f, " {} {}", self.method, self.path)?,
            (false, true) => write!(f, " {}", self.method)?,
            (true, false) => write!(f, " {}", self.path)?,
            (true, true) => {}
        }
        let body = self.body.trim();
        if !body.is_empty() {
            write!(f, ": {}", body)?;
        }
        if self.rate_limit.has_data() {
            write!(f, " ({})", self.rate_limit)?;
        }
        if let Some(id) = &self.request_id {
            write!(f, " request_id={}", id)?;
        }
        Ok(())
    }
}

impl std::error::Error for StravaApiError {}
