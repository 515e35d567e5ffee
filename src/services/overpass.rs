// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Overpass API client for traffic signals, POIs and road geometry.
//!
//! Responses are cached per query string for a configurable TTL. Failed
//! queries are retried with exponential backoff, cycling through mirror
//! endpoints, but only for overload-type failures (429/502/503/504,
//! timeouts and connection errors). Backoff sleeps end early when the
//! client's cancellation token fires. Expired cache entries are dropped
//! whenever a fresh response is stored.

use crate::error::AppError;
use crate::models::{BBox, Feature, FeatureType, LatLon, Poi, Road};
use crate::services::maps::MapFeatureProvider;
use crate::services::scheduler::sleep_or_cancel;
use async_trait::async_trait;
use dashmap::DashMap;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

pub const DEFAULT_OVERPASS_URL: &str = "https://overpass-api.de/api/interpreter";

const DEFAULT_MAX_ATTEMPTS: u32 = 5;
const DEFAULT_BACKOFF_BASE: Duration = Duration::from_secs(1);
/// Search radius for traffic signals around a stop.
const SIGNAL_RADIUS_M: u32 = 40;
const MAX_ERROR_BODY: usize = 512;

#[derive(Debug, Clone, Deserialize)]
struct Element {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    id: i64,
    #[serde(default)]
    lat: f64,
    #[serde(default)]
    lon: f64,
    #[serde(default)]
    center: Option<LatLon>,
    #[serde(default)]
    tags: HashMap<String, String>,
    #[serde(default)]
    geometry: Vec<LatLon>,
}

#[derive(Deserialize)]
struct OverpassResponse {
    #[serde(default)]
    elements: Vec<Element>,
}

struct CacheEntry {
    elements: Arc<Vec<Element>>,
    expires_at: Instant,
}

/// Failure of a single query attempt.
struct AttemptError {
    retryable: bool,
    message: String,
}

/// Overpass client with a shared response cache.
#[derive(Clone)]
pub struct OverpassClient {
    http: reqwest::Client,
    endpoints: Vec<String>,
    cache_ttl: Duration,
    max_attempts: u32,
    backoff_base: Duration,
    cancel: CancellationToken,
    cache: Arc<DashMap<String, CacheEntry>>,
}

impl OverpassClient {
    /// `endpoints` are tried round-robin; an empty list means the public
    /// instance. A zero `cache_ttl` disables caching.
    pub fn new(
        endpoints: Vec<String>,
        timeout: Duration,
        cache_ttl: Duration,
    ) -> Result<Self, AppError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::MapProvider(format!("Failed to build HTTP client: {}", e)))?;

        let endpoints = if endpoints.is_empty() {
            vec![DEFAULT_OVERPASS_URL.to_string()]
        } else {
            endpoints
        };

        Ok(Self {
            http,
            endpoints,
            cache_ttl,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff_base: DEFAULT_BACKOFF_BASE,
            cancel: CancellationToken::new(),
            cache: Arc::new(DashMap::new()),
        })
    }

    /// Override the retry policy.
    pub fn with_retry(mut self, max_attempts: u32, backoff_base: Duration) -> Self {
        self.max_attempts = max_attempts.max(1);
        self.backoff_base = backoff_base;
        self
    }

    /// Abandon retry backoff once `cancel` fires.
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Number of queries currently held in the response cache.
    pub fn cached_queries(&self) -> usize {
        self.cache.len()
    }

    /// Traffic signals and food amenities inside `bbox`.
    pub async fn fetch_pois(
        &self,
        bbox: BBox,
        traffic_lights: bool,
        food: bool,
    ) -> Result<Vec<Poi>, AppError> {
        if !traffic_lights && !food {
            return Err(AppError::BadRequest(
                "no feature types requested".to_string(),
            ));
        }

        let mut selectors = Vec::new();
        if traffic_lights {
            selectors.push(format!(r#"node["highway"="traffic_signals"]({});"#, bbox));
        }
        if food {
            selectors.push(format!(
                r#"node["amenity"~"^(cafe|restaurant|fast_food|bar)$"]({});"#,
                bbox
            ));
        }
        let query = format!(
            "[out:json][timeout:25];\n(\n{}\n);\nout center;",
            selectors.join("\n")
        );

        let elements = self.fetch_with_cache(&query).await?;
        Ok(elements
            .iter()
            .map(|el| {
                let (lat, lon) = match el.center {
                    Some(c) => (c.lat, c.lon),
                    None => (el.lat, el.lon),
                };
                Poi {
                    feature: Feature {
                        feature_type: classify_poi(&el.tags),
                        name: el.tags.get("name").cloned().unwrap_or_default(),
                    },
                    lat,
                    lon,
                    tags: el.tags.clone(),
                }
            })
            .collect())
    }

    async fn fetch_with_cache(&self, query: &str) -> Result<Arc<Vec<Element>>, AppError> {
        let caching = !self.cache_ttl.is_zero();
        if caching {
            let hit = self
                .cache
                .get(query)
                .filter(|entry| entry.expires_at > Instant::now())
                .map(|entry| entry.elements.clone());
            if let Some(elements) = hit {
                return Ok(elements);
            }
        }

        let elements = Arc::new(self.run_query_with_retry(query).await?);

        if caching {
            let now = Instant::now();
            self.cache.retain(|_, entry| entry.expires_at > now);
            self.cache.insert(
                query.to_string(),
                CacheEntry {
                    elements: elements.clone(),
                    expires_at: now + self.cache_ttl,
                },
            );
        }
        Ok(elements)
    }

    async fn run_query_with_retry(&self, query: &str) -> Result<Vec<Element>, AppError> {
        let mut last_error = String::new();

        for attempt in 0..self.max_attempts {
            let endpoint = &self.endpoints[attempt as usize % self.endpoints.len()];
            match self.run_query_once(endpoint, query).await {
                Ok(elements) => return Ok(elements),
                Err(err) => {
                    last_error = err.message;
                    if !err.retryable || attempt + 1 == self.max_attempts {
                        break;
                    }
                    let sleep = self.backoff_base * (1u32 << attempt.min(16));
                    tracing::warn!(
                        endpoint = %endpoint,
                        attempt = attempt + 1,
                        sleep_ms = sleep.as_millis() as u64,
                        error = %last_error,
                        "Overpass query failed, retrying"
                    );
                    if !sleep_or_cancel(sleep, &self.cancel).await {
                        return Err(AppError::MapProvider(format!(
                            "overpass retry cancelled: {}",
                            last_error
                        )));
                    }
                }
            }
        }

        Err(AppError::MapProvider(last_error))
    }

    async fn run_query_once(&self, endpoint: &str, query: &str) -> Result<Vec<Element>, AttemptError> {
        let response = self
            .http
            .get(endpoint)
            .query(&[("data", query)])
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| AttemptError {
                retryable: e.is_timeout() || e.is_connect(),
                message: format!("overpass request failed: {}", e),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let body: String = body.trim().chars().take(MAX_ERROR_BODY).collect();
            return Err(AttemptError {
                retryable: matches!(status.as_u16(), 429 | 502 | 503 | 504),
                message: format!("overpass status {}: {}", status.as_u16(), body),
            });
        }

        let decoded: OverpassResponse = response.json().await.map_err(|e| AttemptError {
            retryable: e.is_timeout(),
            message: format!("overpass decode failed: {}", e),
        })?;
        Ok(decoded.elements)
    }
}

#[async_trait]
impl MapFeatureProvider for OverpassClient {
    async fn nearby_features(&self, lat: f64, lon: f64) -> Result<Vec<Feature>, AppError> {
        let query = format!(
            "[out:json][timeout:25];\n(\n  node(around:{},{:.6},{:.6})[\"highway\"=\"traffic_signals\"];\n);\nout body;",
            SIGNAL_RADIUS_M, lat, lon
        );

        let elements = self.fetch_with_cache(&query).await?;
        Ok(elements
            .iter()
            .filter(|el| el.tags.get("highway").map(String::as_str) == Some("traffic_signals"))
            .map(|el| Feature {
                feature_type: FeatureType::TrafficLight,
                name: el.tags.get("name").cloned().unwrap_or_default(),
            })
            .collect())
    }

    async fn fetch_nearby_roads(
        &self,
        lat: f64,
        lon: f64,
        radius_m: f64,
    ) -> Result<Vec<Road>, AppError> {
        let query = format!(
            "[out:json][timeout:25];\nway(around:{:.0},{:.6},{:.6})[\"highway\"];\nout geom;",
            radius_m, lat, lon
        );

        let elements = self.fetch_with_cache(&query).await?;
        Ok(elements
            .iter()
            .filter(|el| el.kind == "way")
            .map(|el| Road {
                id: el.id,
                name: el.tags.get("name").cloned().unwrap_or_default(),
                highway: el.tags.get("highway").cloned().unwrap_or_default(),
                geometry: el.geometry.clone(),
            })
            .collect())
    }
}

fn classify_poi(tags: &HashMap<String, String>) -> FeatureType {
    match tags.get("amenity").map(String::as_str) {
        Some("cafe") => FeatureType::Cafe,
        Some("restaurant") => FeatureType::Restaurant,
        Some("fast_food") => FeatureType::FastFood,
        Some("bar") => FeatureType::Bar,
        other => {
            if tags.get("highway").map(String::as_str) == Some("traffic_signals") {
                FeatureType::TrafficLight
            } else {
                FeatureType::Other(other.unwrap_or_default().to_string())
            }
        }
    }
}
