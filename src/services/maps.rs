// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Map feature lookups used by stop analysis.

use crate::error::AppError;
use crate::models::{Feature, Road};
use async_trait::async_trait;

/// Points of interest and road geometry around a coordinate.
#[async_trait]
pub trait MapFeatureProvider: Send + Sync {
    /// Features (traffic signals at least) near a point.
    async fn nearby_features(&self, lat: f64, lon: f64) -> Result<Vec<Feature>, AppError>;

    /// Roads with their polylines within `radius_m` of a point.
    async fn fetch_nearby_roads(
        &self,
        lat: f64,
        lon: f64,
        radius_m: f64,
    ) -> Result<Vec<Road>, AppError>;
}
