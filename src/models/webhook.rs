// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Recorded upstream webhook event.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookEvent {
    pub object_id: i64,
    /// "activity" or "athlete"
    pub object_type: String,
    /// "create", "update", "delete"
    pub aspect_type: String,
    pub owner_id: i64,
    pub raw_payload: String,
    pub received_at: DateTime<Utc>,
}
