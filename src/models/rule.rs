// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Stored hide rule.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A user-owned hide rule as stored. `condition` holds the rule JSON,
/// which is parsed and validated again at evaluation time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HideRule {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
    pub condition: String,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
