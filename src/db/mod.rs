// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Database layer (SQLite).

pub mod sqlite;

pub use sqlite::SqliteDb;
