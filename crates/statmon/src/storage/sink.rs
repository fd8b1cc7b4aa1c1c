// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Persistent tier abstraction.
//!
//! Backend-agnostic interface for the durable store behind every value
//! store. Records are opaque string rows under a record name (the attribute
//! full name); the storage layer never inspects the backing medium.
//!
//! # Implementations
//!
//! - [`FileSink`](super::FileSink) -- CSV file per attribute, the default
//! - [`SqliteSink`](super::SqliteSink) -- single-database-file backend

use thiserror::Error;

/// Persistent tier failure.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("corrupt record under {name:?}: {reason}")]
    Corrupt { name: String, reason: String },
}

/// Durable append-only record store.
///
/// # Contract
///
/// - `save` atomically appends a record set under `name`: after a crash
///   either the whole call is visible or none of it.
/// - `load` returns every row ever saved under `name` in insertion order.
/// - After `save` returns, the data survives process restart.
pub trait PersistentSink: Send + Sync {
    /// Append `body` rows under `name`. `header` describes the columns and
    /// is written once per record name.
    fn save(&self, name: &str, header: &[&str], body: Vec<Vec<String>>) -> Result<(), SinkError>;

    /// All rows previously saved under `name`, oldest first.
    fn load(&self, name: &str) -> Result<Vec<Vec<String>>, SinkError>;
}
