// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! SQLite persistence backend.
//!
//! Single database file holding every attribute's records. Rows are stored
//! as JSON string arrays so the schema stays independent of the value
//! layout; one transaction per `save` call gives the whole-call-or-nothing
//! crash semantics the sink contract requires.
//!
//! Thread-safe via internal Mutex (the SQLite `Connection` is not `Sync`).
//!
//! # Schema
//!
//! ```sql
//! CREATE TABLE records (
//!     id   INTEGER PRIMARY KEY AUTOINCREMENT,
//!     name TEXT NOT NULL,
//!     row  TEXT NOT NULL
//! );
//! CREATE INDEX idx_records_name ON records(name);
//! ```

use std::path::Path;
use std::sync::Mutex;

use rusqlite::{params, Connection};

use crate::storage::sink::{PersistentSink, SinkError};

/// SQLite-backed sink.
pub struct SqliteSink {
    conn: Mutex<Connection>,
}

impl SqliteSink {
    /// Open (or create) a database file.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, SinkError> {
        let conn = Connection::open(path)?;
        let sink = SqliteSink {
            conn: Mutex::new(conn),
        };
        sink.init_schema()?;
        Ok(sink)
    }

    /// In-memory database, for tests.
    pub fn new_in_memory() -> Result<Self, SinkError> {
        let conn = Connection::open_in_memory()?;
        let sink = SqliteSink {
            conn: Mutex::new(conn),
        };
        sink.init_schema()?;
        Ok(sink)
    }

    fn init_schema(&self) -> Result<(), SinkError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "CREATE TABLE IF NOT EXISTS records (
                id   INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                row  TEXT NOT NULL
            )",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_records_name ON records(name)",
            [],
        )?;
        Ok(())
    }
}

impl PersistentSink for SqliteSink {
    fn save(&self, name: &str, _header: &[&str], body: Vec<Vec<String>>) -> Result<(), SinkError> {
        if body.is_empty() {
            return Ok(());
        }

        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        {
            let mut insert = tx.prepare("INSERT INTO records (name, row) VALUES (?1, ?2)")?;
            for row in &body {
                let encoded = serde_json::to_string(row).map_err(|e| SinkError::Corrupt {
                    name: name.to_string(),
                    reason: e.to_string(),
                })?;
                insert.execute(params![name, encoded])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn load(&self, name: &str) -> Result<Vec<Vec<String>>, SinkError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT row FROM records WHERE name = ?1 ORDER BY id ASC")?;

        let encoded = stmt
            .query_map([name], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        encoded
            .into_iter()
            .map(|text| {
                serde_json::from_str(&text).map_err(|e| SinkError::Corrupt {
                    name: name.to_string(),
                    reason: e.to_string(),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_save_and_load_preserves_order() {
        let sink = SqliteSink::new_in_memory().unwrap();

        sink.save("dev/t", &["a"], vec![row(&["1"]), row(&["2"])])
            .unwrap();
        sink.save("dev/t", &["a"], vec![row(&["3"])]).unwrap();

        let rows = sink.load("dev/t").unwrap();
        assert_eq!(rows, vec![row(&["1"]), row(&["2"]), row(&["3"])]);
    }

    #[test]
    fn test_names_do_not_mix() {
        let sink = SqliteSink::new_in_memory().unwrap();

        sink.save("dev/a", &["v"], vec![row(&["1"])]).unwrap();
        sink.save("dev/b", &["v"], vec![row(&["2"])]).unwrap();

        assert_eq!(sink.load("dev/a").unwrap(), vec![row(&["1"])]);
        assert_eq!(sink.load("dev/b").unwrap(), vec![row(&["2"])]);
    }

    #[test]
    fn test_load_unknown_name_is_empty() {
        let sink = SqliteSink::new_in_memory().unwrap();
        assert!(sink.load("dev/none").unwrap().is_empty());
    }

    #[test]
    fn test_file_backed_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.db");
        {
            let sink = SqliteSink::new(&path).unwrap();
            sink.save("dev/t", &["v"], vec![row(&["42"])]).unwrap();
        }
        let sink = SqliteSink::new(&path).unwrap();
        assert_eq!(sink.load("dev/t").unwrap(), vec![row(&["42"])]);
    }

    #[test]
    fn test_commas_and_quotes_survive_json_rows() {
        let sink = SqliteSink::new_in_memory().unwrap();
        sink.save("dev/t", &["v"], vec![row(&["a,\"b\",c"])]).unwrap();
        assert_eq!(sink.load("dev/t").unwrap(), vec![row(&["a,\"b\",c"])]);
    }
}
