// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! In-memory sink, for tests and ephemeral runs.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::storage::sink::{PersistentSink, SinkError};

/// Volatile [`PersistentSink`] keeping records in a process-local map.
///
/// Offers no durability; it exists so storage and engine behavior can be
/// exercised without touching disk. `fail_saves` turns every `save` into an
/// error, for testing the fatal-persistence path.
#[derive(Default)]
pub struct MemorySink {
    records: Mutex<HashMap<String, Vec<Vec<String>>>>,
    fail_saves: bool,
}

impl MemorySink {
    pub fn new() -> Self {
        MemorySink::default()
    }

    /// A sink whose every `save` fails with an I/O error.
    pub fn failing() -> Self {
        MemorySink {
            records: Mutex::new(HashMap::new()),
            fail_saves: true,
        }
    }

    /// Number of rows currently stored under `name`.
    pub fn row_count(&self, name: &str) -> usize {
        self.records.lock().get(name).map_or(0, Vec::len)
    }
}

impl PersistentSink for MemorySink {
    fn save(&self, name: &str, _header: &[&str], body: Vec<Vec<String>>) -> Result<(), SinkError> {
        if self.fail_saves {
            return Err(SinkError::Io(std::io::Error::other("sink configured to fail")));
        }
        self.records
            .lock()
            .entry(name.to_string())
            .or_default()
            .extend(body);
        Ok(())
    }

    fn load(&self, name: &str) -> Result<Vec<Vec<String>>, SinkError> {
        Ok(self.records.lock().get(name).cloned().unwrap_or_default())
    }
}
