// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Filesystem persistence backend.
//!
//! One CSV file per record name under a root directory. The record name
//! `device/attribute` maps to `<root>/device/attribute.csv`; the header line
//! is written when the file is created and every `save` call appends its
//! rows in a single buffered write.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use crate::storage::sink::{PersistentSink, SinkError};

/// CSV-per-attribute filesystem sink.
pub struct FileSink {
    root: PathBuf,
}

impl FileSink {
    /// Open a sink rooted at `root`, creating the directory if needed.
    ///
    /// `purge` wipes everything under the root first -- the restart-time
    /// purge is the only point at which persisted data is ever deleted.
    pub fn new<P: AsRef<Path>>(root: P, purge: bool) -> Result<Self, SinkError> {
        let root = root.as_ref().to_path_buf();
        if purge && root.exists() {
            fs::remove_dir_all(&root)?;
        }
        fs::create_dir_all(&root)?;
        Ok(FileSink { root })
    }

    fn record_path(&self, name: &str) -> PathBuf {
        let mut path = self.root.clone();
        for part in name.split('/') {
            path.push(sanitize(part));
        }
        path.set_extension("csv");
        path
    }
}

/// Keeps record names from escaping the root or colliding with path syntax.
fn sanitize(part: &str) -> String {
    part.chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn escape_field(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn split_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '"' if quoted && chars.peek() == Some(&'"') => {
                chars.next();
                current.push('"');
            }
            '"' => quoted = !quoted,
            ',' if !quoted => fields.push(std::mem::take(&mut current)),
            c => current.push(c),
        }
    }
    fields.push(current);
    fields
}

impl PersistentSink for FileSink {
    fn save(&self, name: &str, header: &[&str], body: Vec<Vec<String>>) -> Result<(), SinkError> {
        if body.is_empty() {
            return Ok(());
        }

        let path = self.record_path(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let fresh = !path.exists();
        let mut buffer = String::new();
        if fresh {
            buffer.push_str(&header.join(","));
            buffer.push('\n');
        }
        for row in &body {
            let escaped: Vec<String> = row.iter().map(|f| escape_field(f)).collect();
            buffer.push_str(&escaped.join(","));
            buffer.push('\n');
        }

        // One write_all per call keeps a crashed append from interleaving
        // with a concurrent save of the same record.
        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        file.write_all(buffer.as_bytes())?;
        file.flush()?;
        Ok(())
    }

    fn load(&self, name: &str) -> Result<Vec<Vec<String>>, SinkError> {
        let path = self.record_path(name);
        if !path.exists() {
            return Ok(Vec::new());
        }

        let reader = BufReader::new(File::open(&path)?);
        let mut rows = Vec::new();
        for (index, line) in reader.lines().enumerate() {
            let line = line?;
            if index == 0 || line.is_empty() {
                continue; // header
            }
            rows.push(split_line(&line));
        }
        Ok(rows)
    }
}
