// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Attribute value storage: tiered per-attribute stores over pluggable
//! persistent sinks.
//!
//! ```text
//! ValueStore (one per attribute)
//! +-- last       lock-free latest-value slot
//! +-- recent     concurrent ordered in-memory window
//! +-- persistent PersistentSink (FileSink | SqliteSink | MemorySink)
//! ```

pub mod file;
pub mod memory;
pub mod sink;
pub mod sqlite;
pub mod value_store;

pub use file::FileSink;
pub use memory::MemorySink;
pub use sink::{PersistentSink, SinkError};
pub use sqlite::SqliteSink;
pub use value_store::{StoreError, ValueStore, PERSIST_THRESHOLD, UPDATE_THRESHOLD};
