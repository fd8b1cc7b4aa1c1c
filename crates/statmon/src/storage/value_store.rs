// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Tiered per-attribute value storage.
//!
//! Serves the latest value fastest (most frequently requested), the recent
//! in-memory window fast, and the full history at the speed of the
//! persistent tier's I/O.
//!
//! ```text
//! add() -> last (lock-free slot)
//!       -> recent (concurrent ordered map)
//!       -> persistent (evicted head batches)
//! ```
//!
//! # Concurrency
//!
//! - `add` and the read operations may run concurrently from any number of
//!   threads: `last` reads are atomic, `recent` readers see each entry
//!   atomically and may or may not reflect in-flight additions.
//! - `all_values` is undefined under concurrent writes; the engine only
//!   calls it while the attribute is quiesced.
//! - `clear_recent` / `persist_recent` must not overlap `add`; the engine
//!   enforces this through its lifecycle states.
//!
//! Head eviction removes entries oldest-first, so a concurrent reader
//! always observes a contiguous suffix of the window, never a gap.

use std::ops::Bound;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use crossbeam_skiplist::SkipMap;
use thiserror::Error;
use tracing::warn;

use crate::storage::sink::{PersistentSink, SinkError};
use crate::time::Timestamp;
use crate::value::{self, AttributeValue};

/// Every `PERSIST_THRESHOLD`th accepted value triggers eviction of the
/// recent head into the persistent tier.
pub const PERSIST_THRESHOLD: u64 = 1_000_000;

/// Every `UPDATE_THRESHOLD`th accepted value advances the eviction
/// checkpoint without evicting.
pub const UPDATE_THRESHOLD: u64 = 500_000;

/// Sentinel for "no checkpoint recorded yet" (no real reading carries the
/// epoch instant itself).
const THRESHOLD_UNSET: u64 = 0;

/// Storage-tier failure surfaced to the engine.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The durability contract broke while evicting to the persistent tier.
    /// Fatal: the engine must stop collecting.
    #[error("persisting {name} failed: {source}")]
    Persist {
        name: String,
        #[source]
        source: SinkError,
    },
}

/// Tiered storage for one attribute's accepted values.
pub struct ValueStore {
    /// Record name in the persistent tier (the attribute full name).
    name: String,
    last: ArcSwapOption<AttributeValue>,
    recent: SkipMap<Timestamp, Arc<AttributeValue>>,
    /// Counts accepted adds since construction.
    counter: AtomicU64,
    /// Checkpoint below which the next eviction cuts, as raw nanoseconds.
    threshold_ts: AtomicU64,
    persist_threshold: u64,
    update_threshold: u64,
    persistent: Arc<dyn PersistentSink>,
}

impl ValueStore {
    pub fn new(
        name: impl Into<String>,
        persistent: Arc<dyn PersistentSink>,
        persist_threshold: u64,
        update_threshold: u64,
    ) -> Self {
        debug_assert!(persist_threshold > 0 && update_threshold > 0);
        ValueStore {
            name: name.into(),
            last: ArcSwapOption::empty(),
            recent: SkipMap::new(),
            counter: AtomicU64::new(0),
            threshold_ts: AtomicU64::new(THRESHOLD_UNSET),
            persist_threshold,
            update_threshold,
            persistent,
        }
    }

    /// Store with the default eviction thresholds.
    pub fn with_defaults(name: impl Into<String>, persistent: Arc<dyn PersistentSink>) -> Self {
        ValueStore::new(name, persistent, PERSIST_THRESHOLD, UPDATE_THRESHOLD)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Accepted adds since construction (clears do not reset it).
    pub fn counter(&self) -> u64 {
        self.counter.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.counter() == 0
    }

    /// Offer a value. Returns `Ok(true)` iff it was stored.
    ///
    /// A value equal to the current `last` (by value equality) is rejected.
    /// An accepted value becomes the new `last`, lands in the recent window
    /// keyed by `read_ts`, and may trigger eviction of the window head into
    /// the persistent tier per the threshold policy.
    pub fn add(&self, value: AttributeValue) -> Result<bool, StoreError> {
        if let Some(last) = self.last.load_full() {
            if value.value == last.value {
                return Ok(false);
            }
        }

        // The counter tracks values accepted by the gate above; an add that
        // reuses an existing read_ts overwrites its window entry but still
        // counts.
        let counter = self.counter.fetch_add(1, Ordering::AcqRel) + 1;

        let read_ts = value.read_ts;
        let value = Arc::new(value);
        self.last.store(Some(Arc::clone(&value)));
        self.recent.insert(read_ts, value);

        if counter % self.persist_threshold == 0 {
            let cut = self.threshold_ts.swap(read_ts.as_nanos(), Ordering::AcqRel);
            if cut != THRESHOLD_UNSET {
                self.evict_head(Timestamp::from_nanos(cut))?;
            }
        } else if counter % self.update_threshold == 0 {
            self.threshold_ts.store(read_ts.as_nanos(), Ordering::Release);
        }

        Ok(true)
    }

    /// Move every window entry strictly below `cut` to the persistent tier.
    fn evict_head(&self, cut: Timestamp) -> Result<(), StoreError> {
        let head: Vec<(Timestamp, Arc<AttributeValue>)> = self
            .recent
            .range(..cut)
            .map(|entry| (*entry.key(), Arc::clone(entry.value())))
            .collect();
        if head.is_empty() {
            return Ok(());
        }

        let body: Vec<Vec<String>> = head.iter().map(|(_, v)| v.encode()).collect();
        self.persistent
            .save(&self.name, &value::HEADER, body)
            .map_err(|source| StoreError::Persist {
                name: self.name.clone(),
                source,
            })?;

        // Oldest-first removal: readers racing this loop see a contiguous
        // suffix of the window.
        for (ts, _) in &head {
            self.recent.remove(ts);
        }
        Ok(())
    }

    /// Latest accepted value. Lock-free.
    pub fn last(&self) -> Option<Arc<AttributeValue>> {
        self.last.load_full()
    }

    /// All in-memory values with `read_ts >= since`.
    ///
    /// When the window is empty or entirely older than `since`, the latest
    /// value alone is returned (or nothing if none was ever accepted).
    pub fn in_memory_since(&self, since: Timestamp) -> Vec<Arc<AttributeValue>> {
        match self.recent.back() {
            Some(newest) if *newest.key() >= since => self
                .recent
                .range(since..)
                .map(|entry| Arc::clone(entry.value()))
                .collect(),
            _ => self.last.load_full().into_iter().collect(),
        }
    }

    /// Greatest window entry with key `<= ts`; the smallest entry when all
    /// keys lie above `ts` (out-of-range queries want the nearest anchor);
    /// `None` on an empty window.
    pub fn floor(&self, ts: Timestamp) -> Option<Arc<AttributeValue>> {
        self.recent
            .upper_bound(Bound::Included(&ts))
            .or_else(|| self.recent.front())
            .map(|entry| Arc::clone(entry.value()))
    }

    /// Smallest window entry with key `>= ts`; the latest value when all
    /// keys lie below `ts`.
    pub fn ceiling(&self, ts: Timestamp) -> Option<Arc<AttributeValue>> {
        self.recent
            .lower_bound(Bound::Included(&ts))
            .map(|entry| Arc::clone(entry.value()))
            .or_else(|| self.last.load_full())
    }

    /// Full history: persisted values then the in-memory window, ascending.
    ///
    /// A persistent-tier read failure degrades to the window alone with a
    /// warning; this path never takes the engine down.
    pub fn all_values(&self) -> Vec<Arc<AttributeValue>> {
        let mut out = Vec::new();
        match self.persistent.load(&self.name) {
            Ok(rows) => {
                for row in rows {
                    match value::decode(&row) {
                        Ok(v) => out.push(Arc::new(v)),
                        Err(e) => warn!(name = %self.name, "skipping undecodable persisted row: {e}"),
                    }
                }
            }
            Err(e) => {
                warn!(name = %self.name, "persistent tier unreadable, serving recent only: {e}");
            }
        }
        out.extend(self.recent.iter().map(|entry| Arc::clone(entry.value())));
        out
    }

    /// Empty the in-memory window. `last` stays published.
    ///
    /// Callers must have quiesced writers; overlap with `add` is undefined.
    pub fn clear_recent(&self) {
        while self.recent.pop_front().is_some() {}
    }

    /// Synchronously drain the window to the persistent tier (entries stay
    /// in memory).
    pub fn persist_recent(&self) -> Result<(), StoreError> {
        let body: Vec<Vec<String>> = self.recent.iter().map(|e| e.value().encode()).collect();
        if body.is_empty() {
            return Ok(());
        }
        self.persistent
            .save(&self.name, &value::HEADER, body)
            .map_err(|source| StoreError::Persist {
                name: self.name.clone(),
                source,
            })
    }

    pub fn persist_and_clear_recent(&self) -> Result<(), StoreError> {
        self.persist_recent()?;
        self.clear_recent();
        Ok(())
    }
}
