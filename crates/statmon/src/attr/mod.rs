// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Monitored attributes.
//!
//! An [`Attribute`] couples identity and sampling configuration with one
//! [`ValueStore`] and an acceptance gate. The gate comes in two flavors:
//! numeric attributes carry the precision filter, everything else accepts
//! unconditionally. Null readings are deduplicated one layer up, here, so
//! the rule applies to every flavor: the first null is stored, repeats are
//! not.

pub mod numeric;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::client::{EventType, TypeTag};
use crate::interpolation::Interpolation;
use crate::storage::{StoreError, ValueStore};
use crate::time::Timestamp;
use crate::value::AttributeValue;

pub use numeric::NumericFilter;

/// How an attribute is collected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// Periodic pull at the given delay.
    Poll { delay: Duration },
    /// Push subscription on the device transport.
    Event { event_type: EventType },
}

/// Per-attribute sampling counters.
///
/// Relaxed atomics; consumers only need monotonic snapshots.
#[derive(Debug, Default)]
pub struct AttributeMetrics {
    /// Transient device-read failures (sampling continued).
    pub read_failures: AtomicU64,
    /// Ticks dropped because the previous read was still in flight.
    pub overruns: AtomicU64,
    /// Values rejected because they could not be parsed for the filter.
    pub decode_errors: AtomicU64,
}

impl AttributeMetrics {
    pub fn snapshot(&self) -> (u64, u64, u64) {
        (
            self.read_failures.load(Ordering::Relaxed),
            self.overruns.load(Ordering::Relaxed),
            self.decode_errors.load(Ordering::Relaxed),
        )
    }
}

/// The acceptance gate in front of the store.
pub enum AttributeKind {
    /// Booleans, text, arrays: no filtering beyond null dedup.
    Plain,
    /// Numeric stream with a precision band.
    Numeric(NumericFilter),
}

impl AttributeKind {
    fn accepts(&self, value: &AttributeValue, metrics: &AttributeMetrics) -> bool {
        match self {
            AttributeKind::Plain => true,
            AttributeKind::Numeric(filter) => {
                // null readings bypass the band; the store-level dedup
                // handles repeats
                let Some(scalar) = &value.value else {
                    return true;
                };
                match filter.accepts(value.read_ts, scalar) {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        metrics.decode_errors.fetch_add(1, Ordering::Relaxed);
                        debug!("numeric value rejected: {e}");
                        false
                    }
                }
            }
        }
    }

    fn clear(&self) {
        if let AttributeKind::Numeric(filter) = self {
            filter.clear();
        }
    }
}

/// A named, typed quantity read from one device.
pub struct Attribute {
    /// Dense id assigned by the engine builder; stamped into every value.
    pub id: u16,
    pub device_name: String,
    pub attribute_name: String,
    /// Short name used when the engine serves aliased snapshots.
    pub alias: String,
    /// `device_name + "/" + attribute_name`; also the persistent record name.
    pub full_name: String,
    pub type_tag: TypeTag,
    pub interpolation: Interpolation,
    pub method: Method,
    pub metrics: AttributeMetrics,
    kind: AttributeKind,
    store: ValueStore,
}

impl Attribute {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: u16,
        device_name: impl Into<String>,
        attribute_name: impl Into<String>,
        alias: Option<String>,
        type_tag: TypeTag,
        interpolation: Interpolation,
        method: Method,
        kind: AttributeKind,
        store: ValueStore,
    ) -> Self {
        let device_name = device_name.into();
        let attribute_name = attribute_name.into();
        let full_name = format!("{device_name}/{attribute_name}");
        Attribute {
            id,
            alias: alias.unwrap_or_else(|| attribute_name.clone()),
            device_name,
            attribute_name,
            full_name,
            type_tag,
            interpolation,
            method,
            metrics: AttributeMetrics::default(),
            kind,
            store,
        }
    }

    pub fn store(&self) -> &ValueStore {
        &self.store
    }

    pub fn is_polled(&self) -> bool {
        matches!(self.method, Method::Poll { .. })
    }

    /// Snapshot key under the engine's alias setting.
    pub fn display_name(&self, use_aliases: bool) -> &str {
        if use_aliases {
            &self.alias
        } else {
            &self.full_name
        }
    }

    /// Offer a reading. `Ok(true)` iff it reached the store.
    ///
    /// A null is accepted only into an empty store; non-nulls pass the
    /// kind's gate, then the store's value-equality dedup.
    pub fn add(&self, value: AttributeValue) -> Result<bool, StoreError> {
        if value.is_null() && self.store.last().is_some() {
            return Ok(false);
        }
        if !self.kind.accepts(&value, &self.metrics) {
            return Ok(false);
        }
        self.store.add(value)
    }

    /// Resolve a value at an arbitrary time per the configured
    /// interpolation.
    pub fn value_at(&self, ts: Timestamp) -> Option<AttributeValue> {
        self.interpolation.resolve(&self.store, ts)
    }

    /// Drop the in-memory window and the filter history; `last` survives.
    pub fn clear(&self) {
        self.store.clear_recent();
        self.kind.clear();
    }
}

/// Convenience shared handle used across the engine.
pub type AttributeRef = Arc<Attribute>;
