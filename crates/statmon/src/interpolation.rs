// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Time-point resolution of a value stream.
//!
//! Queries for an arbitrary instant resolve against the bracketing samples
//! of the in-memory window: LAST takes the floor, NEAREST the closer
//! bracket (ties toward floor), LINEAR synthesizes a value on the segment
//! between the brackets.

use std::str::FromStr;

use crate::storage::ValueStore;
use crate::time::Timestamp;
use crate::value::{AttributeValue, ScalarValue};

/// Resolution mode, per attribute, from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Interpolation {
    #[default]
    Last,
    Nearest,
    /// Numeric streams only; configuration falls back to [`Last`] for
    /// other types.
    Linear,
}

impl Interpolation {
    pub fn as_str(self) -> &'static str {
        match self {
            Interpolation::Last => "last",
            Interpolation::Nearest => "nearest",
            Interpolation::Linear => "linear",
        }
    }

    /// Resolve the stream's value at `ts`.
    pub fn resolve(self, store: &ValueStore, ts: Timestamp) -> Option<AttributeValue> {
        match self {
            Interpolation::Last => store.floor(ts).map(|v| (*v).clone()),
            Interpolation::Nearest => {
                let floor = store.floor(ts);
                let ceiling = store.ceiling(ts);
                match (floor, ceiling) {
                    (Some(f), Some(c)) => {
                        // tie-break toward floor
                        if f.read_ts.distance(ts) <= c.read_ts.distance(ts) {
                            Some((*f).clone())
                        } else {
                            Some((*c).clone())
                        }
                    }
                    (Some(v), None) | (None, Some(v)) => Some((*v).clone()),
                    (None, None) => None,
                }
            }
            Interpolation::Linear => Self::linear(store, ts),
        }
    }

    fn linear(store: &ValueStore, ts: Timestamp) -> Option<AttributeValue> {
        let floor = store.floor(ts);
        let ceiling = store.ceiling(ts);
        let (f, c) = match (floor, ceiling) {
            (Some(f), Some(c)) => (f, c),
            (Some(v), None) | (None, Some(v)) => return Some((*v).clone()),
            (None, None) => return None,
        };

        if f.read_ts == c.read_ts {
            return Some((*f).clone());
        }

        // a null bracket cannot anchor the segment; fall back to the other
        let v0 = f.value.as_ref().and_then(ScalarValue::as_f64);
        let v1 = c.value.as_ref().and_then(ScalarValue::as_f64);
        let (v0, v1) = match (v0, v1) {
            (Some(v0), Some(v1)) => (v0, v1),
            (Some(_), None) => return Some((*f).clone()),
            (None, Some(_)) => return Some((*c).clone()),
            (None, None) => return Some((*f).clone()),
        };

        let t0 = f.read_ts.as_nanos() as f64;
        let t1 = c.read_ts.as_nanos() as f64;
        let t = ts.as_nanos() as f64;
        let value = v0 + (v1 - v0) * ((t - t0) / (t1 - t0));

        Some(AttributeValue {
            read_ts: ts,
            write_ts: ts,
            value: Some(ScalarValue::Float(value)),
            quality: f.quality,
            source_id: f.source_id,
        })
    }
}

impl FromStr for Interpolation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "last" => Ok(Interpolation::Last),
            "nearest" => Ok(Interpolation::Nearest),
            "linear" => Ok(Interpolation::Linear),
            other => Err(format!("unknown interpolation: {other:?}")),
        }
    }
}
