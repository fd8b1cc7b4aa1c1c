// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Value-time keys for the attribute stores.
//!
//! A [`Timestamp`] is a point on the value timeline with nanosecond
//! resolution and a total order. The [`Clock`] hands out stamps that never
//! decrease in program order, even when the wall clock steps backwards.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::Serialize;

/// Nanoseconds since the Unix epoch.
///
/// Equality is bit-identical; ordering is plain integer ordering. All maps
/// in the storage layer are keyed by `Timestamp`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Timestamp(u64);

impl Timestamp {
    pub const fn from_nanos(nanos: u64) -> Self {
        Timestamp(nanos)
    }

    /// Converts from the external query surface's epoch milliseconds.
    pub const fn from_millis(millis: u64) -> Self {
        Timestamp(millis * 1_000_000)
    }

    pub const fn as_nanos(self) -> u64 {
        self.0
    }

    pub const fn as_millis(self) -> u64 {
        self.0 / 1_000_000
    }

    /// Absolute distance to another stamp, used by NEAREST interpolation.
    pub fn distance(self, other: Timestamp) -> u64 {
        self.0.abs_diff(other.0)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Monotonic source of [`Timestamp`]s.
///
/// Reads the wall clock and clamps against the last stamp handed out, so two
/// calls in program order satisfy `t1 <= t2` process-wide. The clamp also
/// guarantees strictly increasing stamps while the wall clock stands still
/// within one nanosecond tick.
#[derive(Debug, Default)]
pub struct Clock {
    last: AtomicU64,
}

impl Clock {
    pub const fn new() -> Self {
        Clock {
            last: AtomicU64::new(0),
        }
    }

    /// Current time, never earlier than any previously returned stamp.
    pub fn now(&self) -> Timestamp {
        let wall = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO)
            .as_nanos() as u64;

        let mut prev = self.last.load(Ordering::Relaxed);
        loop {
            let next = wall.max(prev + 1);
            match self
                .last
                .compare_exchange_weak(prev, next, Ordering::AcqRel, Ordering::Relaxed)
            {
                Ok(_) => return Timestamp(next),
                Err(observed) => prev = observed,
            }
        }
    }
}

/// Process-wide clock shared by clients and the engine.
pub static CLOCK: Clock = Clock::new();
