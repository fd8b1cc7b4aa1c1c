// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Precision-aware acceptance filter for numeric streams.
//!
//! Keeps an auxiliary ordered map of the decimal renderings of accepted
//! values. A candidate passes only when it differs from its timestamp-wise
//! predecessor by more than the configured precision, so a noisy stream
//! hovering inside the precision band stores a single sample.
//!
//! Arithmetic runs on [`BigDecimal`] parsed from the value's decimal string
//! form rather than on raw floats, keeping the comparison exact for values
//! whose binary form wobbles below the decimal precision.

use std::ops::Bound;
use std::str::FromStr;

use bigdecimal::BigDecimal;
use crossbeam_skiplist::SkipMap;

use crate::time::Timestamp;
use crate::value::{DecodeError, ScalarValue};

/// The `addValueInternal` gate of numeric attributes.
///
/// Invariant: adjacent entries of the auxiliary map differ by more than
/// `precision` (the first entry is unconditional).
pub struct NumericFilter {
    precision: BigDecimal,
    values: SkipMap<Timestamp, BigDecimal>,
}

impl NumericFilter {
    /// `precision` must be non-negative; zero stores every change.
    pub fn new(precision: BigDecimal) -> Self {
        debug_assert!(precision >= BigDecimal::from(0));
        NumericFilter {
            precision,
            values: SkipMap::new(),
        }
    }

    pub fn precision(&self) -> &BigDecimal {
        &self.precision
    }

    /// Whether the value at `ts` clears the precision band relative to its
    /// predecessor. Accepted values are recorded (first writer wins on a
    /// duplicate timestamp).
    pub fn accepts(&self, ts: Timestamp, value: &ScalarValue) -> Result<bool, DecodeError> {
        let text = value.to_string();
        let decimal = BigDecimal::from_str(&text).map_err(|_| DecodeError::Field {
            field: "numeric",
            text,
        })?;

        let prev = match self.values.upper_bound(Bound::Included(&ts)) {
            Some(entry) => entry.value().clone(),
            None => {
                self.values.get_or_insert(ts, decimal);
                return Ok(true);
            }
        };

        // |x - y| > precision
        if (&decimal - &prev).abs() > self.precision {
            self.values.get_or_insert(ts, decimal);
            Ok(true)
        } else {
            Ok(false)
        }
    }

    pub fn clear(&self) {
        while self.values.pop_front().is_some() {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter(precision: &str) -> NumericFilter {
        NumericFilter::new(BigDecimal::from_str(precision).unwrap())
    }

    fn ts(n: u64) -> Timestamp {
        Timestamp::from_nanos(n)
    }

    #[test]
    fn test_first_value_always_accepted() {
        let f = filter("5");
        assert!(f.accepts(ts(1), &ScalarValue::Float(0.0)).unwrap());
    }

    #[test]
    fn test_changes_within_band_rejected() {
        let f = filter("0.5");
        assert!(f.accepts(ts(1), &ScalarValue::Float(10.0)).unwrap());
        assert!(!f.accepts(ts(2), &ScalarValue::Float(10.3)).unwrap());
        assert!(!f.accepts(ts(3), &ScalarValue::Float(10.5)).unwrap()); // strict >
        assert!(f.accepts(ts(4), &ScalarValue::Float(10.6)).unwrap());
    }

    #[test]
    fn test_band_tracks_last_accepted_not_last_offered() {
        let f = filter("0.5");
        assert!(f.accepts(ts(1), &ScalarValue::Float(10.0)).unwrap());
        // 10.3 rejected; the next comparison is still against 10.0
        assert!(!f.accepts(ts(2), &ScalarValue::Float(10.3)).unwrap());
        assert!(f.accepts(ts(3), &ScalarValue::Float(10.6)).unwrap());
        // and now against 10.6
        assert!(!f.accepts(ts(4), &ScalarValue::Float(10.6)).unwrap());
        assert!(f.accepts(ts(5), &ScalarValue::Float(9.8)).unwrap());
    }

    #[test]
    fn test_zero_precision_rejects_only_exact_repeats() {
        let f = filter("0");
        assert!(f.accepts(ts(1), &ScalarValue::Float(1.0)).unwrap());
        assert!(!f.accepts(ts(2), &ScalarValue::Float(1.0)).unwrap());
        assert!(f.accepts(ts(3), &ScalarValue::Float(1.0000001)).unwrap());
    }

    #[test]
    fn test_integer_values_pass_through_decimal_parse() {
        let f = filter("2");
        assert!(f.accepts(ts(1), &ScalarValue::Integer(100)).unwrap());
        assert!(!f.accepts(ts(2), &ScalarValue::Integer(101)).unwrap());
        assert!(f.accepts(ts(3), &ScalarValue::Integer(103)).unwrap());
    }

    #[test]
    fn test_non_numeric_text_is_a_decode_error() {
        let f = filter("1");
        assert!(f
            .accepts(ts(1), &ScalarValue::Text("open".to_string()))
            .is_err());
    }

    #[test]
    fn test_scientific_notation_parses() {
        let f = filter("0.5");
        assert!(f.accepts(ts(1), &ScalarValue::Float(1e-3)).unwrap());
        assert!(f.accepts(ts(2), &ScalarValue::Float(2.0)).unwrap());
    }

    #[test]
    fn test_duplicate_timestamp_keeps_first_entry() {
        let f = filter("0.5");
        assert!(f.accepts(ts(1), &ScalarValue::Float(10.0)).unwrap());
        // same key, far value: accepted by the band, map keeps the first
        assert!(f.accepts(ts(1), &ScalarValue::Float(20.0)).unwrap());
        // predecessor for ts 2 is still 10.0
        assert!(!f.accepts(ts(2), &ScalarValue::Float(10.2)).unwrap());
    }

    #[test]
    fn test_clear_forgets_history() {
        let f = filter("0.5");
        assert!(f.accepts(ts(1), &ScalarValue::Float(10.0)).unwrap());
        f.clear();
        // fresh history: in-band value accepted again
        assert!(f.accepts(ts(2), &ScalarValue::Float(10.1)).unwrap());
    }
}
