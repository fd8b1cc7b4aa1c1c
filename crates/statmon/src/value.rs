// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Attribute readings and their persisted string-row form.
//!
//! [`ScalarValue`] is the tagged union carried by every reading; the Java
//! ancestry's parametric value types collapse into one enum so the engine
//! can hold heterogeneous attributes behind a single store type.
//!
//! The persisted layout is a header row plus one string row per value. The
//! codec here is the companion value-factory of the sinks: `encode` then
//! [`decode`] reproduces the original `AttributeValue` exactly (floats use
//! Rust's shortest round-trip formatting).

use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use thiserror::Error;

use crate::time::Timestamp;

/// Column names of the persisted record layout.
pub const HEADER: [&str; 6] = ["read_ts", "write_ts", "kind", "value", "quality", "source_id"];

/// A single typed reading payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ScalarValue {
    Boolean(bool),
    Integer(i64),
    Float(f64),
    Text(String),
    FloatArray(Vec<f64>),
}

impl ScalarValue {
    /// Discriminant name used in the persisted `kind` column.
    pub fn kind(&self) -> &'static str {
        match self {
            ScalarValue::Boolean(_) => "bool",
            ScalarValue::Integer(_) => "int",
            ScalarValue::Float(_) => "float",
            ScalarValue::Text(_) => "text",
            ScalarValue::FloatArray(_) => "float_array",
        }
    }

    /// Numeric view for the precision filter and LINEAR interpolation.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ScalarValue::Integer(v) => Some(*v as f64),
            ScalarValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, ScalarValue::Integer(_) | ScalarValue::Float(_))
    }
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarValue::Boolean(v) => write!(f, "{v}"),
            ScalarValue::Integer(v) => write!(f, "{v}"),
            ScalarValue::Float(v) => write!(f, "{v}"),
            ScalarValue::Text(v) => write!(f, "{v}"),
            ScalarValue::FloatArray(vs) => {
                let joined: Vec<String> = vs.iter().map(|v| v.to_string()).collect();
                write!(f, "{}", joined.join(";"))
            }
        }
    }
}

/// Reading quality as reported by the device transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Quality {
    Valid,
    Warning,
    Alarm,
    Invalid,
}

impl Quality {
    pub fn as_str(self) -> &'static str {
        match self {
            Quality::Valid => "VALID",
            Quality::Warning => "WARNING",
            Quality::Alarm => "ALARM",
            Quality::Invalid => "INVALID",
        }
    }
}

impl FromStr for Quality {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "VALID" => Ok(Quality::Valid),
            "WARNING" => Ok(Quality::Warning),
            "ALARM" => Ok(Quality::Alarm),
            "INVALID" => Ok(Quality::Invalid),
            other => Err(DecodeError::field("quality", other)),
        }
    }
}

/// One timestamped reading of an attribute.
///
/// `value == None` encodes a null reading. Two values compare equal iff
/// their `value` fields are equal; timestamps and quality do not take part
/// in the store's dedup gate.
#[derive(Debug, Clone, Serialize)]
pub struct AttributeValue {
    /// When the device produced the reading.
    pub read_ts: Timestamp,
    /// When the reading was accepted locally.
    pub write_ts: Timestamp,
    pub value: Option<ScalarValue>,
    pub quality: Quality,
    /// Dense attribute id assigned by the engine builder.
    pub source_id: u16,
}

impl AttributeValue {
    pub fn is_null(&self) -> bool {
        self.value.is_none()
    }

    /// Persisted string row, matching [`HEADER`] column for column.
    pub fn encode(&self) -> Vec<String> {
        let (kind, value) = match &self.value {
            None => ("null".to_string(), String::new()),
            Some(v) => (v.kind().to_string(), v.to_string()),
        };
        vec![
            self.read_ts.as_nanos().to_string(),
            self.write_ts.as_nanos().to_string(),
            kind,
            value,
            self.quality.as_str().to_string(),
            self.source_id.to_string(),
        ]
    }
}

/// Value could not be reconstructed from its persisted or textual form.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("record has {found} columns, expected {expected}")]
    ColumnCount { expected: usize, found: usize },

    #[error("bad {field} value: {text:?}")]
    Field { field: &'static str, text: String },

    #[error("unknown value kind: {0:?}")]
    UnknownKind(String),
}

impl DecodeError {
    fn field(field: &'static str, text: &str) -> Self {
        DecodeError::Field {
            field,
            text: text.to_string(),
        }
    }
}

fn parse<T: FromStr>(field: &'static str, text: &str) -> Result<T, DecodeError> {
    text.parse().map_err(|_| DecodeError::field(field, text))
}

/// Reconstructs an [`AttributeValue`] from a persisted row.
pub fn decode(row: &[String]) -> Result<AttributeValue, DecodeError> {
    if row.len() != HEADER.len() {
        return Err(DecodeError::ColumnCount {
            expected: HEADER.len(),
            found: row.len(),
        });
    }

    let value = match row[2].as_str() {
        "null" => None,
        "bool" => Some(ScalarValue::Boolean(parse("value", &row[3])?)),
        "int" => Some(ScalarValue::Integer(parse("value", &row[3])?)),
        "float" => Some(ScalarValue::Float(parse("value", &row[3])?)),
        "text" => Some(ScalarValue::Text(row[3].clone())),
        "float_array" => {
            let elems = if row[3].is_empty() {
                Vec::new()
            } else {
                row[3]
                    .split(';')
                    .map(|s| parse("value", s))
                    .collect::<Result<Vec<f64>, _>>()?
            };
            Some(ScalarValue::FloatArray(elems))
        }
        other => return Err(DecodeError::UnknownKind(other.to_string())),
    };

    Ok(AttributeValue {
        read_ts: Timestamp::from_nanos(parse("read_ts", &row[0])?),
        write_ts: Timestamp::from_nanos(parse("write_ts", &row[1])?),
        value,
        quality: row[4].parse()?,
        source_id: parse("source_id", &row[5])?,
    })
}
