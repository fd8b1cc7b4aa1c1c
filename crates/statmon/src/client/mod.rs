// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Device transport abstraction.
//!
//! The engine never talks to a concrete control system; it sees devices
//! through [`DeviceClient`]: a typed attribute-class lookup, a synchronous
//! read with a per-call timeout, and push subscriptions. Concrete
//! transports register a [`ClientFactory`] with the composite factory;
//! this crate ships the simulated transport ([`SimClient`]) used by tests
//! and the demo configuration.

pub mod factory;
pub mod sim;

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::time::Timestamp;
use crate::value::{Quality, ScalarValue};

pub use factory::{ClientFactory, CompositeClientFactory};
pub use sim::{SimClient, SimClientFactory};

/// Declared element type of a device attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeTag {
    Boolean,
    Integer,
    Float,
    Text,
    FloatArray,
}

impl TypeTag {
    /// Numeric types take the precision filter and LINEAR interpolation.
    pub fn is_numeric(self) -> bool {
        matches!(self, TypeTag::Integer | TypeTag::Float)
    }
}

/// Push-subscription flavor requested from the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    /// Fires when the device-side value changes.
    Change,
    /// Fires on the device's own period.
    Periodic,
    /// Fires when the device archives a value.
    Archive,
}

impl std::str::FromStr for EventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "change" => Ok(EventType::Change),
            "periodic" => Ok(EventType::Periodic),
            "archive" => Ok(EventType::Archive),
            other => Err(format!("unknown event type: {other:?}")),
        }
    }
}

/// One raw reading as delivered by a transport.
#[derive(Debug, Clone)]
pub struct Reading {
    pub value: Option<ScalarValue>,
    pub read_ts: Timestamp,
    pub write_ts: Timestamp,
    pub quality: Quality,
}

/// Transport-layer failure.
#[derive(Debug, Error)]
pub enum ClientError {
    /// No registered factory claims the device; the device is skipped.
    #[error("no client available for device {0:?}")]
    Unavailable(String),

    /// The attribute does not exist on the device.
    #[error("attribute {attribute:?} unknown on device {device:?}")]
    AttributeUnknown { device: String, attribute: String },

    /// Transient read failure; sampling continues.
    #[error("reading {attribute:?} failed: {reason}")]
    Read { attribute: String, reason: String },

    /// The configured per-call timeout elapsed.
    #[error("reading {attribute:?} timed out after {timeout:?}")]
    ReadTimeout {
        attribute: String,
        timeout: Duration,
    },

    #[error("subscribing to {attribute:?} failed: {reason}")]
    Subscribe { attribute: String, reason: String },
}

/// Handle returned by [`DeviceClient::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

/// Callback invoked by the transport per event. Implementations must not
/// assume which thread runs it; the engine re-dispatches storage work onto
/// its own pool.
pub type EventCallback = Arc<dyn Fn(Reading) + Send + Sync>;

/// Per-device capability consumed by the engine.
pub trait DeviceClient: Send + Sync + std::fmt::Debug {
    fn device_name(&self) -> &str;

    /// Declared type of an attribute, or [`ClientError::AttributeUnknown`].
    fn attribute_type(&self, attribute: &str) -> Result<TypeTag, ClientError>;

    /// Synchronous read honoring `timeout`.
    fn read(&self, attribute: &str, timeout: Duration) -> Result<Reading, ClientError>;

    /// Register a push subscription; the callback fires once per event.
    fn subscribe(
        &self,
        attribute: &str,
        event_type: EventType,
        callback: EventCallback,
    ) -> Result<SubscriptionId, ClientError>;

    fn unsubscribe(&self, id: SubscriptionId);
}
