// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Simulated device transport.
//!
//! An in-process [`DeviceClient`] so the service runs end-to-end without
//! hardware: tests drive attribute values by hand, the demo configuration
//! runs on deterministic generators. Device names under the `sim/` prefix
//! are claimed by [`SimClientFactory`].

use std::collections::HashMap;
use std::f64::consts::TAU;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};

use crate::client::{
    ClientError, ClientFactory, DeviceClient, EventCallback, EventType, Reading, SubscriptionId,
    TypeTag,
};
use crate::time::CLOCK;
use crate::value::{Quality, ScalarValue};

/// Where a simulated attribute's readings come from.
enum Source {
    /// Fixed value until the test replaces it.
    Manual(Option<ScalarValue>),
    /// Deterministic per-type waveform advanced on every read.
    Generated,
}

struct SimAttribute {
    type_tag: TypeTag,
    source: Mutex<Source>,
    quality: Mutex<Quality>,
    subscribers: Mutex<Vec<(SubscriptionId, EventCallback)>>,
    tick: AtomicU64,
}

impl SimAttribute {
    fn generate(&self, step: u64) -> ScalarValue {
        match self.type_tag {
            TypeTag::Float => {
                ScalarValue::Float(20.0 + 5.0 * (step as f64 / 20.0 * TAU).sin())
            }
            TypeTag::Integer => ScalarValue::Integer(step as i64),
            TypeTag::Boolean => ScalarValue::Boolean(step % 2 == 0),
            TypeTag::Text => {
                const STATES: [&str; 3] = ["OK", "BUSY", "FAULT"];
                ScalarValue::Text(STATES[(step % 3) as usize].to_string())
            }
            TypeTag::FloatArray => {
                ScalarValue::FloatArray(vec![step as f64, step as f64 * 2.0])
            }
        }
    }

    fn current(&self) -> Reading {
        let value = match &*self.source.lock() {
            Source::Manual(v) => v.clone(),
            Source::Generated => Some(self.generate(self.tick.fetch_add(1, Ordering::Relaxed))),
        };
        let read_ts = CLOCK.now();
        Reading {
            value,
            read_ts,
            write_ts: CLOCK.now(),
            quality: *self.quality.lock(),
        }
    }
}

/// Simulated device.
pub struct SimClient {
    name: String,
    attributes: RwLock<HashMap<String, Arc<SimAttribute>>>,
    next_subscription: AtomicU64,
    read_latency: Mutex<Duration>,
}

impl std::fmt::Debug for SimClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimClient").field("name", &self.name).finish()
    }
}

impl SimClient {
    pub fn new(name: impl Into<String>) -> Self {
        SimClient {
            name: name.into(),
            attributes: RwLock::new(HashMap::new()),
            next_subscription: AtomicU64::new(1),
            read_latency: Mutex::new(Duration::ZERO),
        }
    }

    /// Attribute whose value is set by hand (starts at `initial`).
    pub fn with_attribute(
        self,
        name: impl Into<String>,
        type_tag: TypeTag,
        initial: Option<ScalarValue>,
    ) -> Self {
        self.register(name, type_tag, Source::Manual(initial));
        self
    }

    /// Attribute fed by the deterministic per-type generator.
    pub fn with_generated(self, name: impl Into<String>, type_tag: TypeTag) -> Self {
        self.register(name, type_tag, Source::Generated);
        self
    }

    fn register(&self, name: impl Into<String>, type_tag: TypeTag, source: Source) {
        self.attributes.write().insert(
            name.into(),
            Arc::new(SimAttribute {
                type_tag,
                source: Mutex::new(source),
                quality: Mutex::new(Quality::Valid),
                subscribers: Mutex::new(Vec::new()),
                tick: AtomicU64::new(0),
            }),
        );
    }

    fn attribute(&self, name: &str) -> Result<Arc<SimAttribute>, ClientError> {
        self.attributes
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| ClientError::AttributeUnknown {
                device: self.name.clone(),
                attribute: name.to_string(),
            })
    }

    /// Replace an attribute's value (switches it to manual mode).
    pub fn set_value(&self, name: &str, value: Option<ScalarValue>) {
        if let Ok(attr) = self.attribute(name) {
            *attr.source.lock() = Source::Manual(value);
        }
    }

    pub fn set_quality(&self, name: &str, quality: Quality) {
        if let Ok(attr) = self.attribute(name) {
            *attr.quality.lock() = quality;
        }
    }

    /// Artificial latency applied to every `read`; exceeding the caller's
    /// timeout turns the read into [`ClientError::ReadTimeout`].
    pub fn set_read_latency(&self, latency: Duration) {
        *self.read_latency.lock() = latency;
    }

    /// Push the attribute's current value to all of its subscribers, as
    /// the device transport would on an event.
    pub fn emit(&self, name: &str) -> Result<(), ClientError> {
        let attr = self.attribute(name)?;
        let reading = attr.current();
        for (_, callback) in attr.subscribers.lock().iter() {
            callback(reading.clone());
        }
        Ok(())
    }
}

impl DeviceClient for SimClient {
    fn device_name(&self) -> &str {
        &self.name
    }

    fn attribute_type(&self, attribute: &str) -> Result<TypeTag, ClientError> {
        Ok(self.attribute(attribute)?.type_tag)
    }

    fn read(&self, attribute: &str, timeout: Duration) -> Result<Reading, ClientError> {
        let attr = self.attribute(attribute)?;

        let latency = *self.read_latency.lock();
        if !latency.is_zero() {
            if latency > timeout {
                std::thread::sleep(timeout);
                return Err(ClientError::ReadTimeout {
                    attribute: attribute.to_string(),
                    timeout,
                });
            }
            std::thread::sleep(latency);
        }

        Ok(attr.current())
    }

    fn subscribe(
        &self,
        attribute: &str,
        _event_type: EventType,
        callback: EventCallback,
    ) -> Result<SubscriptionId, ClientError> {
        let attr = self.attribute(attribute)?;
        let id = SubscriptionId(self.next_subscription.fetch_add(1, Ordering::Relaxed));
        attr.subscribers.lock().push((id, callback));
        Ok(id)
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        for attr in self.attributes.read().values() {
            attr.subscribers.lock().retain(|(sid, _)| *sid != id);
        }
    }
}

/// Attribute template every simulated device is created with.
pub type SimTemplate = Vec<(String, TypeTag)>;

/// Builds [`SimClient`]s for device names under `sim/`.
pub struct SimClientFactory {
    template: SimTemplate,
}

impl SimClientFactory {
    pub fn with_template(template: SimTemplate) -> Self {
        SimClientFactory { template }
    }
}

impl Default for SimClientFactory {
    fn default() -> Self {
        SimClientFactory {
            template: vec![
                ("temperature".to_string(), TypeTag::Float),
                ("pressure".to_string(), TypeTag::Float),
                ("counter".to_string(), TypeTag::Integer),
                ("status".to_string(), TypeTag::Text),
                ("online".to_string(), TypeTag::Boolean),
                ("spectrum".to_string(), TypeTag::FloatArray),
            ],
        }
    }
}

impl ClientFactory for SimClientFactory {
    fn accepts(&self, device_name: &str) -> bool {
        device_name.starts_with("sim/")
    }

    fn create(&self, device_name: &str) -> Result<Arc<dyn DeviceClient>, ClientError> {
        let mut client = SimClient::new(device_name);
        for (name, tag) in &self.template {
            client = client.with_generated(name.clone(), *tag);
        }
        Ok(Arc::new(client))
    }
}
