// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Engine construction from configuration.
//!
//! Walks the configured devices, builds a client per device through the
//! composite factory, resolves each attribute's declared type, and wires
//! attributes to stores. Failures narrow the engine instead of aborting
//! it: an unreachable device is skipped whole, an unresolvable attribute
//! lands in `failed_attributes`.

use std::sync::Arc;

use bigdecimal::BigDecimal;
use tracing::{debug, error, warn};

use crate::attr::{Attribute, AttributeKind, NumericFilter};
use crate::client::{CompositeClientFactory, SimClientFactory};
use crate::config::StatmonConfig;
use crate::engine::{Engine, MonitoredAttribute};
use crate::interpolation::Interpolation;
use crate::storage::{PersistentSink, ValueStore};

/// Builds an [`Engine`] from a parsed configuration.
pub struct EngineBuilder {
    config: StatmonConfig,
    factory: CompositeClientFactory,
    sink: Arc<dyn PersistentSink>,
}

impl EngineBuilder {
    /// Builder over `config`, persisting through `sink`, with the
    /// simulated transport registered.
    pub fn new(config: StatmonConfig, sink: Arc<dyn PersistentSink>) -> Self {
        EngineBuilder {
            config,
            factory: CompositeClientFactory::new()
                .with_factory(Box::new(SimClientFactory::default())),
            sink,
        }
    }

    /// Replace the client factory chain (tests, real transports).
    pub fn with_factory(mut self, factory: CompositeClientFactory) -> Self {
        self.factory = factory;
        self
    }

    /// Instantiate clients, attributes and stores, and return the engine
    /// in `IDLE`.
    ///
    /// Never fails outright: devices whose client cannot be built are
    /// skipped with an error log, attributes whose type cannot be
    /// resolved are recorded in the engine's `failed_attributes`.
    pub fn build(self) -> Engine {
        let mut monitored: Vec<MonitoredAttribute> = Vec::new();
        let mut failed_attributes: Vec<String> = Vec::new();
        let mut next_id: u16 = 0;

        for device in &self.config.devices {
            let client = match self.factory.create(&device.name) {
                Ok(client) => client,
                Err(e) => {
                    error!(device = %device.name, "skipping device: {e}");
                    continue;
                }
            };

            for attr_config in &device.attributes {
                let full_name = format!("{}/{}", device.name, attr_config.name);

                let type_tag = match client.attribute_type(&attr_config.name) {
                    Ok(tag) => tag,
                    Err(e) => {
                        error!(attribute = %full_name, "skipping attribute: {e}");
                        failed_attributes.push(full_name);
                        continue;
                    }
                };

                let interpolation = if attr_config.interpolation == Interpolation::Linear
                    && !type_tag.is_numeric()
                {
                    warn!(
                        attribute = %full_name,
                        "linear interpolation needs a numeric type, falling back to last"
                    );
                    Interpolation::Last
                } else {
                    attr_config.interpolation
                };

                let kind = if type_tag.is_numeric() {
                    let precision = attr_config
                        .precision
                        .clone()
                        .unwrap_or_else(|| BigDecimal::from(0));
                    AttributeKind::Numeric(NumericFilter::new(precision))
                } else {
                    AttributeKind::Plain
                };

                let store = ValueStore::new(
                    full_name.clone(),
                    Arc::clone(&self.sink),
                    self.config.service.persist_threshold,
                    self.config.service.update_threshold,
                );

                let attr = Arc::new(Attribute::new(
                    next_id,
                    device.name.clone(),
                    attr_config.name.clone(),
                    attr_config.alias.clone(),
                    type_tag,
                    interpolation,
                    attr_config.method,
                    kind,
                    store,
                ));
                debug!(attribute = %attr.full_name, "monitoring attribute");
                next_id += 1;

                monitored.push(MonitoredAttribute {
                    attr,
                    client: Arc::clone(&client),
                });
            }
        }

        if !failed_attributes.is_empty() {
            warn!(
                failed = failed_attributes.len(),
                monitored = monitored.len(),
                "some configured attributes are not monitored"
            );
        }

        let engine = Engine::new(
            monitored,
            failed_attributes,
            self.config.service.read_timeout,
            self.config.service.light_poll_period,
        );
        let use_aliases = self.config.use_aliases;
        engine
            .init()
            .expect("a freshly constructed engine is UNINIT");
        engine.set_use_aliases(use_aliases);
        engine
    }
}
