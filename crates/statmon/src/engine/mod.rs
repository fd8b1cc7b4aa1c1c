// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Collection engine.
//!
//! Owns every monitored attribute and its store, drives sampling through
//! the scheduler, and answers the snapshot queries. The control surface
//! mirrors the lifecycle:
//!
//! ```text
//! UNINIT --init--> IDLE
//! IDLE --start_collect(mode)--> LIGHT_POLL | HEAVY_DUTY
//! LIGHT_POLL | HEAVY_DUTY --stop_collect--> IDLE
//! any --shutdown--> STOPPED (terminal)
//! ```
//!
//! Only the collecting states schedule sampling work; events arriving
//! outside them are dropped and counted. A persistence failure on the
//! eviction path poisons the engine: sampling stops and the poison flag
//! stays visible to the owner.

pub mod builder;
pub(crate) mod scheduler;

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use thiserror::Error;
use tracing::{info, warn};

use crate::attr::{AttributeRef, Method};
use crate::client::{DeviceClient, EventCallback, SubscriptionId};
use crate::storage::StoreError;
use crate::time::Timestamp;
use crate::value::AttributeValue;

use scheduler::{PolledTask, Scheduler, SchedulerContext, Task};

pub use builder::EngineBuilder;

/// Engine lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Uninit,
    Idle,
    LightPoll,
    HeavyDuty,
    Stopped,
}

impl EngineState {
    pub fn as_str(self) -> &'static str {
        match self {
            EngineState::Uninit => "UNINIT",
            EngineState::Idle => "IDLE",
            EngineState::LightPoll => "LIGHT_POLL",
            EngineState::HeavyDuty => "HEAVY_DUTY",
            EngineState::Stopped => "STOPPED",
        }
    }

    pub fn is_collecting(self) -> bool {
        matches!(self, EngineState::LightPoll | EngineState::HeavyDuty)
    }
}

/// Requested collection mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionMode {
    /// Every polled attribute sampled at one shared slow period.
    LightPoll,
    /// Every polled attribute sampled at its configured delay.
    HeavyDuty,
}

impl CollectionMode {
    fn state(self) -> EngineState {
        match self {
            CollectionMode::LightPoll => EngineState::LightPoll,
            CollectionMode::HeavyDuty => EngineState::HeavyDuty,
        }
    }
}

/// Engine-level failure.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{operation} requires state {required}, engine is {actual}")]
    InvalidState {
        operation: &'static str,
        required: &'static str,
        actual: &'static str,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// One attribute wired to the client that serves it.
pub struct MonitoredAttribute {
    pub attr: AttributeRef,
    pub client: Arc<dyn DeviceClient>,
}

/// The collection engine. See the module docs for the lifecycle.
pub struct Engine {
    /// All monitored attributes in dense id order.
    attributes: Vec<MonitoredAttribute>,
    /// Indexes into `attributes`.
    polled: Vec<usize>,
    event_driven: Vec<usize>,
    /// `device/attribute` names that failed type resolution at build time.
    failed_attributes: Vec<String>,
    state: Mutex<EngineState>,
    collecting: Arc<AtomicBool>,
    fatal: Arc<AtomicBool>,
    dropped_events: Arc<AtomicU64>,
    use_aliases: AtomicBool,
    read_timeout: Duration,
    light_poll_period: Duration,
    scheduler: Mutex<Option<Scheduler>>,
    subscriptions: Mutex<Vec<(Arc<dyn DeviceClient>, SubscriptionId)>>,
}

impl Engine {
    pub(crate) fn new(
        attributes: Vec<MonitoredAttribute>,
        failed_attributes: Vec<String>,
        read_timeout: Duration,
        light_poll_period: Duration,
    ) -> Self {
        let polled = attributes
            .iter()
            .enumerate()
            .filter(|(_, m)| m.attr.is_polled())
            .map(|(i, _)| i)
            .collect();
        let event_driven = attributes
            .iter()
            .enumerate()
            .filter(|(_, m)| !m.attr.is_polled())
            .map(|(i, _)| i)
            .collect();

        Engine {
            attributes,
            polled,
            event_driven,
            failed_attributes,
            state: Mutex::new(EngineState::Uninit),
            collecting: Arc::new(AtomicBool::new(false)),
            fatal: Arc::new(AtomicBool::new(false)),
            dropped_events: Arc::new(AtomicU64::new(0)),
            use_aliases: AtomicBool::new(false),
            read_timeout,
            light_poll_period,
            scheduler: Mutex::new(None),
            subscriptions: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn init(&self) -> Result<(), EngineError> {
        let mut state = self.state.lock();
        if *state != EngineState::Uninit {
            return Err(EngineError::InvalidState {
                operation: "init",
                required: "UNINIT",
                actual: state.as_str(),
            });
        }
        *state = EngineState::Idle;
        info!(
            polled = self.polled.len(),
            event_driven = self.event_driven.len(),
            "engine initialized"
        );
        Ok(())
    }

    // ------------------------------------------------------------------
    // Control surface
    // ------------------------------------------------------------------

    /// Begin collecting in the given mode. Requires `IDLE`.
    pub fn start_collect(&self, mode: CollectionMode) -> Result<(), EngineError> {
        let mut state = self.state.lock();
        if *state != EngineState::Idle {
            return Err(EngineError::InvalidState {
                operation: "start_collect",
                required: "IDLE",
                actual: state.as_str(),
            });
        }

        let context = Arc::new(SchedulerContext {
            read_timeout: self.read_timeout,
            collecting: Arc::clone(&self.collecting),
            fatal: Arc::clone(&self.fatal),
            dropped_events: Arc::clone(&self.dropped_events),
        });

        let tasks: Vec<Arc<PolledTask>> = self
            .polled
            .iter()
            .map(|&index| {
                let monitored = &self.attributes[index];
                let period = match (mode, monitored.attr.method) {
                    (CollectionMode::HeavyDuty, Method::Poll { delay }) => delay,
                    _ => self.light_poll_period,
                };
                Arc::new(PolledTask::new(
                    Arc::clone(&monitored.attr),
                    Arc::clone(&monitored.client),
                    period,
                ))
            })
            .collect();

        // pool sized to the polled set; event callbacks share it
        let worker_count = self.polled.len().max(1);
        let scheduler = Scheduler::start(tasks, worker_count, Arc::clone(&context));

        self.collecting.store(true, Ordering::Release);
        self.subscribe_events(scheduler.sender());
        *self.scheduler.lock() = Some(scheduler);
        *state = mode.state();
        info!(mode = state.as_str(), "collection started");
        Ok(())
    }

    /// Stop collecting and return to `IDLE`.
    pub fn stop_collect(&self) -> Result<(), EngineError> {
        let mut state = self.state.lock();
        if !state.is_collecting() {
            return Err(EngineError::InvalidState {
                operation: "stop_collect",
                required: "LIGHT_POLL or HEAVY_DUTY",
                actual: state.as_str(),
            });
        }

        self.teardown_collection();
        *state = EngineState::Idle;
        info!("collection stopped");
        Ok(())
    }

    /// Terminal: stop everything. Idempotent.
    pub fn shutdown(&self) {
        let mut state = self.state.lock();
        if *state == EngineState::Stopped {
            return;
        }
        self.teardown_collection();
        *state = EngineState::Stopped;
        info!("engine stopped");
    }

    fn teardown_collection(&self) {
        self.collecting.store(false, Ordering::Release);
        for (client, id) in self.subscriptions.lock().drain(..) {
            client.unsubscribe(id);
        }
        if let Some(scheduler) = self.scheduler.lock().take() {
            scheduler.shutdown();
        }
    }

    fn subscribe_events(&self, sender: crossbeam::channel::Sender<Task>) {
        let mut subscriptions = self.subscriptions.lock();
        for &index in &self.event_driven {
            let monitored = &self.attributes[index];
            let Method::Event { event_type } = monitored.attr.method else {
                continue;
            };

            let attr = Arc::clone(&monitored.attr);
            let sender = sender.clone();
            let collecting = Arc::clone(&self.collecting);
            let dropped = Arc::clone(&self.dropped_events);
            let callback: EventCallback = Arc::new(move |reading| {
                if !collecting.load(Ordering::Acquire) {
                    dropped.fetch_add(1, Ordering::Relaxed);
                    return;
                }
                // hand off to the pool; the transport thread never stores
                if sender.try_send(Task::Event(Arc::clone(&attr), reading)).is_err() {
                    dropped.fetch_add(1, Ordering::Relaxed);
                }
            });

            match monitored
                .client
                .subscribe(&monitored.attr.attribute_name, event_type, callback)
            {
                Ok(id) => subscriptions.push((Arc::clone(&monitored.client), id)),
                Err(e) => warn!(
                    attribute = %monitored.attr.full_name,
                    "event subscription failed: {e}"
                ),
            }
        }
    }

    /// Lifecycle state name, as exposed on the control surface.
    pub fn status(&self) -> &'static str {
        self.state.lock().as_str()
    }

    pub fn state(&self) -> EngineState {
        *self.state.lock()
    }

    /// Snapshot keys switch between full names and aliases.
    pub fn set_use_aliases(&self, use_aliases: bool) {
        self.use_aliases.store(use_aliases, Ordering::Relaxed);
    }

    /// True once a persistence failure has poisoned collection.
    pub fn is_poisoned(&self) -> bool {
        self.fatal.load(Ordering::Acquire)
    }

    /// Events discarded because they arrived outside a collecting state.
    pub fn dropped_events(&self) -> u64 {
        self.dropped_events.load(Ordering::Relaxed)
    }

    /// `device/attribute` names skipped at build time.
    pub fn failed_attributes(&self) -> &[String] {
        &self.failed_attributes
    }

    pub fn attribute_count(&self) -> usize {
        self.attributes.len()
    }

    /// Lookup by full name, mostly for tests and tooling.
    pub fn attribute(&self, full_name: &str) -> Option<&AttributeRef> {
        self.attributes
            .iter()
            .find(|m| m.attr.full_name == full_name)
            .map(|m| &m.attr)
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Latest value per attribute. Lock-free; one `last` load each.
    pub fn latest_snapshot(&self) -> BTreeMap<String, Arc<AttributeValue>> {
        let use_aliases = self.use_aliases.load(Ordering::Relaxed);
        let mut snapshot = BTreeMap::new();
        for monitored in &self.attributes {
            if let Some(last) = monitored.attr.store().last() {
                snapshot.insert(
                    monitored.attr.display_name(use_aliases).to_string(),
                    last,
                );
            }
        }
        snapshot
    }

    /// In-memory values with `t0 <= read_ts <= t1`, per attribute.
    pub fn data_range(
        &self,
        t0: Timestamp,
        t1: Timestamp,
    ) -> BTreeMap<String, Vec<Arc<AttributeValue>>> {
        let use_aliases = self.use_aliases.load(Ordering::Relaxed);
        let mut ranges = BTreeMap::new();
        for monitored in &self.attributes {
            let values: Vec<_> = monitored
                .attr
                .store()
                .in_memory_since(t0)
                .into_iter()
                .filter(|v| v.read_ts <= t1)
                .collect();
            ranges.insert(
                monitored.attr.display_name(use_aliases).to_string(),
                values,
            );
        }
        ranges
    }

    /// Value per attribute at `t`, resolved by each attribute's
    /// interpolation mode.
    pub fn snapshot_at(&self, t: Timestamp) -> BTreeMap<String, AttributeValue> {
        let use_aliases = self.use_aliases.load(Ordering::Relaxed);
        let mut snapshot = BTreeMap::new();
        for monitored in &self.attributes {
            if let Some(value) = monitored.attr.value_at(t) {
                snapshot.insert(
                    monitored.attr.display_name(use_aliases).to_string(),
                    value,
                );
            }
        }
        snapshot
    }

    /// External-surface variant of [`Engine::data_range`] taking epoch
    /// milliseconds.
    pub fn data_range_ms(
        &self,
        t0_ms: u64,
        t1_ms: u64,
    ) -> BTreeMap<String, Vec<Arc<AttributeValue>>> {
        self.data_range(Timestamp::from_millis(t0_ms), Timestamp::from_millis(t1_ms))
    }

    /// External-surface variant of [`Engine::snapshot_at`] taking epoch
    /// milliseconds.
    pub fn snapshot_at_ms(&self, t_ms: u64) -> BTreeMap<String, AttributeValue> {
        self.snapshot_at(Timestamp::from_millis(t_ms))
    }

    // ------------------------------------------------------------------
    // Maintenance (quiesced states only)
    // ------------------------------------------------------------------

    /// Drain every recent window to the persistent tier. Refused while
    /// collecting: the stores require quiesced writers.
    pub fn persist_all(&self) -> Result<(), EngineError> {
        self.quiesced("persist_all")?;
        for monitored in &self.attributes {
            monitored.attr.store().persist_recent()?;
        }
        Ok(())
    }

    /// Drain and clear every recent window. Refused while collecting.
    pub fn persist_and_clear_all(&self) -> Result<(), EngineError> {
        self.quiesced("persist_and_clear_all")?;
        for monitored in &self.attributes {
            monitored.attr.store().persist_and_clear_recent()?;
        }
        Ok(())
    }

    fn quiesced(&self, operation: &'static str) -> Result<(), EngineError> {
        let state = self.state.lock();
        if state.is_collecting() {
            warn!(
                operation,
                "maintenance requested while sampling is live; refusing"
            );
            return Err(EngineError::InvalidState {
                operation,
                required: "IDLE or STOPPED",
                actual: state.as_str(),
            });
        }
        Ok(())
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attr::{Attribute, AttributeKind};
    use crate::client::{SimClient, TypeTag};
    use crate::interpolation::Interpolation;
    use crate::storage::{MemorySink, ValueStore};
    use crate::value::ScalarValue;

    fn engine_with_one_polled() -> Engine {
        let client = Arc::new(
            SimClient::new("sim/t").with_attribute(
                "temp",
                TypeTag::Float,
                Some(ScalarValue::Float(1.0)),
            ),
        );
        let attr = Arc::new(Attribute::new(
            0,
            "sim/t",
            "temp",
            None,
            TypeTag::Float,
            Interpolation::Last,
            Method::Poll {
                delay: Duration::from_millis(10),
            },
            AttributeKind::Plain,
            ValueStore::with_defaults("sim/t/temp", Arc::new(MemorySink::new())),
        ));
        let engine = Engine::new(
            vec![MonitoredAttribute { attr, client }],
            Vec::new(),
            Duration::from_millis(100),
            Duration::from_millis(50),
        );
        engine.init().unwrap();
        engine
    }

    #[test]
    fn test_state_machine_happy_path() {
        let engine = engine_with_one_polled();
        assert_eq!(engine.status(), "IDLE");

        engine.start_collect(CollectionMode::HeavyDuty).unwrap();
        assert_eq!(engine.status(), "HEAVY_DUTY");

        engine.stop_collect().unwrap();
        assert_eq!(engine.status(), "IDLE");

        engine.shutdown();
        assert_eq!(engine.status(), "STOPPED");
    }

    #[test]
    fn test_start_requires_idle() {
        let engine = engine_with_one_polled();
        engine.start_collect(CollectionMode::LightPoll).unwrap();
        assert!(matches!(
            engine.start_collect(CollectionMode::HeavyDuty),
            Err(EngineError::InvalidState { .. })
        ));
        engine.stop_collect().unwrap();
    }

    #[test]
    fn test_stop_requires_collecting() {
        let engine = engine_with_one_polled();
        assert!(matches!(
            engine.stop_collect(),
            Err(EngineError::InvalidState { .. })
        ));
    }

    #[test]
    fn test_shutdown_is_terminal_and_idempotent() {
        let engine = engine_with_one_polled();
        engine.shutdown();
        engine.shutdown();
        assert_eq!(engine.status(), "STOPPED");
        assert!(matches!(
            engine.start_collect(CollectionMode::HeavyDuty),
            Err(EngineError::InvalidState { .. })
        ));
    }

    #[test]
    fn test_maintenance_refused_while_collecting() {
        let engine = engine_with_one_polled();
        engine.start_collect(CollectionMode::HeavyDuty).unwrap();
        assert!(matches!(
            engine.persist_and_clear_all(),
            Err(EngineError::InvalidState { .. })
        ));
        engine.stop_collect().unwrap();
        engine.persist_and_clear_all().unwrap();
    }

    #[test]
    fn test_snapshot_empty_before_collection() {
        let engine = engine_with_one_polled();
        assert!(engine.latest_snapshot().is_empty());
        assert_eq!(engine.attribute_count(), 1);
        assert!(engine.attribute("sim/t/temp").is_some());
        assert!(engine.attribute("sim/t/none").is_none());
    }
}
