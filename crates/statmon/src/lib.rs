// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # statmon - status-collection service
//!
//! Continuously samples a fleet of remote measurement devices, records
//! each attribute's value stream in a tiered per-attribute store, and
//! answers low-latency queries for the latest snapshot, historical ranges,
//! and time-point interpolations.
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use statmon::config::StatmonConfig;
//! use statmon::engine::{CollectionMode, EngineBuilder};
//! use statmon::storage::FileSink;
//!
//! let config = StatmonConfig::from_file("statmon.xml").unwrap();
//! let sink = Arc::new(FileSink::new(&config.service.persistent_root, false).unwrap());
//! let engine = EngineBuilder::new(config, sink).build();
//!
//! engine.start_collect(CollectionMode::HeavyDuty).unwrap();
//! let snapshot = engine.latest_snapshot();
//! engine.stop_collect().unwrap();
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +--------------------------------------------------------------+
//! |                       Control surface                        |
//! |  start/stop collect | status | snapshot/range/point queries  |
//! +--------------------------------------------------------------+
//! |                           Engine                             |
//! |  lifecycle state machine | timer + worker pool | subscriptions|
//! +--------------------------------------------------------------+
//! |                        Attributes                            |
//! |  null dedup | precision filter (numeric) | interpolation     |
//! +--------------------------------------------------------------+
//! |                       ValueStores                            |
//! |  last slot | recent ordered window | tier-down eviction      |
//! +--------------------------------------------------------------+
//! |                     PersistentSink                           |
//! |  FileSink (CSV per attribute) | SqliteSink | MemorySink      |
//! +--------------------------------------------------------------+
//! ```
//!
//! ## Modules Overview
//!
//! - [`engine`] - lifecycle, scheduling, queries (start here)
//! - [`storage`] - tiered value stores and persistent sinks
//! - [`attr`] - attribute model and the numeric precision filter
//! - [`client`] - device transport abstraction and the simulator
//! - [`config`] - XML configuration loader
//! - [`interpolation`] - LAST / NEAREST / LINEAR resolution

pub mod attr;
pub mod client;
pub mod config;
pub mod engine;
pub mod interpolation;
pub mod storage;
pub mod time;
pub mod value;

pub use attr::{Attribute, AttributeKind, Method, NumericFilter};
pub use client::{ClientError, DeviceClient, Reading, SimClient, TypeTag};
pub use config::{ConfigError, StatmonConfig};
pub use engine::{CollectionMode, Engine, EngineBuilder, EngineError, EngineState};
pub use interpolation::Interpolation;
pub use storage::{FileSink, MemorySink, PersistentSink, SinkError, SqliteSink, ValueStore};
pub use time::{Clock, Timestamp};
pub use value::{AttributeValue, Quality, ScalarValue};
