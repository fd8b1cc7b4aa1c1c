// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! statmon service CLI.
//!
//! Loads a configuration, builds the engine over the selected persistent
//! sink, runs a collection session, and prints the latest snapshot as
//! JSON.
//!
//! # Usage
//!
//! ```bash
//! # run the demo configuration for ten seconds
//! statmon --config conf/statmon.xml --duration 10
//!
//! # SQLite persistence, fresh state, light polling
//! statmon --config conf/statmon.xml --sink sqlite --purge --mode light-poll
//! ```

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use statmon::config::StatmonConfig;
use statmon::engine::{CollectionMode, EngineBuilder};
use statmon::storage::{FileSink, PersistentSink, SqliteSink};

#[derive(ValueEnum, Debug, Clone, Copy)]
enum SinkKind {
    /// CSV file per attribute under the data directory.
    File,
    /// Single SQLite database in the data directory.
    Sqlite,
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum Mode {
    /// Each polled attribute at its configured delay.
    HeavyDuty,
    /// All polled attributes at the shared slow period.
    LightPoll,
}

#[derive(Parser, Debug)]
#[command(name = "statmon")]
#[command(about = "Status-collection service for device attribute fleets", long_about = None)]
struct Args {
    /// Configuration file (XML)
    #[arg(short, long)]
    config: PathBuf,

    /// Persistent sink backend
    #[arg(long, value_enum, default_value_t = SinkKind::File)]
    sink: SinkKind,

    /// Override the configured persistent root
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Wipe persisted data before starting (restart-time purge)
    #[arg(long)]
    purge: bool,

    /// Collection mode
    #[arg(long, value_enum, default_value_t = Mode::HeavyDuty)]
    mode: Mode,

    /// Seconds to collect before printing the snapshot and exiting
    /// (0 = run until killed)
    #[arg(long, default_value_t = 10)]
    duration: u64,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let config = StatmonConfig::from_file(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;

    let data_dir = args
        .data_dir
        .clone()
        .unwrap_or_else(|| config.service.persistent_root.clone());

    let sink: Arc<dyn PersistentSink> = match args.sink {
        SinkKind::File => Arc::new(
            FileSink::new(&data_dir, args.purge)
                .with_context(|| format!("opening file sink at {}", data_dir.display()))?,
        ),
        SinkKind::Sqlite => {
            std::fs::create_dir_all(&data_dir)
                .with_context(|| format!("creating {}", data_dir.display()))?;
            let db = data_dir.join("statmon.db");
            if args.purge && db.exists() {
                std::fs::remove_file(&db)
                    .with_context(|| format!("purging {}", db.display()))?;
            }
            Arc::new(
                SqliteSink::new(&db)
                    .with_context(|| format!("opening SQLite sink at {}", db.display()))?,
            )
        }
    };

    let engine = EngineBuilder::new(config, sink).build();
    for failed in engine.failed_attributes() {
        warn!(attribute = %failed, "not monitored");
    }

    let mode = match args.mode {
        Mode::HeavyDuty => CollectionMode::HeavyDuty,
        Mode::LightPoll => CollectionMode::LightPoll,
    };
    engine.start_collect(mode)?;
    info!(
        status = engine.status(),
        attributes = engine.attribute_count(),
        "collecting"
    );

    if args.duration == 0 {
        loop {
            std::thread::sleep(Duration::from_secs(60));
            if engine.is_poisoned() {
                anyhow::bail!("engine poisoned by a persistence failure");
            }
        }
    }
    std::thread::sleep(Duration::from_secs(args.duration));

    if engine.is_poisoned() {
        anyhow::bail!("engine poisoned by a persistence failure");
    }

    let snapshot = engine.latest_snapshot();
    let printable: BTreeMap<_, _> = snapshot.iter().map(|(k, v)| (k, v.as_ref())).collect();
    println!("{}", serde_json::to_string_pretty(&printable)?);

    engine.stop_collect()?;
    engine.persist_all()?;
    engine.shutdown();
    Ok(())
}
