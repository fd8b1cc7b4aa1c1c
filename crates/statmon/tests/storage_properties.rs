// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Storage-layer invariants exercised end to end: tier ordering,
//! round-trips through both real sinks, and the concurrent
//! readers-with-writers contract.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;

use statmon::storage::{FileSink, MemorySink, PersistentSink, SqliteSink, ValueStore};
use statmon::time::Timestamp;
use statmon::value::{AttributeValue, Quality, ScalarValue};

fn float_value(ts: u64, v: f64) -> AttributeValue {
    AttributeValue {
        read_ts: Timestamp::from_nanos(ts),
        write_ts: Timestamp::from_nanos(ts),
        value: Some(ScalarValue::Float(v)),
        quality: Quality::Valid,
        source_id: 7,
    }
}

#[test]
fn all_values_is_accepted_sequence_in_order() {
    // low thresholds so the run crosses several evictions
    let store = ValueStore::new("dev/seq", Arc::new(MemorySink::new()), 10, 5);

    let mut accepted = Vec::new();
    for i in 1..=137u64 {
        // every ninth add repeats the previous value to exercise the
        // dedup gate
        let v = if i % 9 == 0 { (i - 1) as f64 } else { i as f64 };
        if store.add(float_value(i, v)).unwrap() {
            accepted.push(i);
        }
    }
    assert!(accepted.len() < 137);

    let all: Vec<u64> = store
        .all_values()
        .iter()
        .map(|v| v.read_ts.as_nanos())
        .collect();
    assert_eq!(all, accepted);
    assert_eq!(store.counter(), accepted.len() as u64);

    // the persisted part is a strict prefix: the window holds the tail
    let window: Vec<u64> = store
        .in_memory_since(Timestamp::from_nanos(0))
        .iter()
        .map(|v| v.read_ts.as_nanos())
        .collect();
    assert!(all.ends_with(&window));
    assert!(window.len() < all.len());
}

#[test]
fn round_trip_through_file_sink() {
    let dir = tempfile::tempdir().unwrap();
    let sink = Arc::new(FileSink::new(dir.path(), false).unwrap());

    let store = ValueStore::new(
        "sim/lab/1/temperature",
        Arc::clone(&sink) as Arc<dyn PersistentSink>,
        1000,
        500,
    );
    let originals = vec![
        float_value(1, 0.1),
        float_value(2, -273.15),
        AttributeValue {
            read_ts: Timestamp::from_nanos(3),
            write_ts: Timestamp::from_nanos(4),
            value: None,
            quality: Quality::Invalid,
            source_id: 7,
        },
        AttributeValue {
            read_ts: Timestamp::from_nanos(5),
            write_ts: Timestamp::from_nanos(5),
            value: Some(ScalarValue::Text("over, out".to_string())),
            quality: Quality::Warning,
            source_id: 7,
        },
        AttributeValue {
            read_ts: Timestamp::from_nanos(6),
            write_ts: Timestamp::from_nanos(6),
            value: Some(ScalarValue::FloatArray(vec![1.5, 2.5])),
            quality: Quality::Valid,
            source_id: 7,
        },
    ];
    for v in &originals {
        assert!(store.add(v.clone()).unwrap());
    }
    store.persist_and_clear_recent().unwrap();

    // a fresh store under the same name sees the identical sequence
    let fresh = ValueStore::new("sim/lab/1/temperature", sink, 1000, 500);
    let reloaded = fresh.all_values();
    assert_eq!(reloaded.len(), originals.len());
    for (original, loaded) in originals.iter().zip(&reloaded) {
        assert_eq!(loaded.read_ts, original.read_ts);
        assert_eq!(loaded.write_ts, original.write_ts);
        assert_eq!(loaded.value, original.value);
        assert_eq!(loaded.quality, original.quality);
        assert_eq!(loaded.source_id, original.source_id);
    }
}

#[test]
fn round_trip_through_sqlite_sink() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("statmon.db");

    {
        let sink = Arc::new(SqliteSink::new(&path).unwrap());
        let store = ValueStore::new("sim/lab/2/pressure", sink, 1000, 500);
        for i in 1..=20u64 {
            assert!(store.add(float_value(i, i as f64 * 0.5)).unwrap());
        }
        store.persist_recent().unwrap();
    }

    // across a process-restart boundary (new connection)
    let sink = Arc::new(SqliteSink::new(&path).unwrap());
    let rows = sink.load("sim/lab/2/pressure").unwrap();
    assert_eq!(rows.len(), 20);

    let store = ValueStore::new("sim/lab/2/pressure", sink, 1000, 500);
    let all: Vec<f64> = store
        .all_values()
        .iter()
        .map(|v| v.value.as_ref().unwrap().as_f64().unwrap())
        .collect();
    assert_eq!(all, (1..=20).map(|i| i as f64 * 0.5).collect::<Vec<_>>());
}

#[test]
fn concurrent_writers_and_readers_keep_the_contract() {
    const WRITERS: usize = 4;
    const READERS: usize = 3;
    const PER_WRITER: u64 = 2_000;

    // no eviction in this run: thresholds above the total volume
    let store = Arc::new(ValueStore::new(
        "dev/concurrent",
        Arc::new(MemorySink::new()),
        1_000_000,
        500_000,
    ));
    let ts_source = Arc::new(AtomicU64::new(1));

    let writer_handles: Vec<_> = (0..WRITERS)
        .map(|w| {
            let store = Arc::clone(&store);
            let ts_source = Arc::clone(&ts_source);
            thread::spawn(move || {
                let mut accepted = 0u64;
                for i in 0..PER_WRITER {
                    let ts = ts_source.fetch_add(1, Ordering::Relaxed);
                    // distinct value per add keeps the dedup gate open
                    let v = (w as f64) * 1e9 + i as f64 + (ts as f64) * 1e-3;
                    if store.add(float_value(ts, v)).unwrap() {
                        accepted += 1;
                    }
                }
                accepted
            })
        })
        .collect();

    let reader_handles: Vec<_> = (0..READERS)
        .map(|_| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                for _ in 0..2_000 {
                    if let Some(last) = store.last() {
                        assert!(last.value.is_some());
                    }
                    let since = Timestamp::from_nanos(1);
                    let tail = store.in_memory_since(since);
                    // any observed window is ordered by read_ts
                    for pair in tail.windows(2) {
                        assert!(pair[0].read_ts < pair[1].read_ts);
                    }
                    let probe = Timestamp::from_nanos(500);
                    if let (Some(f), Some(c)) = (store.floor(probe), store.ceiling(probe)) {
                        assert!(f.read_ts <= c.read_ts || c.read_ts > probe);
                    }
                }
            })
        })
        .collect();

    let total_accepted: u64 = writer_handles.into_iter().map(|h| h.join().unwrap()).sum();
    for handle in reader_handles {
        handle.join().unwrap();
    }

    assert_eq!(store.counter(), total_accepted);

    // the window is exactly the accepted set (no eviction, distinct keys)
    let window = store.in_memory_since(Timestamp::from_nanos(0));
    assert_eq!(window.len() as u64, total_accepted);
    let keys: HashSet<u64> = window.iter().map(|v| v.read_ts.as_nanos()).collect();
    assert_eq!(keys.len() as u64, total_accepted);

    // last is one of the stored values
    let last = store.last().unwrap();
    assert!(keys.contains(&last.read_ts.as_nanos()));
}

#[test]
fn counter_threshold_arithmetic_is_modular() {
    // thresholds divide evenly into u64 space; crossing them repeatedly
    // keeps the window bounded near 2x the update threshold
    let store = ValueStore::new("dev/bounded", Arc::new(MemorySink::new()), 20, 10);
    for i in 1..=1000u64 {
        store.add(float_value(i, i as f64)).unwrap();
    }
    let window_len = store.in_memory_since(Timestamp::from_nanos(0)).len();
    assert!(window_len <= 2 * 10 + 1, "window grew to {window_len}");
    assert_eq!(store.counter(), 1000);
    assert_eq!(store.all_values().len(), 1000);
}
