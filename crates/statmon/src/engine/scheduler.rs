// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Sampling scheduler: timer thread plus worker pool.
//!
//! ```text
//! timer thread -> deadline scan -> Sender<Task> -> worker threads
//!                                       ^
//! transport event callbacks ------------+
//! ```
//!
//! One periodic task per polled attribute. A tick whose previous read is
//! still in flight is dropped (no queueing) and counted as an overrun.
//! Event callbacks enqueue onto the same pool so storage work never runs
//! on the transport's thread.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam::channel::{bounded, Receiver, Sender, TrySendError};
use tracing::{debug, error, warn};

use crate::attr::AttributeRef;
use crate::client::{DeviceClient, Reading};
use crate::value::AttributeValue;

/// How long the timer sleeps at most between deadline scans; bounds the
/// shutdown latency.
const TIMER_RESOLUTION: Duration = Duration::from_millis(20);

/// Bounded join applied to every scheduler thread on shutdown.
const JOIN_TIMEOUT: Duration = Duration::from_secs(2);

/// One polled attribute's sampling registration.
pub(crate) struct PolledTask {
    pub attr: AttributeRef,
    pub client: Arc<dyn DeviceClient>,
    pub period: Duration,
    /// Set while a read for this attribute runs on some worker.
    in_flight: AtomicBool,
}

impl PolledTask {
    pub fn new(attr: AttributeRef, client: Arc<dyn DeviceClient>, period: Duration) -> Self {
        PolledTask {
            attr,
            client,
            period,
            in_flight: AtomicBool::new(false),
        }
    }
}

/// Unit of work dispatched to the pool.
pub(crate) enum Task {
    /// Tick for the polled task at this index.
    Poll(usize),
    /// Reading pushed by a transport subscription.
    Event(AttributeRef, Reading),
}

/// Shared knobs the workers consult on every task.
pub(crate) struct SchedulerContext {
    pub read_timeout: Duration,
    /// Cleared when collection stops; late events are dropped.
    pub collecting: Arc<AtomicBool>,
    /// Set on a persistence failure; stops all further dispatch.
    pub fatal: Arc<AtomicBool>,
    pub dropped_events: Arc<AtomicU64>,
}

/// Running sampling session. Dropping without [`Scheduler::shutdown`]
/// leaks the threads, so the engine always shuts it down explicitly.
pub(crate) struct Scheduler {
    shutdown: Arc<AtomicBool>,
    sender: Sender<Task>,
    timer: Option<JoinHandle<()>>,
    workers: Vec<JoinHandle<()>>,
}

impl Scheduler {
    /// Spawn the timer and `worker_count` workers over `tasks`.
    pub fn start(
        tasks: Vec<Arc<PolledTask>>,
        worker_count: usize,
        context: Arc<SchedulerContext>,
    ) -> Self {
        let shutdown = Arc::new(AtomicBool::new(false));
        let (sender, receiver) = bounded::<Task>(tasks.len().max(worker_count) * 2);

        let workers = (0..worker_count)
            .map(|index| {
                let receiver = receiver.clone();
                let tasks = tasks.clone();
                let context = Arc::clone(&context);
                let shutdown = Arc::clone(&shutdown);
                thread::Builder::new()
                    .name(format!("statmon-worker-{index}"))
                    .spawn(move || worker_loop(receiver, tasks, context, shutdown))
                    .expect("spawn sampling worker")
            })
            .collect();

        let timer = {
            let tasks = tasks.clone();
            let sender = sender.clone();
            let context = Arc::clone(&context);
            let shutdown = Arc::clone(&shutdown);
            thread::Builder::new()
                .name("statmon-timer".to_string())
                .spawn(move || timer_loop(tasks, sender, context, shutdown))
                .expect("spawn sampling timer")
        };

        Scheduler {
            shutdown,
            sender,
            timer: Some(timer),
            workers,
        }
    }

    /// Sender used by event-subscription callbacks.
    pub fn sender(&self) -> Sender<Task> {
        self.sender.clone()
    }

    /// Cancel at tick boundaries, then join each thread with a bound.
    /// Threads still running past the bound are abandoned with a warning.
    pub fn shutdown(mut self) {
        self.shutdown.store(true, Ordering::Release);
        drop(self.sender);

        if let Some(timer) = self.timer.take() {
            join_bounded(timer, "timer");
        }
        for worker in self.workers.drain(..) {
            join_bounded(worker, "worker");
        }
    }
}

fn join_bounded(handle: JoinHandle<()>, role: &str) {
    let deadline = Instant::now() + JOIN_TIMEOUT;
    while !handle.is_finished() && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(5));
    }
    if handle.is_finished() {
        let _ = handle.join();
    } else {
        warn!("sampling {role} thread did not stop within {JOIN_TIMEOUT:?}, abandoning it");
    }
}

fn timer_loop(
    tasks: Vec<Arc<PolledTask>>,
    sender: Sender<Task>,
    context: Arc<SchedulerContext>,
    shutdown: Arc<AtomicBool>,
) {
    let start = Instant::now();
    let mut deadlines: Vec<Instant> = tasks.iter().map(|_| start).collect();

    while !shutdown.load(Ordering::Acquire) {
        if context.fatal.load(Ordering::Acquire) {
            // durability contract broke; no further sampling
            return;
        }

        let now = Instant::now();
        let mut next_wake = now + TIMER_RESOLUTION;

        for (index, task) in tasks.iter().enumerate() {
            if now >= deadlines[index] {
                dispatch(task, index, &sender);
                // skip missed periods instead of bursting to catch up
                while deadlines[index] <= now {
                    deadlines[index] += task.period;
                }
            }
            next_wake = next_wake.min(deadlines[index]);
        }

        let now = Instant::now();
        if next_wake > now {
            thread::sleep((next_wake - now).min(TIMER_RESOLUTION));
        }
    }
}

fn dispatch(task: &Arc<PolledTask>, index: usize, sender: &Sender<Task>) {
    // a tick overlapping the previous read is dropped, not queued
    if task.in_flight.swap(true, Ordering::AcqRel) {
        task.attr.metrics.overruns.fetch_add(1, Ordering::Relaxed);
        return;
    }
    match sender.try_send(Task::Poll(index)) {
        Ok(()) => {}
        Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {
            task.attr.metrics.overruns.fetch_add(1, Ordering::Relaxed);
            task.in_flight.store(false, Ordering::Release);
        }
    }
}

fn worker_loop(
    receiver: Receiver<Task>,
    tasks: Vec<Arc<PolledTask>>,
    context: Arc<SchedulerContext>,
    shutdown: Arc<AtomicBool>,
) {
    while !shutdown.load(Ordering::Acquire) {
        let task = match receiver.recv_timeout(Duration::from_millis(50)) {
            Ok(task) => task,
            Err(crossbeam::channel::RecvTimeoutError::Timeout) => continue,
            Err(crossbeam::channel::RecvTimeoutError::Disconnected) => return,
        };

        match task {
            Task::Poll(index) => {
                let polled = &tasks[index];
                run_tick(polled, &context);
                polled.in_flight.store(false, Ordering::Release);
            }
            Task::Event(attr, reading) => {
                if !context.collecting.load(Ordering::Acquire) {
                    context.dropped_events.fetch_add(1, Ordering::Relaxed);
                    continue;
                }
                store_reading(&attr, reading, &context);
            }
        }
    }
}

fn run_tick(task: &PolledTask, context: &SchedulerContext) {
    let attr = &task.attr;
    match task.client.read(&attr.attribute_name, context.read_timeout) {
        Ok(reading) => store_reading(attr, reading, context),
        Err(e) => {
            attr.metrics.read_failures.fetch_add(1, Ordering::Relaxed);
            debug!(attribute = %attr.full_name, "read failed: {e}");
        }
    }
}

fn store_reading(attr: &AttributeRef, reading: Reading, context: &SchedulerContext) {
    let value = AttributeValue {
        read_ts: reading.read_ts,
        write_ts: reading.write_ts,
        value: reading.value,
        quality: reading.quality,
        source_id: attr.id,
    };
    if let Err(e) = attr.add(value) {
        // the durability contract is broken; poison the engine
        error!(attribute = %attr.full_name, "fatal storage failure: {e}");
        context.fatal.store(true, Ordering::Release);
    }
}
