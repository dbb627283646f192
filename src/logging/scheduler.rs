// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Periodic drain scheduling.
//!
//! A scheduler invokes one zero-argument callback at a fixed interval. Two
//! backends share the same gate logic:
//!
//! - [`ThreadScheduler`]: a dedicated OS thread sleeping on a condvar
//! - [`TokioScheduler`]: a tokio interval task that runs the callback on the
//!   blocking pool
//!
//! Guarantees common to both:
//! - at most one callback runs at a time
//! - ticks that elapse while a callback is still running are skipped, never queued
//! - once `halt()` returns no new callback starts (a running one finishes)
//! - `halt()` may be called from inside the callback itself

use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::time::MissedTickBehavior;

/// Callback run on every tick
pub type Tick = Arc<dyn Fn() + Send + Sync>;

/// Whether a scheduler starts ticking at construction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LaunchMode {
    #[default]
    Immediately,
    /// Wait for an explicit [`Scheduler::start`]
    WhenSignaled,
}

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("scheduler interval must be non-zero")]
    ZeroInterval,
    #[error("failed to spawn scheduler thread: {0}")]
    Spawn(#[from] io::Error),
    #[error("no tokio runtime available")]
    NoRuntime,
}

/// A recurring timer driving one callback
pub trait Scheduler: Send + Sync {
    /// Start ticking; a no-op if already running
    fn start(&self) -> Result<(), SchedulerError>;

    /// Stop ticking; always safe, idempotent
    fn halt(&self);

    fn is_running(&self) -> bool;

    fn interval(&self) -> Duration;
}

// ============================================================================
// Tick gate (shared by both backends)
// ============================================================================

#[derive(Default)]
struct GateState {
    running: bool,
    /// Bumped on every start and halt; a worker only fires for its own generation
    generation: u64,
    /// Thread currently inside the callback
    firing_on: Option<ThreadId>,
}

impl GateState {
    fn is_current(&self, generation: u64) -> bool {
        self.running && self.generation == generation
    }
}

struct TickGate {
    state: Mutex<GateState>,
    changed: Condvar,
    tick: Tick,
}

/// Clears `firing_on` even if the callback panics
struct FiringGuard<'a>(&'a TickGate);

impl Drop for FiringGuard<'_> {
    fn drop(&mut self) {
        self.0.state.lock().firing_on = None;
        self.0.changed.notify_all();
    }
}

impl TickGate {
    fn new(tick: Tick) -> Self {
        Self {
            state: Mutex::new(GateState::default()),
            changed: Condvar::new(),
            tick,
        }
    }

    /// Open the gate for a new worker; None if it is already open
    fn open(&self) -> Option<u64> {
        let mut state = self.state.lock();
        if state.running {
            return None;
        }
        // A callback left over from a halt issued inside it must finish first
        let me = thread::current().id();
        while matches!(state.firing_on, Some(id) if id != me) {
            self.changed.wait(&mut state);
        }
        state.running = true;
        state.generation += 1;
        Some(state.generation)
    }

    /// Close the gate and wait for an in-flight callback
    ///
    /// Returns without waiting when called from inside the callback.
    fn close(&self) {
        let mut state = self.state.lock();
        state.running = false;
        state.generation += 1;
        self.changed.notify_all();

        let me = thread::current().id();
        while let Some(id) = state.firing_on {
            if id == me {
                return;
            }
            self.changed.wait(&mut state);
        }
    }

    /// Run the callback if `generation` is still live
    fn fire(&self, generation: u64) -> bool {
        {
            let mut state = self.state.lock();
            if !state.is_current(generation) {
                return false;
            }
            state.firing_on = Some(thread::current().id());
        }
        let _guard = FiringGuard(self);
        (self.tick)();
        true
    }

    fn is_running(&self) -> bool {
        self.state.lock().running
    }
}

fn check_interval(interval: Duration) -> Result<(), SchedulerError> {
    if interval.is_zero() {
        return Err(SchedulerError::ZeroInterval);
    }
    Ok(())
}

// ============================================================================
// Thread backend
// ============================================================================

/// Scheduler running the callback on a dedicated OS thread
pub struct ThreadScheduler {
    gate: Arc<TickGate>,
    interval: Duration,
    thread_name: String,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl ThreadScheduler {
    pub fn new<F>(
        thread_name: impl Into<String>,
        interval: Duration,
        launch: LaunchMode,
        tick: F,
    ) -> Result<Self, SchedulerError>
    where
        F: Fn() + Send + Sync + 'static,
    {
        check_interval(interval)?;
        let scheduler = Self {
            gate: Arc::new(TickGate::new(Arc::new(tick))),
            interval,
            thread_name: thread_name.into(),
            worker: Mutex::new(None),
        };
        if launch == LaunchMode::Immediately {
            scheduler.start()?;
        }
        Ok(scheduler)
    }

    fn run_worker(gate: Arc<TickGate>, interval: Duration, generation: u64) {
        let mut next = Instant::now() + interval;
        loop {
            {
                let mut state = gate.state.lock();
                loop {
                    if !state.is_current(generation) {
                        return;
                    }
                    if Instant::now() >= next {
                        break;
                    }
                    gate.changed.wait_until(&mut state, next);
                }
            }

            if !gate.fire(generation) {
                return;
            }

            next += interval;
            let now = Instant::now();
            if next <= now {
                // Overran one or more ticks: coalesce them
                next = now + interval;
            }
        }
    }
}

impl Scheduler for ThreadScheduler {
    fn start(&self) -> Result<(), SchedulerError> {
        // Open before taking the handle lock: a callback finishing its own
        // halt() needs that lock, and open() may wait for the callback
        let Some(generation) = self.gate.open() else {
            return Ok(());
        };
        let mut worker = self.worker.lock();

        // Reap the previous worker if it has already exited
        if let Some(previous) = worker.take() {
            if previous.is_finished() {
                let _ = previous.join();
            }
        }

        let gate = Arc::clone(&self.gate);
        let interval = self.interval;
        let spawned = thread::Builder::new()
            .name(self.thread_name.clone())
            .spawn(move || Self::run_worker(gate, interval, generation));

        match spawned {
            Ok(handle) => {
                *worker = Some(handle);
                Ok(())
            }
            Err(e) => {
                self.gate.close();
                Err(SchedulerError::Spawn(e))
            }
        }
    }

    fn halt(&self) {
        self.gate.close();

        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            // Joining ourselves would deadlock; the loop exits on its own
            if handle.thread().id() != thread::current().id() {
                let _ = handle.join();
            }
        }
    }

    fn is_running(&self) -> bool {
        self.gate.is_running()
    }

    fn interval(&self) -> Duration {
        self.interval
    }
}

impl Drop for ThreadScheduler {
    fn drop(&mut self) {
        self.halt();
    }
}

// ============================================================================
// Tokio backend
// ============================================================================

/// Scheduler driven by a tokio interval
///
/// The callback may block (a drain can wait on a slow sink), so it runs on
/// the runtime's blocking pool rather than on a worker thread.
pub struct TokioScheduler {
    gate: Arc<TickGate>,
    interval: Duration,
    runtime: tokio::runtime::Handle,
    task: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl TokioScheduler {
    pub fn new<F>(
        runtime: tokio::runtime::Handle,
        interval: Duration,
        launch: LaunchMode,
        tick: F,
    ) -> Result<Self, SchedulerError>
    where
        F: Fn() + Send + Sync + 'static,
    {
        check_interval(interval)?;
        let scheduler = Self {
            gate: Arc::new(TickGate::new(Arc::new(tick))),
            interval,
            runtime,
            task: Mutex::new(None),
        };
        if launch == LaunchMode::Immediately {
            scheduler.start()?;
        }
        Ok(scheduler)
    }

    /// Use the runtime of the calling context
    pub fn current<F>(interval: Duration, launch: LaunchMode, tick: F) -> Result<Self, SchedulerError>
    where
        F: Fn() + Send + Sync + 'static,
    {
        let runtime =
            tokio::runtime::Handle::try_current().map_err(|_| SchedulerError::NoRuntime)?;
        Self::new(runtime, interval, launch, tick)
    }

    async fn run_task(gate: Arc<TickGate>, period: Duration, generation: u64) {
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;

            let gate = Arc::clone(&gate);
            let fired = tokio::task::spawn_blocking(move || gate.fire(generation)).await;
            if !matches!(fired, Ok(true)) {
                return;
            }
        }
    }
}

impl Scheduler for TokioScheduler {
    fn start(&self) -> Result<(), SchedulerError> {
        let Some(generation) = self.gate.open() else {
            return Ok(());
        };
        let mut task = self.task.lock();
        if let Some(previous) = task.take() {
            previous.abort();
        }
        let gate = Arc::clone(&self.gate);
        *task = Some(
            self.runtime
                .spawn(Self::run_task(gate, self.interval, generation)),
        );
        Ok(())
    }

    fn halt(&self) {
        self.gate.close();
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
    }

    fn is_running(&self) -> bool {
        self.gate.is_running()
    }

    fn interval(&self) -> Duration {
        self.interval
    }
}

impl Drop for TokioScheduler {
    fn drop(&mut self) {
        self.halt();
    }
}
