// SPDX-License-Identifier: Apache-2.0 OR MIT
// Logger facade: configure, write, flush, shut down

use super::aggregator::{Aggregator, DrainError};
use super::clock::MonotonicClock;
use super::context::{CallingContext, ContextHandle, ContextKey, ANONYMOUS_CONTEXT_NAME};
use super::entry::{format_with_context, Message};
use super::registry::{ProducerRegistry, ProducerSlot};
use super::scheduler::{LaunchMode, Scheduler, SchedulerError, ThreadScheduler, TokioScheduler};
use super::sink::{ConsoleMirror, LogSink};
use crate::config::{ConfigError, LoggerOptions};
use crossbeam_utils::Backoff;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock, Weak};
use thiserror::Error;

const UNCONFIGURED: u8 = 0;
const CONFIGURED: u8 = 1;
const SHUTTING_DOWN: u8 = 2;
const SHUT_DOWN: u8 = 3;

/// Name of the thread running the flush timer
pub const FLUSH_THREAD_NAME: &str = "bml-flush";

/// Lifecycle of a [`Logger`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoggerState {
    Unconfigured,
    Configured,
    ShuttingDown,
    ShutDown,
}

impl LoggerState {
    fn from_u8(value: u8) -> Self {
        match value {
            UNCONFIGURED => LoggerState::Unconfigured,
            CONFIGURED => LoggerState::Configured,
            SHUTTING_DOWN => LoggerState::ShuttingDown,
            _ => LoggerState::ShutDown,
        }
    }
}

#[derive(Debug, Error)]
pub enum LoggerError {
    #[error("logger is already configured")]
    AlreadyConfigured,
    #[error("logger has been shut down")]
    ShutDown,
    #[error("logger is not configured")]
    NotConfigured,
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
}

/// Counters snapshot returned by [`Logger::stats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggerStats {
    /// Messages accepted into a producer channel
    pub accepted: u64,
    /// Messages dropped because their producer channel was full
    pub dropped: u64,
    pub drain_cycles: u64,
    pub producers: usize,
    /// Messages buffered in producer and consumer channels right now
    pub pending: usize,
    /// Shutdown has freed the channels
    pub released: bool,
}

/// Which timer drives the periodic flush
enum FlushTimer {
    Thread,
    Tokio(tokio::runtime::Handle),
}

/// Everything built by `configure`
struct Engine {
    options: LoggerOptions,
    clock: MonotonicClock,
    /// None once shutdown has released the channels
    aggregator: RwLock<Option<Aggregator<Message>>>,
    registry: ProducerRegistry<ContextKey>,
    /// None once the sink has been released at shutdown
    sink: Mutex<Option<Box<dyn LogSink>>>,
}

struct LoggerInner {
    state: AtomicU8,
    engine: OnceLock<Engine>,
    scheduler: Mutex<Option<Box<dyn Scheduler>>>,
    /// Serializes configure and shutdown
    lifecycle: Mutex<()>,
    /// Writers currently between the state check and their push
    active_writers: AtomicUsize,
    accepted: AtomicU64,
    dropped: AtomicU64,
    drain_cycles: AtomicU64,
    drop_reported: AtomicBool,
}

/// Background message logger
///
/// A cheap cloneable handle. Any thread may write; writes never block and
/// never wait on the sink. Lines reach the sink from the periodic flush, from
/// [`print_all_remaining_messages`](Self::print_all_remaining_messages), or at
/// [`shutdown`](Self::shutdown).
///
/// Dropping the last handle of a configured logger shuts it down.
#[derive(Clone)]
pub struct Logger {
    inner: Arc<LoggerInner>,
}

impl Logger {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(LoggerInner {
                state: AtomicU8::new(UNCONFIGURED),
                engine: OnceLock::new(),
                scheduler: Mutex::new(None),
                lifecycle: Mutex::new(()),
                active_writers: AtomicUsize::new(0),
                accepted: AtomicU64::new(0),
                dropped: AtomicU64::new(0),
                drain_cycles: AtomicU64::new(0),
                drop_reported: AtomicBool::new(false),
            }),
        }
    }

    /// Attach `sink` and start the flush timer on a dedicated thread
    pub fn configure<S>(&self, options: LoggerOptions, sink: S) -> Result<(), LoggerError>
    where
        S: LogSink + 'static,
    {
        self.configure_with(options, Box::new(sink), FlushTimer::Thread)
    }

    /// Like [`configure`](Self::configure), with the flush timer on a tokio runtime
    pub fn configure_on_runtime<S>(
        &self,
        options: LoggerOptions,
        sink: S,
        runtime: tokio::runtime::Handle,
    ) -> Result<(), LoggerError>
    where
        S: LogSink + 'static,
    {
        self.configure_with(options, Box::new(sink), FlushTimer::Tokio(runtime))
    }

    fn configure_with(
        &self,
        options: LoggerOptions,
        sink: Box<dyn LogSink>,
        timer: FlushTimer,
    ) -> Result<(), LoggerError> {
        options.validate()?;
        let inner = &self.inner;
        let _lifecycle = inner.lifecycle.lock();

        match inner.state.load(Ordering::Acquire) {
            UNCONFIGURED => {}
            CONFIGURED => return Err(LoggerError::AlreadyConfigured),
            _ => return Err(LoggerError::ShutDown),
        }

        // The timer only holds a weak reference, so it never keeps the
        // logger alive on its own
        let weak: Weak<LoggerInner> = Arc::downgrade(inner);
        let tick = move || {
            if let Some(inner) = weak.upgrade() {
                inner.on_flush_timer();
            }
        };
        let interval = options.flush_interval();
        let scheduler: Box<dyn Scheduler> = match timer {
            FlushTimer::Thread => Box::new(ThreadScheduler::new(
                FLUSH_THREAD_NAME,
                interval,
                LaunchMode::WhenSignaled,
                tick,
            )?),
            FlushTimer::Tokio(runtime) => Box::new(TokioScheduler::new(
                runtime,
                interval,
                LaunchMode::WhenSignaled,
                tick,
            )?),
        };

        let mut sink = if options.mirror_to_console {
            Box::new(ConsoleMirror::new(sink)) as Box<dyn LogSink>
        } else {
            sink
        };
        if let Some(welcome) = &options.welcome_message {
            sink.write_line(welcome);
            sink.flush();
        }

        let aggregator = Aggregator::new(options.aggregator_config());
        let aggregator = if options.sort_by_timestamp {
            aggregator.sorted_by_timestamp()
        } else {
            aggregator
        };
        let registry = ProducerRegistry::new();
        // Reserve the shared slot up front: writers that overflow the
        // producer limit fall back to it, so it must always exist
        let _ = registry.get_or_create(ContextKey::Anonymous, ANONYMOUS_CONTEXT_NAME, || {
            aggregator.create_producer()
        });

        let launch = options.launch;
        let _ = inner.engine.set(Engine {
            options,
            clock: MonotonicClock::new(),
            aggregator: RwLock::new(Some(aggregator)),
            registry,
            sink: Mutex::new(Some(sink)),
        });
        *inner.scheduler.lock() = Some(scheduler);
        inner.state.store(CONFIGURED, Ordering::SeqCst);

        if launch == LaunchMode::Immediately {
            self.start_flush_timer()?;
        }
        Ok(())
    }

    /// Start the periodic flush (for `LaunchMode::WhenSignaled`)
    ///
    /// A no-op when the timer is already running.
    pub fn start_flush_timer(&self) -> Result<(), LoggerError> {
        match self.inner.state.load(Ordering::Acquire) {
            CONFIGURED => {}
            UNCONFIGURED => return Err(LoggerError::NotConfigured),
            _ => return Err(LoggerError::ShutDown),
        }
        if let Some(scheduler) = self.inner.scheduler.lock().as_ref() {
            scheduler.start()?;
        }
        Ok(())
    }

    pub fn is_flush_timer_running(&self) -> bool {
        self.inner
            .scheduler
            .lock()
            .as_ref()
            .is_some_and(|s| s.is_running())
    }

    /// Log `message` under the calling thread's name
    ///
    /// Unnamed threads log as `"Anonymous"` and share one channel. Calling
    /// this before [`configure`](Self::configure) is a bug (asserted in debug
    /// builds, ignored otherwise); after shutdown it is silently ignored.
    pub fn write_to_log(&self, message: impl AsRef<str>) {
        let context = CallingContext::current();
        self.inner
            .write(context.key, &context.name, message.as_ref());
    }

    /// Log `message` through an explicitly registered context
    ///
    /// A [`ContextHandle`] can move between threads but cannot be shared or
    /// cloned, so writes through one handle never overlap.
    pub fn write_with(&self, handle: &ContextHandle, message: impl AsRef<str>) {
        self.inner
            .write(handle.key(), handle.name(), message.as_ref());
    }

    /// Create a producer identity for a context without a named thread
    ///
    /// The handle gets its own channel on first write.
    pub fn register_context(&self, name: impl Into<String>) -> ContextHandle {
        ContextHandle::new(name)
    }

    /// Drain everything buffered right now and write it to the sink
    pub fn print_all_remaining_messages(&self) {
        if let Some(engine) = self.inner.engine.get() {
            self.inner.flush(engine);
        }
    }

    /// Flush, stop the timer, free the channels, reveal the sink if asked,
    /// and release it
    ///
    /// Waits for writers already inside `write_to_log` so none of their
    /// messages are lost. Safe to call more than once and from any thread.
    pub fn shutdown(&self) {
        self.inner.shutdown();
    }

    pub fn state(&self) -> LoggerState {
        LoggerState::from_u8(self.inner.state.load(Ordering::Acquire))
    }

    pub fn is_configured(&self) -> bool {
        self.state() == LoggerState::Configured
    }

    pub fn options(&self) -> Option<&LoggerOptions> {
        self.inner.engine.get().map(|engine| &engine.options)
    }

    /// File backing the sink, while the sink is attached
    pub fn log_location(&self) -> Option<PathBuf> {
        let engine = self.inner.engine.get()?;
        let sink = engine.sink.lock();
        sink.as_ref()?.location().map(|p| p.to_path_buf())
    }

    pub fn stats(&self) -> LoggerStats {
        let inner = &self.inner;
        let mut stats = LoggerStats {
            accepted: inner.accepted.load(Ordering::Relaxed),
            dropped: inner.dropped.load(Ordering::Relaxed),
            ..Default::default()
        };
        if let Some(engine) = inner.engine.get() {
            stats.drain_cycles = inner.drain_cycles.load(Ordering::Relaxed);
            stats.producers = engine.registry.len();
            match engine.aggregator.read().as_ref() {
                Some(aggregator) => {
                    stats.pending = (0..aggregator.producer_count())
                        .filter_map(|index| aggregator.producer_backlog(index))
                        .sum::<usize>()
                        + aggregator.consumer_backlog();
                }
                None => stats.released = true,
            }
        }
        stats
    }
}

impl Default for Logger {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger")
            .field("state", &self.state())
            .field("stats", &self.stats())
            .finish()
    }
}

/// Keeps `active_writers` accurate on every exit path of a write
struct WriterGuard<'a>(&'a AtomicUsize);

impl<'a> WriterGuard<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for WriterGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl LoggerInner {
    fn write(&self, key: ContextKey, name: &str, message: &str) {
        // Register before reading the state: shutdown flips the state first
        // and then waits for this counter, so one of the two always sees
        // the other
        let _writer = WriterGuard::enter(&self.active_writers);
        let state = self.state.load(Ordering::SeqCst);
        debug_assert!(
            state != UNCONFIGURED,
            "write_to_log called before configure"
        );
        if state != CONFIGURED {
            return;
        }
        let Some(engine) = self.engine.get() else {
            return;
        };
        // Shutdown only takes the write side once no writer is left, so this
        // never waits
        let aggregator = engine.aggregator.read();
        let Some(aggregator) = aggregator.as_ref() else {
            return;
        };

        let slot = match engine
            .registry
            .get_or_create(key, name, || aggregator.create_producer())
        {
            Ok(slot) => slot,
            Err(_) => {
                // Out of producer slots: share the anonymous channel, but keep
                // the caller's own name on the line
                match engine.registry.get(&ContextKey::Anonymous) {
                    Some(shared) => ProducerSlot {
                        display_name: name.to_string(),
                        ..shared
                    },
                    None => {
                        self.record_drop(name, aggregator.producer_capacity());
                        return;
                    }
                }
            }
        };

        let text = format_with_context(&slot.display_name, message);
        let push = || {
            let item = Message::new(engine.clock.stamp(), text);
            // SAFETY: a private slot belongs to one named thread or to one
            // ContextHandle, which is neither Clone nor Sync. A shared slot is
            // only pushed to under the registry's shared lock.
            unsafe { aggregator.add(item, slot.index) }
        };
        let result = if slot.shared {
            engine.registry.with_shared_lock(push)
        } else {
            push()
        };

        match result {
            Ok(()) => {
                self.accepted.fetch_add(1, Ordering::Relaxed);
                metrics::counter!("bml_messages_accepted_total").increment(1);
            }
            Err(_) => {
                self.record_drop(&slot.display_name, aggregator.producer_capacity());
            }
        }
    }

    /// Count a dropped message; the first drop is reported once on stderr
    fn record_drop(&self, producer: &str, capacity: usize) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("bml_messages_dropped_total").increment(1);

        if !self.drop_reported.swap(true, Ordering::Relaxed) {
            let report = serde_json::json!({
                "timestamp": chrono::Utc::now().to_rfc3339(),
                "level": "Warning",
                "component": "background_logger",
                "message": "producer channel full, dropping log messages (reported once)",
                "producer": producer,
                "capacity": capacity,
            });
            eprintln!("{}", report);
        }
    }

    fn on_flush_timer(&self) {
        if self.state.load(Ordering::Acquire) != CONFIGURED {
            return;
        }
        if let Some(engine) = self.engine.get() {
            self.flush(engine);
        }
    }

    /// One drain cycle followed by writing everything pulled to the sink
    ///
    /// The sink lock is held across the drain so lines from two concurrent
    /// flushes cannot interleave out of cycle order.
    fn flush(&self, engine: &Engine) {
        let mut sink = engine.sink.lock();
        let Some(sink) = sink.as_mut() else {
            return;
        };
        let aggregator = engine.aggregator.read();
        let Some(aggregator) = aggregator.as_ref() else {
            return;
        };
        let show_timestamp = engine.options.show_timestamp;

        let drained = aggregator.drain_cycle();
        self.drain_cycles.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("bml_drain_cycles_total").increment(1);

        while let Some(message) = aggregator.pull() {
            sink.write_line(&message.render(show_timestamp));
        }
        // Items that did not fit in the consumer channel come after
        // everything that did
        if let Err(DrainError::ConsumerFull { undelivered, .. }) = drained {
            for message in undelivered {
                sink.write_line(&message.render(show_timestamp));
            }
        }
        sink.flush();
    }

    fn shutdown(&self) {
        let _lifecycle = self.lifecycle.lock();

        match self.state.compare_exchange(
            CONFIGURED,
            SHUTTING_DOWN,
            Ordering::SeqCst,
            Ordering::SeqCst,
        ) {
            Ok(_) => {}
            Err(UNCONFIGURED) => {
                self.state.store(SHUT_DOWN, Ordering::SeqCst);
                return;
            }
            Err(_) => return,
        }

        let backoff = Backoff::new();
        while self.active_writers.load(Ordering::SeqCst) > 0 {
            backoff.snooze();
        }

        if let Some(engine) = self.engine.get() {
            self.flush(engine);
        }

        // Halting from inside a timer callback is allowed; the scheduler
        // skips joining its own thread
        let scheduler = self.scheduler.lock().take();
        if let Some(scheduler) = scheduler {
            scheduler.halt();
        }

        if let Some(engine) = self.engine.get() {
            // Writers are gone and the timer is halted: free the channels even
            // if other handles outlive this call
            drop(engine.aggregator.write().take());

            let sink = engine.sink.lock().take();
            if let Some(mut sink) = sink {
                if engine.options.reveal_on_shutdown {
                    if let Err(e) = sink.reveal_to_user() {
                        let report = serde_json::json!({
                            "timestamp": chrono::Utc::now().to_rfc3339(),
                            "level": "Warning",
                            "component": "background_logger",
                            "message": format!("failed to reveal log: {}", e),
                        });
                        eprintln!("{}", report);
                    }
                }
                sink.flush();
            }
        }

        self.state.store(SHUT_DOWN, Ordering::SeqCst);
    }
}

impl Drop for LoggerInner {
    fn drop(&mut self) {
        self.shutdown();
    }
}
