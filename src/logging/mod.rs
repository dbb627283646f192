// SPDX-License-Identifier: Apache-2.0 OR MIT
// Background message logger
//
// Writers push into their own bounded ring channel without blocking. A
// periodic drain gathers every channel, optionally sorts by timestamp, and
// hands the merged batch to the sink through one larger consumer channel.

pub mod aggregator;
pub mod clock;
pub mod context;
mod entry;
mod logger;
#[macro_use]
mod macros;
pub mod registry;
pub mod ringbuffer;
pub mod scheduler;
pub mod sink;

// Public exports
pub use aggregator::{
    Aggregator, AggregatorConfig, AggregatorError, ConsumerFullPolicy, DrainError, PushError,
    RemoveError,
};
pub use clock::MonotonicClock;
pub use context::{CallingContext, ContextHandle, ContextKey, ANONYMOUS_CONTEXT_NAME};
pub use entry::{format_with_context, Message, Timestamped};
pub use logger::{Logger, LoggerError, LoggerState, LoggerStats, FLUSH_THREAD_NAME};
pub use registry::{ProducerRegistry, ProducerSlot, SharedKey};
pub use ringbuffer::RingChannel;
pub use scheduler::{LaunchMode, Scheduler, SchedulerError, ThreadScheduler, TokioScheduler};
pub use sink::{ConsoleMirror, FileSink, LogSink, MemorySink, StderrSink, StdoutSink};
