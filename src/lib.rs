// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Background message logger.
//!
//! Any thread logs through a cloneable [`Logger`] without blocking; a
//! periodic drain merges every writer's channel and writes the result to a
//! [`LogSink`].
//!
//! ```no_run
//! use background_logger::{config::LoggerOptions, FileSink, Logger};
//!
//! let logger = Logger::new();
//! let sink = FileSink::date_stamped("logs", "MyApp", "session", "log").unwrap();
//! logger.configure(LoggerOptions::default(), sink).unwrap();
//! logger.write_to_log("started");
//! logger.shutdown();
//! ```

pub mod config;
pub mod logging;

pub use config::{ConfigError, LoggerOptions};
pub use logging::{
    ContextHandle, FileSink, LaunchMode, LogSink, Logger, LoggerError, LoggerStats, MemorySink,
    StdoutSink,
};
