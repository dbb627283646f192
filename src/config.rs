// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Logger configuration.
//!
//! JSON5 format, so files may carry comments and trailing commas:
//!
//! ```json5
//! {
//!   // mirror every line to stdout as well
//!   mirror_to_console: true,
//!   show_timestamp: true,
//!   flush_interval_ms: 25,
//! }
//! ```
//!
//! Every field is optional; missing fields take their defaults.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::logging::aggregator::{AggregatorConfig, ConsumerFullPolicy, DEFAULT_MAX_PRODUCERS};
use crate::logging::ringbuffer::{DEFAULT_CONSUMER_FACTOR, DEFAULT_PRODUCER_CAPACITY};
use crate::logging::scheduler::LaunchMode;

/// Default drain period of the logger's flush timer
pub const DEFAULT_FLUSH_INTERVAL_MS: u64 = 25;

/// Runtime options for a [`Logger`](crate::logging::Logger)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct LoggerOptions {
    /// Copy every line to stdout in addition to the sink
    pub mirror_to_console: bool,

    /// Ask the sink to show itself to the user at shutdown
    pub reveal_on_shutdown: bool,

    /// Prefix each line with its timestamp (ms, six decimals)
    pub show_timestamp: bool,

    /// Order each drain batch by timestamp instead of gather order
    pub sort_by_timestamp: bool,

    pub flush_interval_ms: u64,

    /// Messages each producer channel holds between drains
    pub producer_capacity: usize,

    /// Consumer channel capacity as a multiple of `producer_capacity`
    pub consumer_capacity_factor: usize,

    /// Upper bound on distinct producer contexts
    pub max_producers: usize,

    /// Start the flush timer at configure time or on request
    pub launch: LaunchMode,

    /// First line written to the sink, if set
    #[serde(skip_serializing_if = "Option::is_none")]
    pub welcome_message: Option<String>,
}

impl Default for LoggerOptions {
    fn default() -> Self {
        Self {
            mirror_to_console: false,
            reveal_on_shutdown: false,
            show_timestamp: false,
            sort_by_timestamp: true,
            flush_interval_ms: DEFAULT_FLUSH_INTERVAL_MS,
            producer_capacity: DEFAULT_PRODUCER_CAPACITY,
            consumer_capacity_factor: DEFAULT_CONSUMER_FACTOR,
            max_producers: DEFAULT_MAX_PRODUCERS,
            launch: LaunchMode::Immediately,
            welcome_message: None,
        }
    }
}

impl LoggerOptions {
    /// Load options from a JSON5 file
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;
        Self::parse(&content)
    }

    /// Parse options from a JSON5 string
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        json5::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Serialize to a pretty-printed string readable by [`parse`](Self::parse)
    pub fn to_json5(&self) -> String {
        // Plain JSON is valid JSON5; json5 has no pretty printer
        serde_json::to_string_pretty(self).unwrap_or_else(|_| "{}".to_string())
    }

    pub fn save_to_file(&self, path: &Path) -> Result<(), ConfigError> {
        std::fs::write(path, self.to_json5())
            .map_err(|e| ConfigError::Io {
                path: path.to_path_buf(),
                message: e.to_string(),
            })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.flush_interval_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "flush_interval_ms",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.producer_capacity == 0 {
            return Err(ConfigError::Invalid {
                field: "producer_capacity",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.consumer_capacity_factor == 0 {
            return Err(ConfigError::Invalid {
                field: "consumer_capacity_factor",
                reason: "must be at least 1".to_string(),
            });
        }
        if self
            .producer_capacity
            .checked_mul(self.consumer_capacity_factor)
            .is_none()
        {
            return Err(ConfigError::Invalid {
                field: "consumer_capacity_factor",
                reason: format!(
                    "{} x {} overflows",
                    self.producer_capacity, self.consumer_capacity_factor
                ),
            });
        }
        // One slot is always reserved for anonymous writers
        if self.max_producers < 2 {
            return Err(ConfigError::Invalid {
                field: "max_producers",
                reason: "must be at least 2".to_string(),
            });
        }
        Ok(())
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }

    pub fn consumer_capacity(&self) -> usize {
        self.producer_capacity
            .saturating_mul(self.consumer_capacity_factor)
    }

    /// Aggregator sizing derived from these options
    ///
    /// The logger drains from its own flush path, so the consumer side must
    /// never block waiting for a reader.
    pub fn aggregator_config(&self) -> AggregatorConfig {
        AggregatorConfig {
            producer_capacity: self.producer_capacity,
            consumer_capacity: self.consumer_capacity(),
            max_producers: self.max_producers,
            consumer_full: ConsumerFullPolicy::Fail,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("failed to read config file {}: {message}", .path.display())]
    Io { path: PathBuf, message: String },
    #[error("failed to parse config: {0}")]
    Parse(String),
    #[error("invalid value for '{field}': {reason}")]
    Invalid { field: &'static str, reason: String },
}
