// SPDX-License-Identifier: Apache-2.0 OR MIT
// Log message carried through the producer and consumer channels

use serde::{Deserialize, Serialize};

/// Items that can be ordered by creation time during a drain cycle
pub trait Timestamped {
    /// Creation time in milliseconds on a monotonic clock
    fn timestamp(&self) -> f64;
}

/// A timestamped, already formatted log line
///
/// Created by the logger at the moment of the write call and discarded once
/// the sink has written it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Milliseconds since the owning logger was configured
    pub timestamp: f64,
    /// `"[<context-name>]: <text>"`
    pub text: String,
}

impl Message {
    pub fn new(timestamp: f64, text: impl Into<String>) -> Self {
        Self {
            timestamp,
            text: text.into(),
        }
    }

    /// Render the line handed to the sink
    pub fn render(&self, show_timestamp: bool) -> String {
        if show_timestamp {
            format!("{:.6}: {}", self.timestamp, self.text)
        } else {
            self.text.clone()
        }
    }
}

impl Timestamped for Message {
    #[inline]
    fn timestamp(&self) -> f64 {
        self.timestamp
    }
}

/// Format the message body with the producing context's name
pub fn format_with_context(context_name: &str, message: &str) -> String {
    let mut text = String::with_capacity(context_name.len() + message.len() + 4);
    text.push('[');
    text.push_str(context_name);
    text.push_str("]: ");
    text.push_str(message);
    text
}
