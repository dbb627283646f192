// SPDX-License-Identifier: Apache-2.0 OR MIT
// Strictly increasing millisecond timestamps

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Smallest step a colliding timestamp is moved forward by, in milliseconds
pub const TIMESTAMP_EPSILON_MS: f64 = 1e-7;

/// Monotonic clock that never hands out the same value twice
///
/// Readings are milliseconds since the clock was created. If the raw reading
/// is not greater than the previous stamp it is nudged just past it, so the
/// sort step in the aggregator never sees two equal timestamps.
#[derive(Debug)]
pub struct MonotonicClock {
    start: Instant,
    /// f64 bits of the last stamp handed out
    last: AtomicU64,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            last: AtomicU64::new(f64::NEG_INFINITY.to_bits()),
        }
    }

    /// Raw elapsed milliseconds, possibly equal to a previous reading
    #[inline]
    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1_000.0
    }

    /// Next stamp, strictly greater than every stamp returned before
    pub fn stamp(&self) -> f64 {
        self.stamp_from(self.elapsed_ms())
    }

    /// Stamp an externally read time, nudging it past the last stamp if needed
    pub fn stamp_from(&self, reading: f64) -> f64 {
        let mut last_bits = self.last.load(Ordering::Acquire);
        loop {
            let last = f64::from_bits(last_bits);
            let candidate = if reading > last { reading } else { nudge(last) };

            match self.last.compare_exchange_weak(
                last_bits,
                candidate.to_bits(),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return candidate,
                Err(current) => last_bits = current,
            }
        }
    }

    /// Last stamp handed out, if any
    pub fn last_stamp(&self) -> Option<f64> {
        let last = f64::from_bits(self.last.load(Ordering::Acquire));
        last.is_finite().then_some(last)
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

/// Move `value` forward by the epsilon, or by one ULP once the epsilon is
/// below the float resolution at this magnitude
fn nudge(value: f64) -> f64 {
    let stepped = value + TIMESTAMP_EPSILON_MS;
    if stepped > value {
        stepped
    } else {
        f64::from_bits(value.to_bits() + 1)
    }
}
