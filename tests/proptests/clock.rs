// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Property-based tests: monotonic clock

#[cfg(test)]
mod tests {
    use background_logger::logging::MonotonicClock;
    use proptest::prelude::*;

    proptest! {
        /// **Property:** stamps strictly increase whatever the raw readings do.
        #[test]
        fn test_stamps_strictly_increase(
            readings in prop::collection::vec(0.0f64..1.0e9, 1..100),
        ) {
            let clock = MonotonicClock::new();
            let stamps: Vec<f64> = readings.iter().map(|&r| clock.stamp_from(r)).collect();
            for pair in stamps.windows(2) {
                prop_assert!(pair[0] < pair[1]);
            }
            prop_assert_eq!(clock.last_stamp(), stamps.last().copied());
        }
    }
}
