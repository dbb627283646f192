// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Property-based tests: aggregator drain cycle
//!
//! - A sorted drain cycle delivers timestamps in non-decreasing order.
//! - Every accepted item is delivered exactly once.

#[cfg(test)]
mod tests {
    use background_logger::logging::{
        Aggregator, AggregatorConfig, ConsumerFullPolicy, DrainError, Message,
    };
    use proptest::prelude::*;

    fn aggregator(producers: usize, capacity: usize) -> Aggregator<Message> {
        let aggregator = Aggregator::new(AggregatorConfig {
            producer_capacity: capacity,
            consumer_capacity: producers * capacity,
            max_producers: producers,
            consumer_full: ConsumerFullPolicy::Fail,
        })
        .sorted_by_timestamp();
        for _ in 0..producers {
            aggregator.create_producer().unwrap();
        }
        aggregator
    }

    proptest! {
        /// **Property:** sorted cycles are non-decreasing in timestamp and lose nothing.
        #[test]
        fn test_sorted_cycle_is_non_decreasing(
            entries in prop::collection::vec((0usize..4, 0.0f64..1.0e6), 0..200),
        ) {
            let aggregator = aggregator(4, 200);
            for (i, &(producer, stamp)) in entries.iter().enumerate() {
                // SAFETY: the test thread is the only writer
                unsafe { aggregator.add(Message::new(stamp, format!("{}", i)), producer) }
                    .unwrap();
            }
            prop_assert_eq!(aggregator.drain_cycle().unwrap(), entries.len());

            let pulled: Vec<Message> = std::iter::from_fn(|| aggregator.pull()).collect();
            prop_assert_eq!(pulled.len(), entries.len());
            for pair in pulled.windows(2) {
                prop_assert!(pair[0].timestamp <= pair[1].timestamp);
            }

            let mut ids: Vec<usize> = pulled.iter().map(|m| m.text.parse().unwrap()).collect();
            ids.sort_unstable();
            prop_assert_eq!(ids, (0..entries.len()).collect::<Vec<_>>());
        }

        /// **Property:** under the Fail policy, delivered plus undelivered is the whole cycle.
        #[test]
        fn test_fail_policy_returns_the_remainder(
            count in 0usize..64,
            consumer_capacity in 1usize..32,
        ) {
            let aggregator = Aggregator::new(AggregatorConfig {
                producer_capacity: 64,
                consumer_capacity,
                max_producers: 1,
                consumer_full: ConsumerFullPolicy::Fail,
            });
            let p = aggregator.create_producer().unwrap();
            for i in 0..count {
                // SAFETY: the test thread is the only writer
                unsafe { aggregator.add(i, p) }.unwrap();
            }

            let mut delivered: Vec<usize> = Vec::new();
            let mut rest = Vec::new();
            match aggregator.drain_cycle() {
                Ok(n) => prop_assert_eq!(n, count),
                Err(DrainError::ConsumerFull { delivered: n, undelivered }) => {
                    prop_assert_eq!(n, consumer_capacity);
                    rest = undelivered;
                }
            }
            delivered.extend(std::iter::from_fn(|| aggregator.pull()));
            delivered.extend(rest);
            prop_assert_eq!(delivered, (0..count).collect::<Vec<_>>());
        }
    }
}
