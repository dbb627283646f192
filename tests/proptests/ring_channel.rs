// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Property-based tests: ring channel
//!
//! - Items pushed within capacity come back out in push order.
//! - A full channel rejects the next push, hands the item back and keeps its
//!   contents untouched.

#[cfg(test)]
mod tests {
    use background_logger::logging::RingChannel;
    use proptest::prelude::*;

    proptest! {
        /// **Property:** pull order equals push order for any batch that fits.
        #[test]
        fn test_fifo_within_capacity(
            capacity in 1usize..256,
            items in prop::collection::vec(any::<u32>(), 0..256),
        ) {
            let mut channel = RingChannel::new(capacity);
            let fitting: Vec<u32> = items.into_iter().take(capacity).collect();
            for &item in &fitting {
                prop_assert!(channel.try_push(item).is_ok());
            }
            let pulled: Vec<u32> = std::iter::from_fn(|| channel.try_pull()).collect();
            prop_assert_eq!(pulled, fitting);
        }

        /// **Property:** N items fill a channel of capacity N, item N+1 bounces.
        #[test]
        fn test_full_channel_rejects_and_keeps_contents(capacity in 1usize..128) {
            let mut channel = RingChannel::new(capacity);
            for i in 0..capacity {
                prop_assert!(channel.try_push(i).is_ok());
            }
            prop_assert!(channel.is_full());
            prop_assert_eq!(channel.try_push(usize::MAX), Err(usize::MAX));
            prop_assert_eq!(channel.available_for_read(), capacity);
            prop_assert_eq!(channel.free_space(), 0);

            let pulled: Vec<usize> = std::iter::from_fn(|| channel.try_pull()).collect();
            prop_assert_eq!(pulled, (0..capacity).collect::<Vec<_>>());
        }

        /// **Property:** interleaved push/pull sequences behave like a bounded queue.
        #[test]
        fn test_matches_bounded_queue_model(
            capacity in 1usize..32,
            ops in prop::collection::vec(any::<Option<u16>>(), 0..200),
        ) {
            let mut channel = RingChannel::new(capacity);
            let mut model = std::collections::VecDeque::new();
            for op in ops {
                match op {
                    Some(value) => {
                        let accepted = channel.try_push(value).is_ok();
                        prop_assert_eq!(accepted, model.len() < capacity);
                        if accepted {
                            model.push_back(value);
                        }
                    }
                    None => prop_assert_eq!(channel.try_pull(), model.pop_front()),
                }
                prop_assert_eq!(channel.available_for_read(), model.len());
            }
        }
    }
}
