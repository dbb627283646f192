// SPDX-License-Identifier: Apache-2.0 OR MIT
use background_logger::LoggerOptions;

use super::common::{configured, manual_options};

#[test]
fn test_ten_thousand_and_one_writes_without_drain() {
    let (logger, sink) = configured(LoggerOptions {
        producer_capacity: 1_000,
        ..manual_options()
    });
    let handle = logger.register_context("Flood");

    for i in 0..10_001 {
        logger.write_with(&handle, format!("message {}", i));
    }

    let stats = logger.stats();
    assert_eq!(stats.accepted, 1_000);
    assert_eq!(stats.dropped, 9_001);
    assert_eq!(stats.pending, 1_000);

    logger.print_all_remaining_messages();
    let lines = sink.lines();
    assert_eq!(lines.len(), 1_000);
    assert_eq!(lines.first().map(String::as_str), Some("[Flood]: message 0"));
    assert_eq!(lines.last().map(String::as_str), Some("[Flood]: message 999"));
}

#[test]
fn test_drain_frees_room_for_new_writes() {
    let (logger, sink) = configured(LoggerOptions {
        producer_capacity: 10,
        ..manual_options()
    });
    let handle = logger.register_context("Refill");

    for i in 0..15 {
        logger.write_with(&handle, format!("{}", i));
    }
    logger.print_all_remaining_messages();
    for i in 15..20 {
        logger.write_with(&handle, format!("{}", i));
    }
    logger.print_all_remaining_messages();

    let stats = logger.stats();
    assert_eq!(stats.accepted, 15);
    assert_eq!(stats.dropped, 5);
    assert_eq!(sink.len(), 15);
    assert_eq!(sink.lines()[10], "[Refill]: 15");
}

#[test]
fn test_one_full_context_does_not_block_another() {
    let (logger, sink) = configured(LoggerOptions {
        producer_capacity: 3,
        ..manual_options()
    });
    let noisy = logger.register_context("Noisy");
    let quiet = logger.register_context("Quiet");

    for _ in 0..10 {
        logger.write_with(&noisy, "spam");
    }
    logger.write_with(&quiet, "still heard");
    logger.print_all_remaining_messages();

    assert!(sink.lines().contains(&"[Quiet]: still heard".to_string()));
    assert_eq!(logger.stats().dropped, 7);
}
