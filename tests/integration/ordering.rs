// SPDX-License-Identifier: Apache-2.0 OR MIT
use background_logger::logging::{
    format_with_context, Aggregator, AggregatorConfig, ConsumerFullPolicy, Message,
};

use super::common::{configured, manual_options};

fn sorted_aggregator() -> Aggregator<Message> {
    Aggregator::new(AggregatorConfig {
        producer_capacity: 100,
        consumer_capacity: 800,
        max_producers: 8,
        consumer_full: ConsumerFullPolicy::Block,
    })
    .sorted_by_timestamp()
}

fn push(aggregator: &Aggregator<Message>, message: Message, index: usize) {
    // SAFETY: every test here pushes from its own thread only
    unsafe { aggregator.add(message, index) }.unwrap();
}

#[test]
fn test_earlier_timestamp_is_written_first() {
    let aggregator = sorted_aggregator();
    let x = aggregator.create_producer().unwrap();
    let y = aggregator.create_producer().unwrap();

    // "A" is pushed first, but "B" was stamped earlier
    push(&aggregator, Message::new(20.0, format_with_context("X", "A")), x);
    push(&aggregator, Message::new(10.0, format_with_context("Y", "B")), y);
    aggregator.drain_cycle().unwrap();

    let lines: Vec<String> = std::iter::from_fn(|| aggregator.pull())
        .map(|m| m.render(false))
        .collect();
    assert_eq!(lines, vec!["[Y]: B", "[X]: A"]);
}

#[test]
fn test_unsorted_keeps_gather_order() {
    let aggregator = Aggregator::new(AggregatorConfig::default());
    let x = aggregator.create_producer().unwrap();
    let y = aggregator.create_producer().unwrap();

    push(&aggregator, Message::new(20.0, "[X]: A"), x);
    push(&aggregator, Message::new(10.0, "[Y]: B"), y);
    aggregator.drain_cycle().unwrap();

    assert_eq!(aggregator.pull().unwrap().text, "[X]: A");
    assert_eq!(aggregator.pull().unwrap().text, "[Y]: B");
}

#[test]
fn test_cycles_never_reorder_across_each_other() {
    let aggregator = sorted_aggregator();
    let p = aggregator.create_producer().unwrap();

    push(&aggregator, Message::new(50.0, "first cycle"), p);
    aggregator.drain_cycle().unwrap();
    // Earlier stamp, later cycle: still written after the first cycle
    push(&aggregator, Message::new(5.0, "second cycle"), p);
    aggregator.drain_cycle().unwrap();

    assert_eq!(aggregator.pull().unwrap().text, "first cycle");
    assert_eq!(aggregator.pull().unwrap().text, "second cycle");
}

#[test]
fn test_facade_interleaves_contexts_by_write_time() {
    let (logger, sink) = configured(manual_options());
    let x = logger.register_context("X");
    let y = logger.register_context("Y");

    logger.write_with(&y, "1");
    logger.write_with(&x, "2");
    logger.write_with(&y, "3");
    logger.print_all_remaining_messages();

    assert_eq!(sink.lines(), vec!["[Y]: 1", "[X]: 2", "[Y]: 3"]);
}
