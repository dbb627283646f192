// SPDX-License-Identifier: Apache-2.0 OR MIT
use background_logger::logging::{LaunchMode, Logger};
use background_logger::LoggerOptions;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use super::common::{configured, split_line};

fn spawn_writers(logger: &Logger, threads: usize, messages: usize) -> Vec<thread::JoinHandle<()>> {
    (0..threads)
        .map(|t| {
            let logger = logger.clone();
            thread::Builder::new()
                .name(format!("Writer_{}", t))
                .spawn(move || {
                    for m in 0..messages {
                        logger.write_to_log(format!("{}", m));
                    }
                })
                .unwrap()
        })
        .collect()
}

#[test]
fn test_every_message_delivered_exactly_once() {
    let (logger, sink) = configured(LoggerOptions {
        flush_interval_ms: 2,
        launch: LaunchMode::Immediately,
        ..Default::default()
    });

    let (threads, messages) = (8, 500);
    for handle in spawn_writers(&logger, threads, messages) {
        handle.join().unwrap();
    }
    logger.shutdown();

    let lines = sink.lines();
    assert_eq!(lines.len(), threads * messages);
    assert_eq!(logger.stats().dropped, 0);

    // Per writer, messages arrive once each and in write order
    let mut next: HashMap<String, usize> = HashMap::new();
    for line in &lines {
        let (name, body) = split_line(line);
        let expected = next.entry(name.to_string()).or_insert(0);
        assert_eq!(body.parse::<usize>().unwrap(), *expected, "out of order for {}", name);
        *expected += 1;
    }
    assert_eq!(next.len(), threads);
    assert!(next.values().all(|&count| count == messages));
}

#[test]
fn test_unnamed_threads_share_the_anonymous_slot() {
    let (logger, sink) = configured(LoggerOptions {
        launch: LaunchMode::WhenSignaled,
        ..Default::default()
    });

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let logger = logger.clone();
            thread::spawn(move || {
                for _ in 0..100 {
                    logger.write_to_log("from nowhere");
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    logger.shutdown();

    let lines = sink.lines();
    assert_eq!(lines.len(), 400);
    assert!(lines.iter().all(|l| l == "[Anonymous]: from nowhere"));
    // Only the reserved shared slot was ever created
    assert_eq!(logger.stats().producers, 1);
}

#[test]
fn test_shutdown_under_load_loses_nothing_accepted() {
    let (logger, sink) = configured(LoggerOptions {
        flush_interval_ms: 1,
        launch: LaunchMode::Immediately,
        ..Default::default()
    });

    let stop = Arc::new(AtomicBool::new(false));
    let writers: Vec<_> = (0..4)
        .map(|t| {
            let logger = logger.clone();
            let stop = Arc::clone(&stop);
            thread::Builder::new()
                .name(format!("Busy_{}", t))
                .spawn(move || {
                    let mut i = 0u64;
                    while !stop.load(Ordering::Relaxed) {
                        logger.write_to_log(format!("{}", i));
                        i += 1;
                    }
                })
                .unwrap()
        })
        .collect();

    thread::sleep(std::time::Duration::from_millis(20));
    logger.shutdown();
    stop.store(true, Ordering::Relaxed);
    for writer in writers {
        writer.join().unwrap();
    }

    let stats = logger.stats();
    assert!(stats.accepted > 0);
    assert_eq!(sink.len() as u64, stats.accepted);
}

#[test]
fn test_handles_moved_to_writer_threads_deliver_everything() {
    let (logger, sink) = configured(LoggerOptions {
        flush_interval_ms: 1,
        producer_capacity: 50_000,
        launch: LaunchMode::Immediately,
        ..Default::default()
    });

    let (threads, messages) = (4, 50_000);
    let writers: Vec<_> = (0..threads)
        .map(|t| {
            let logger = logger.clone();
            let handle = logger.register_context(format!("Task_{}", t));
            thread::spawn(move || {
                for m in 0..messages {
                    logger.write_with(&handle, format!("{}", m));
                }
            })
        })
        .collect();
    for writer in writers {
        writer.join().unwrap();
    }
    logger.shutdown();

    let stats = logger.stats();
    assert_eq!(stats.dropped, 0);
    assert_eq!(stats.accepted, (threads * messages) as u64);
    assert_eq!(sink.len() as u64, stats.accepted);
}

#[test]
fn test_handle_shared_behind_mutex_is_serialized() {
    let (logger, sink) = configured(LoggerOptions {
        flush_interval_ms: 1,
        producer_capacity: 80_000,
        launch: LaunchMode::Immediately,
        ..Default::default()
    });

    let shared = Arc::new(Mutex::new(logger.register_context("Pool")));
    let (threads, messages) = (4, 20_000);
    let writers: Vec<_> = (0..threads)
        .map(|_| {
            let logger = logger.clone();
            let shared = Arc::clone(&shared);
            thread::spawn(move || {
                for m in 0..messages {
                    logger.write_with(&shared.lock(), format!("{}", m));
                }
            })
        })
        .collect();
    for writer in writers {
        writer.join().unwrap();
    }
    logger.shutdown();

    let stats = logger.stats();
    assert_eq!(stats.accepted, (threads * messages) as u64);
    assert_eq!(sink.len() as u64, stats.accepted);
    assert!(sink.lines().iter().all(|l| split_line(l).0 == "Pool"));
}
