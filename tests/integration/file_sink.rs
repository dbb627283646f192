// SPDX-License-Identifier: Apache-2.0 OR MIT
use background_logger::logging::{FileSink, LaunchMode, Logger};
use background_logger::LoggerOptions;
use std::fs;

#[test]
fn test_session_log_contents() {
    let dir = tempfile::tempdir().unwrap();
    let mut sink = FileSink::date_stamped(dir.path(), "Demo", "session", "log").unwrap();
    sink.write_welcome("Demo", "0.1.0");
    let path = sink.path().to_path_buf();

    let logger = Logger::new();
    let options = LoggerOptions {
        launch: LaunchMode::WhenSignaled,
        ..Default::default()
    };
    logger.configure(options, sink).unwrap();
    assert_eq!(logger.log_location(), Some(path.clone()));

    let handle = logger.register_context("BackgroundJob_0");
    logger.write_with(&handle, "counting down: 3");
    logger.write_with(&handle, "done");
    logger.shutdown();
    assert_eq!(logger.log_location(), None);

    let contents = fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = contents.lines().collect();
    assert_eq!(lines.len(), 3);
    assert!(lines[0].starts_with("Welcome to Demo 0.1.0 spawned at "));
    assert_eq!(lines[1], "[BackgroundJob_0]: counting down: 3");
    assert_eq!(lines[2], "[BackgroundJob_0]: done");
}

#[test]
fn test_timestamps_in_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("plain.log");
    let sink = FileSink::create(&path).unwrap();

    let logger = Logger::new();
    let options = LoggerOptions {
        show_timestamp: true,
        launch: LaunchMode::WhenSignaled,
        ..Default::default()
    };
    logger.configure(options, sink).unwrap();
    let handle = logger.register_context("Clock");
    logger.write_with(&handle, "first");
    logger.write_with(&handle, "second");
    logger.shutdown();

    let contents = fs::read_to_string(&path).unwrap();
    let stamps: Vec<f64> = contents
        .lines()
        .map(|line| line.split_once(": ").unwrap().0.parse().unwrap())
        .collect();
    assert_eq!(stamps.len(), 2);
    assert!(stamps[0] <= stamps[1]);
}
