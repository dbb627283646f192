// SPDX-License-Identifier: Apache-2.0 OR MIT
use anyhow::{Context, Result};
use background_logger::logging::{LogSink, StdoutSink};
use background_logger::{log_msg, log_with, FileSink, Logger, LoggerOptions, LoggerStats};
use clap::Parser;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

const APP_NAME: &str = "bml-demo";

/// Run a handful of background jobs that all log through one logger
#[derive(Parser, Debug, PartialEq)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Number of background job threads
    #[arg(long, default_value_t = 4)]
    jobs: usize,

    /// Countdown steps per job
    #[arg(long, default_value_t = 10)]
    ticks: u32,

    /// Pause between countdown steps
    #[arg(long, default_value_t = 50)]
    tick_ms: u64,

    /// Write a date-stamped session log under this directory instead of stdout
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// JSON5 logger options file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Mirror file output to the console
    #[arg(long)]
    console: bool,

    /// Prefix lines with their timestamp
    #[arg(long)]
    timestamps: bool,

    /// Keep gather order instead of sorting each drain by timestamp
    #[arg(long)]
    no_sort: bool,

    /// Drive the flush timer from the tokio runtime instead of a thread
    #[arg(long)]
    tokio: bool,
}

impl Args {
    fn logger_options(&self) -> Result<LoggerOptions> {
        let mut options = match &self.config {
            Some(path) => LoggerOptions::load_from_file(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => LoggerOptions::default(),
        };
        options.mirror_to_console |= self.console;
        options.show_timestamp |= self.timestamps;
        if self.no_sort {
            options.sort_by_timestamp = false;
        }
        Ok(options)
    }

    fn sink(&self) -> Result<Box<dyn LogSink>> {
        match &self.log_dir {
            Some(dir) => {
                let mut sink = FileSink::date_stamped(dir, APP_NAME, "session", "log")
                    .with_context(|| format!("creating log file under {}", dir.display()))?;
                sink.write_welcome(APP_NAME, env!("CARGO_PKG_VERSION"));
                Ok(Box::new(sink))
            }
            None => Ok(Box::new(StdoutSink::new())),
        }
    }
}

/// Count down from `ticks`, logging every step
fn background_job(logger: Logger, ticks: u32, pause: Duration) {
    log_msg!(logger, "starting");
    for remaining in (1..=ticks).rev() {
        log_msg!(logger, "counting down: {}", remaining);
        thread::sleep(pause);
    }
    log_msg!(logger, "done");
}

/// Final flush and teardown; the snapshot includes that last drain
fn shut_down(logger: Logger) -> LoggerStats {
    logger.shutdown();
    logger.stats()
}

fn run_jobs(logger: &Logger, args: &Args) -> Result<()> {
    let pause = Duration::from_millis(args.tick_ms);
    let handles = (0..args.jobs)
        .map(|i| {
            let logger = logger.clone();
            let ticks = args.ticks;
            thread::Builder::new()
                .name(format!("BackgroundJob_{}", i))
                .spawn(move || background_job(logger, ticks, pause))
                .context("spawning background job")
        })
        .collect::<Result<Vec<_>>>()?;

    for handle in handles {
        if handle.join().is_err() {
            anyhow::bail!("background job panicked");
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let options = args.logger_options()?;
    options.validate()?;
    let sink = args.sink()?;

    let logger = Logger::new();
    if args.tokio {
        logger.configure_on_runtime(options, sink, tokio::runtime::Handle::current())?;
    } else {
        logger.configure(options, sink)?;
    }

    // Async tasks have no thread identity of their own; give this one a name
    let ticker_logger = logger.clone();
    let ticker_period = Duration::from_millis(args.tick_ms.max(1) * 2);
    let ticker = tokio::spawn(async move {
        let handle = ticker_logger.register_context("Ticker");
        let mut interval = tokio::time::interval(ticker_period);
        for beat in 0.. {
            interval.tick().await;
            log_with!(ticker_logger, &handle, "heartbeat {}", beat);
        }
    });

    let job_logger = logger.clone();
    let jobs = tokio::task::spawn_blocking(move || run_jobs(&job_logger, &args));
    let result = jobs.await.context("joining background jobs")?;
    ticker.abort();

    let location = logger.log_location();
    let stats = tokio::task::spawn_blocking(move || shut_down(logger))
        .await
        .context("shutting down logger")?;

    result?;
    if let Some(path) = location {
        eprintln!("log written to {}", path.display());
    }
    eprintln!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}
