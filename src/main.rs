mod checks;
mod engine;
mod models;
mod queue;
mod storage;
mod types;

use std::io::{stderr, stdout, BufWriter};
use std::process::exit;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Result};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::level_filters::LevelFilter;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, Layer};

use crate::checks::{CheckerPipeline, Limits};
use crate::engine::{LoadEngine, RunStatus, DEFAULT_CONCURRENCY};
use crate::storage::AggregateStorage;

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        eprintln!("Usage: load-limit-engine [input].txt [log_level:optional] [concurrency:optional] [timeout_secs:optional] > [output].txt");
        eprintln!("Available log levels: error, warn, info, debug, trace (default: error)");
        eprintln!("Concurrency is the number of loads decided at once (default: {DEFAULT_CONCURRENCY})");
        eprintln!("A run still dispatching after timeout_secs is cancelled (default: no timeout)");
        exit(1);
    }

    let path = &args[1];
    let log_level = args.get(2)
        .map(|s| parse_log_level(s)).unwrap_or_else(|| LevelFilter::ERROR);
    let concurrency = args.get(3)
        .map(|s| parse_concurrency(s)).unwrap_or(DEFAULT_CONCURRENCY);
    let timeout = args.get(4)
        .and_then(|s| parse_timeout(s));

    setup_logging(log_level);

    let cancellation = CancellationToken::new();
    cancel_on_interrupt(cancellation.clone());

    let storage = Arc::new(AggregateStorage::new());
    let mut engine = LoadEngine::new(storage.clone())
        .with_pipeline(CheckerPipeline::standard(Limits::default()))
        .with_concurrency(concurrency)
        .with_cancellation(cancellation);

    if let Some(timeout) = timeout {
        engine = engine.with_timeout(timeout);
    }

    //NOTE: Results go to stdout so they can be redirected, logging goes to stderr
    let timer = Instant::now();
    let summary = engine.run(path, BufWriter::new(stdout())).await?;
    let duration = timer.elapsed();

    info!(
        "Decided {} loads for {} customers in {duration:?}: {} accepted, {} rejected, {} written, {} dropped at ingestion",
        summary.dispatched, storage.len(), summary.accepted, summary.rejected, summary.written, summary.dropped
    );

    if summary.status == RunStatus::Cancelled {
        bail!("Run cancelled after deciding {} of {} loads", summary.dispatched, summary.ingested);
    }

    Ok(())
}

fn parse_log_level(level: &str) -> LevelFilter {
    match level.to_lowercase().as_str() {
        "trace" => LevelFilter::TRACE,
        "debug" => LevelFilter::DEBUG,
        "info" => LevelFilter::INFO,
        "warn" => LevelFilter::WARN,
        "error" => LevelFilter::ERROR,
        _ => {
            eprintln!("Invalid log level '{}', defaulting to 'error'", level);
            LevelFilter::ERROR
        }
    }
}

fn parse_concurrency(value: &str) -> usize {
    match value.parse::<usize>() {
        Ok(concurrency) if concurrency > 0 => concurrency,
        _ => {
            eprintln!("Invalid concurrency '{}', defaulting to {}", value, DEFAULT_CONCURRENCY);
            DEFAULT_CONCURRENCY
        }
    }
}

fn parse_timeout(value: &str) -> Option<Duration> {
    match value.parse::<u64>() {
        Ok(seconds) => Some(Duration::from_secs(seconds)),
        Err(_) => {
            eprintln!("Invalid timeout '{}', running without a timeout", value);
            None
        }
    }
}

fn setup_logging(level: LevelFilter) {
    let terminal_log = fmt::layer()
        .with_target(false)
        .with_writer(stderr)
        .with_filter(level);

    tracing_subscriber::registry()
        .with(terminal_log)
        .init();
}

fn cancel_on_interrupt(cancellation: CancellationToken) {
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling the run");
            cancellation.cancel();
        }
    });
}
