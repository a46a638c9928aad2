use super::ingest::Batch;
use super::scheduler::RunSummary;
use super::{LoadEngine, RunStatus};

use anyhow::{anyhow, Result};
use chrono::{DateTime, TimeDelta};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::io::{self, Write};
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tempfile::NamedTempFile;
use tokio_util::sync::CancellationToken;

use crate::checks::{CheckerPipeline, Limits};
use crate::models::{CustomerAggregate, LoadTransaction};
use crate::storage::{AggregateStorage, Storage};
use crate::types::{DateKey, LoadAmount, WeekKey};

#[derive(Debug, Deserialize)]
struct OutputLine {
    id: String,
    customer_id: String,
    accepted: bool
}

#[derive(Clone, Default)]
struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().map_err(|_| io::Error::other("buffer poisoned"))?.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl SharedBuffer {
    fn output(&self) -> Result<Vec<OutputLine>> {
        let bytes = self.0.lock().map_err(|_| anyhow!("buffer poisoned"))?.clone();
        let text = String::from_utf8(bytes)?;

        text.lines().map(|line| Ok(serde_json::from_str(line)?)).collect()
    }

    fn decisions(&self) -> Result<HashMap<String, bool>> {
        Ok(self.output()?.into_iter().map(|line| (line.id, line.accepted)).collect())
    }
}

struct FailingSink;

impl Write for FailingSink {
    fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
        Err(io::Error::other("disk full"))
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn load_line(id: &str, customer_id: &str, amount: &str, time: &str) -> String {
    serde_json::json!({
        "id": id,
        "customer_id": customer_id,
        "load_amount": amount,
        "time": time
    }).to_string()
}

fn create_temporary_input(lines: &[String]) -> Result<NamedTempFile> {
    let mut file = NamedTempFile::new()?;

    for line in lines {
        writeln!(file, "{line}")?;
    }

    Ok(file)
}

fn path_of(file: &NamedTempFile) -> Result<&str> {
    file.path().to_str().ok_or_else(|| anyhow!("temporary path is not UTF-8"))
}

/// Random loads for a few dozen customers spread over three weeks.
fn generate_lines(seed: u64, count: usize, customers: u32) -> Result<Vec<String>> {
    let mut rng = StdRng::seed_from_u64(seed);
    let start = DateTime::parse_from_rfc3339("2000-01-01T00:00:00Z")?;
    let mut lines = Vec::with_capacity(count);

    for id in 0..count {
        let customer = rng.random_range(0..customers);
        let cents: u32 = rng.random_range(100..400_000);
        let minutes: i64 = rng.random_range(0..(21 * 24 * 60));
        let time = start + TimeDelta::minutes(minutes);
        let amount = format!("${}.{:02}", cents / 100, cents % 100);

        lines.push(load_line(&id.to_string(), &customer.to_string(), &amount, &time.to_rfc3339()));
    }

    Ok(lines)
}

/// Decides every customer's loads one after another, in input order.
fn replay_sequentially(lines: &[String]) -> Result<HashMap<String, bool>> {
    let pipeline = CheckerPipeline::default();
    let mut aggregates: HashMap<String, CustomerAggregate> = HashMap::new();
    let mut decisions = HashMap::new();

    for line in lines {
        let transaction = LoadTransaction::parse_line(line.as_bytes())?;
        let aggregate = aggregates.entry(transaction.customer_id.clone())
            .or_insert_with(|| CustomerAggregate::new(transaction.customer_id.clone()));

        decisions.insert(transaction.id.clone(), pipeline.evaluate(aggregate, &transaction).is_accepted());
    }

    Ok(decisions)
}

async fn run_lines(engine: &LoadEngine, lines: &[String]) -> Result<(RunSummary, SharedBuffer)> {
    let file = create_temporary_input(lines)?;
    let buffer = SharedBuffer::default();
    let summary = engine.run(path_of(&file)?, buffer.clone()).await?;

    Ok((summary, buffer))
}

#[tokio::test]
async fn test_second_load_over_the_daily_amount_is_rejected() -> Result<()> {
    let storage = Arc::new(AggregateStorage::new());
    let engine = LoadEngine::new(storage.clone());

    let (summary, buffer) = run_lines(&engine, &[
        load_line("1", "C1", "$3000.00", "2000-01-03T09:00:00Z"),
        load_line("2", "C1", "$3000.00", "2000-01-03T15:00:00Z"),
    ]).await?;

    let decisions = buffer.decisions()?;

    assert_eq!(summary.status, RunStatus::Completed);
    assert_eq!(decisions.get("1"), Some(&true));
    assert_eq!(decisions.get("2"), Some(&false));

    let aggregate = storage.load("C1").ok_or_else(|| anyhow!("C1 missing from storage"))?;
    let date = DateKey::from_time(&DateTime::parse_from_rfc3339("2000-01-03T09:00:00Z")?);

    assert_eq!(aggregate.daily_loaded(&date).to_string(), "$3000.00");

    Ok(())
}

#[tokio::test]
async fn test_fourth_load_of_the_day_is_rejected() -> Result<()> {
    let engine = LoadEngine::new(Arc::new(AggregateStorage::new()));
    let lines: Vec<String> = (1..=4)
        .map(|id| load_line(&id.to_string(), "C1", "$10.00", &format!("2000-01-03T0{id}:00:00Z")))
        .collect();

    let (summary, buffer) = run_lines(&engine, &lines).await?;
    let decisions = buffer.decisions()?;

    assert_eq!(summary.accepted, 3);
    assert_eq!(summary.rejected, 1);
    assert_eq!(decisions.get("4"), Some(&false));

    Ok(())
}

#[tokio::test]
async fn test_load_over_the_weekly_amount_is_rejected() -> Result<()> {
    let storage = Arc::new(AggregateStorage::new());
    let limits = Limits { daily_amount: LoadAmount::from_dollars(20_000), ..Limits::default() };
    let engine = LoadEngine::new(storage.clone()).with_pipeline(CheckerPipeline::standard(limits));

    let (_, buffer) = run_lines(&engine, &[
        load_line("1", "C2", "$19999.00", "2000-01-03T09:00:00Z"),
        load_line("2", "C2", "$5.00", "2000-01-04T09:00:00Z"),
    ]).await?;

    let decisions = buffer.decisions()?;

    assert_eq!(decisions.get("1"), Some(&true));
    assert_eq!(decisions.get("2"), Some(&false));

    let aggregate = storage.load("C2").ok_or_else(|| anyhow!("C2 missing from storage"))?;
    let week = WeekKey::from_time(&DateTime::parse_from_rfc3339("2000-01-04T09:00:00Z")?);

    assert_eq!(aggregate.weekly_loaded(&week).to_string(), "$19999.00");

    Ok(())
}

#[tokio::test]
async fn test_weekly_amount_accumulates_across_days_with_default_limits() -> Result<()> {
    let engine = LoadEngine::new(Arc::new(AggregateStorage::new()));

    let (_, buffer) = run_lines(&engine, &[
        load_line("1", "C2", "$5000.00", "2000-01-03T09:00:00Z"),
        load_line("2", "C2", "$5000.00", "2000-01-04T09:00:00Z"),
        load_line("3", "C2", "$5000.00", "2000-01-05T09:00:00Z"),
        load_line("4", "C2", "$4999.00", "2000-01-06T09:00:00Z"),
        load_line("5", "C2", "$5.00", "2000-01-07T09:00:00Z"),
        load_line("6", "C2", "$5.00", "2000-01-10T09:00:00Z"),
    ]).await?;

    let decisions = buffer.decisions()?;

    assert_eq!(decisions.get("4"), Some(&true));
    assert_eq!(decisions.get("5"), Some(&false));
    assert_eq!(decisions.get("6"), Some(&true));

    Ok(())
}

#[tokio::test]
async fn test_malformed_line_does_not_affect_its_neighbours() -> Result<()> {
    let engine = LoadEngine::new(Arc::new(AggregateStorage::new()));

    let (summary, buffer) = run_lines(&engine, &[
        load_line("1", "C1", "$100.00", "2000-01-03T09:00:00Z"),
        "{\"id\":\"2\",\"customer_id\":".to_string(),
        load_line("3", "C1", "$100.00", "2000-01-03T10:00:00Z"),
    ]).await?;

    let output = buffer.output()?;

    assert_eq!(summary.ingested, 2);
    assert_eq!(summary.dropped, 1);
    assert_eq!(output.len(), 2);
    assert!(output.iter().all(|line| line.accepted && line.customer_id == "C1"));
    assert!(output.iter().all(|line| line.id != "2"));

    Ok(())
}

#[tokio::test]
async fn test_records_failing_enrichment_are_dropped() -> Result<()> {
    let engine = LoadEngine::new(Arc::new(AggregateStorage::new()));

    let (summary, buffer) = run_lines(&engine, &[
        load_line("1", "C1", "$abc", "2000-01-03T09:00:00Z"),
        load_line("2", "", "$10.00", "2000-01-03T09:00:00Z"),
        load_line("3", "C1", "$10.00", "0001-01-01T00:00:00Z"),
        String::new(),
        load_line("4", "C1", "$10.00", "2000-01-03T09:00:00Z"),
    ]).await?;

    assert_eq!(summary.ingested, 1);
    assert_eq!(summary.dropped, 3);
    assert_eq!(buffer.decisions()?, HashMap::from([("4".to_string(), true)]));

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_decisions_match_sequential_replay() -> Result<()> {
    let lines = generate_lines(7, 3_000, 40)?;
    let expected = replay_sequentially(&lines)?;

    for concurrency in [1, 4, 50] {
        let engine = LoadEngine::new(Arc::new(AggregateStorage::new())).with_concurrency(concurrency);
        let (summary, buffer) = run_lines(&engine, &lines).await?;

        assert_eq!(summary.status, RunStatus::Completed);
        assert_eq!(buffer.decisions()?, expected, "concurrency {concurrency} diverged from sequential replay");
    }

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_every_ingested_load_gets_exactly_one_result() -> Result<()> {
    let lines = generate_lines(11, 2_000, 25)?;
    let engine = LoadEngine::new(Arc::new(AggregateStorage::new())).with_concurrency(8);

    let (summary, buffer) = run_lines(&engine, &lines).await?;
    let output = buffer.output()?;
    let unique: HashSet<&str> = output.iter().map(|line| line.id.as_str()).collect();

    assert_eq!(summary.ingested, 2_000);
    assert_eq!(summary.dispatched, 2_000);
    assert_eq!(summary.written, 2_000);
    assert_eq!(summary.accepted + summary.rejected, 2_000);
    assert_eq!(output.len(), 2_000);
    assert_eq!(unique.len(), 2_000);

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_accepted_loads_never_exceed_any_limit() -> Result<()> {
    let lines = generate_lines(23, 3_000, 10)?;
    let engine = LoadEngine::new(Arc::new(AggregateStorage::new())).with_concurrency(6);

    let (_, buffer) = run_lines(&engine, &lines).await?;
    let decisions = buffer.decisions()?;
    let limits = Limits::default();

    let mut daily: HashMap<(String, DateKey), (LoadAmount, u32)> = HashMap::new();
    let mut weekly: HashMap<(String, WeekKey), LoadAmount> = HashMap::new();

    for line in &lines {
        let transaction = LoadTransaction::parse_line(line.as_bytes())?;

        if decisions.get(&transaction.id) != Some(&true) {
            continue;
        }

        let day = daily.entry((transaction.customer_id.clone(), transaction.date_key)).or_default();
        day.0 += transaction.amount;
        day.1 += 1;
        *weekly.entry((transaction.customer_id.clone(), transaction.week_key)).or_default() += transaction.amount;
    }

    assert!(!daily.is_empty());
    assert!(daily.values().all(|(amount, count)| *amount <= limits.daily_amount && *count <= limits.daily_count));
    assert!(weekly.values().all(|amount| *amount <= limits.weekly_amount));

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_repeated_runs_with_fresh_state_are_idempotent() -> Result<()> {
    let lines = generate_lines(42, 1_500, 30)?;

    let first_engine = LoadEngine::new(Arc::new(AggregateStorage::new()));
    let second_engine = LoadEngine::new(Arc::new(AggregateStorage::new()));

    let (_, first) = run_lines(&first_engine, &lines).await?;
    let (_, second) = run_lines(&second_engine, &lines).await?;

    assert_eq!(first.decisions()?, second.decisions()?);

    Ok(())
}

#[tokio::test]
async fn test_each_run_starts_from_fresh_aggregates() -> Result<()> {
    let storage = Arc::new(AggregateStorage::new());
    let stale = LoadTransaction::new(
        "0".to_string(),
        "C1".to_string(),
        LoadAmount::from_str("$4000.00")?,
        DateTime::parse_from_rfc3339("2000-01-03T08:00:00Z")?
    );

    let mut aggregate = CustomerAggregate::new("C1".to_string());
    aggregate.record(&stale);
    storage.save("C1".to_string(), aggregate);

    let engine = LoadEngine::new(storage.clone());
    let lines = [
        load_line("1", "C1", "$4000.00", "2000-01-03T09:00:00Z"),
        load_line("2", "C1", "$1000.00", "2000-01-03T10:00:00Z"),
    ];

    for _ in 0..2 {
        let (_, buffer) = run_lines(&engine, &lines).await?;
        let decisions = buffer.decisions()?;

        assert_eq!(decisions.get("1"), Some(&true));
        assert_eq!(decisions.get("2"), Some(&true));

        let aggregate = storage.load("C1").ok_or_else(|| anyhow!("C1 missing from storage"))?;
        assert_eq!(aggregate.daily_count(&stale.date_key), 2);
        assert_eq!(aggregate.daily_loaded(&stale.date_key), LoadAmount::from_dollars(5000));

        // Put it back so the next run finds stale state it must ignore.
        storage.save("C1".to_string(), aggregate);
    }

    Ok(())
}

#[tokio::test]
async fn test_cancelled_run_dispatches_nothing() -> Result<()> {
    let storage = Arc::new(AggregateStorage::new());
    let cancellation = CancellationToken::new();
    cancellation.cancel();

    let engine = LoadEngine::new(storage.clone()).with_cancellation(cancellation);
    let (summary, buffer) = run_lines(&engine, &generate_lines(3, 100, 5)?).await?;

    assert_eq!(summary.status, RunStatus::Cancelled);
    assert_eq!(summary.ingested, 100);
    assert_eq!(summary.dispatched, 0);
    assert_eq!(summary.written, 0);
    assert!(buffer.output()?.is_empty());

    // Aggregates of undispatched customers are still handed back.
    assert_eq!(storage.len(), 5);

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_timed_out_run_reports_every_dispatched_load() -> Result<()> {
    let engine = LoadEngine::new(Arc::new(AggregateStorage::new()))
        .with_concurrency(2)
        .with_timeout(Duration::from_millis(1));

    let (summary, buffer) = run_lines(&engine, &generate_lines(5, 20_000, 50)?).await?;

    assert!(summary.dispatched <= summary.ingested);
    assert_eq!(summary.written, summary.dispatched);
    assert_eq!(buffer.output()?.len(), summary.dispatched);

    if summary.status == RunStatus::Completed {
        assert_eq!(summary.dispatched, summary.ingested);
    }

    Ok(())
}

#[tokio::test]
async fn test_failed_writes_do_not_stop_the_run() -> Result<()> {
    let engine = LoadEngine::new(Arc::new(AggregateStorage::new()));
    let file = create_temporary_input(&[
        load_line("1", "C1", "$10.00", "2000-01-03T09:00:00Z"),
        load_line("2", "C2", "$10.00", "2000-01-03T09:00:00Z"),
    ])?;

    let summary = engine.run(path_of(&file)?, FailingSink).await?;

    assert_eq!(summary.status, RunStatus::Completed);
    assert_eq!(summary.accepted, 2);
    assert_eq!(summary.written, 0);

    Ok(())
}

#[tokio::test]
async fn test_engine_fails_on_missing_input_file() {
    let engine = LoadEngine::new(Arc::new(AggregateStorage::new()));

    assert!(engine.run("missing-input.txt", SharedBuffer::default()).await.is_err());
}

#[tokio::test]
async fn test_empty_batch_completes_immediately() -> Result<()> {
    let engine = LoadEngine::new(Arc::new(AggregateStorage::new()));
    let summary = engine.process(Batch::default(), SharedBuffer::default()).await?;

    assert_eq!(summary.status, RunStatus::Completed);
    assert_eq!(summary.ingested, 0);
    assert_eq!(summary.written, 0);

    Ok(())
}

#[test]
fn test_batch_preserves_arrival_order_per_customer() -> Result<()> {
    let input = [
        load_line("1", "B", "$1.00", "2000-01-03T09:00:00Z"),
        load_line("2", "A", "$1.00", "2000-01-03T09:00:00Z"),
        "not json".to_string(),
        load_line("3", "B", "$1.00", "2000-01-03T09:00:00Z"),
    ].join("\n");

    let batch = Batch::read(input.as_bytes())?;

    assert_eq!(batch.customers, vec!["B".to_string(), "A".to_string()]);
    assert_eq!(batch.total, 3);
    assert_eq!(batch.dropped, 1);
    assert_eq!(batch.queues.len(), 2);

    let queue = batch.queues.get("B").ok_or_else(|| anyhow!("queue for B missing"))?;
    let ids: Vec<String> = std::iter::from_fn(|| queue.pop_front()).map(|transaction| transaction.id).collect();

    assert_eq!(ids, vec!["1".to_string(), "3".to_string()]);

    Ok(())
}

#[test]
fn test_batch_drops_a_line_that_is_not_utf8() -> Result<()> {
    let mut input = Vec::new();
    writeln!(input, "{}", load_line("1", "A", "$1.00", "2000-01-03T09:00:00Z"))?;
    input.extend_from_slice(b"{\"id\":\"\xff\"}\n");
    writeln!(input, "{}", load_line("2", "A", "$1.00", "2000-01-03T10:00:00Z"))?;

    let batch = Batch::read(input.as_slice())?;

    assert_eq!(batch.total, 2);
    assert_eq!(batch.dropped, 1);

    Ok(())
}

#[tokio::test]
async fn test_run_decides_loads_around_a_line_that_is_not_utf8() -> Result<()> {
    let mut file = NamedTempFile::new()?;
    writeln!(file, "{}", load_line("1", "C1", "$10.00", "2000-01-03T09:00:00Z"))?;
    file.write_all(b"{\"id\":\"2\",\"customer_id\":\"C1\",\"load_amount\":\"\xa310.00\",\"time\":\"2000-01-03T09:30:00Z\"}\r\n")?;
    writeln!(file, "{}", load_line("3", "C1", "$10.00", "2000-01-03T10:00:00Z"))?;

    let engine = LoadEngine::new(Arc::new(AggregateStorage::new()));
    let buffer = SharedBuffer::default();
    let summary = engine.run(path_of(&file)?, buffer.clone()).await?;

    assert_eq!(summary.status, RunStatus::Completed);
    assert_eq!(summary.ingested, 2);
    assert_eq!(summary.dropped, 1);
    assert_eq!(buffer.decisions()?, HashMap::from([("1".to_string(), true), ("3".to_string(), true)]));

    Ok(())
}
