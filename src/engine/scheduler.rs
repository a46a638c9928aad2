use crate::checks::CheckerPipeline;
use crate::engine::collector::{Release, ResultCollector};
use crate::engine::ingest::Batch;
use crate::engine::worker::{spawn_worker, WorkerOutcome};
use crate::models::CustomerAggregate;
use crate::queue::CustomerQueue;
use crate::storage::{AggregateStorage, Storage};
use crate::types::CustomerId;
use anyhow::Context;
use std::collections::{HashMap, VecDeque};
use std::io::Write;
use std::mem;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::spawn_blocking;
use tokio::time::sleep;
use tokio::{select, spawn};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, trace, warn};

/// Loads evaluated at the same time across all customers.
pub const DEFAULT_CONCURRENCY: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Completed,
    Cancelled
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub status: RunStatus,
    /// Loads that passed ingestion and were queued.
    pub ingested: usize,
    /// Input lines dropped during ingestion.
    pub dropped: usize,
    /// Loads handed to a worker.
    pub dispatched: usize,
    pub accepted: usize,
    pub rejected: usize,
    /// Results successfully written to the sink.
    pub written: usize
}

enum CustomerState {
    /// Nothing in flight; the scheduler holds the aggregate.
    Idle(CustomerAggregate),
    /// A worker holds the aggregate.
    InFlight,
    /// Nothing in flight and nothing queued.
    Drained(CustomerAggregate)
}

struct Customer {
    queue: CustomerQueue,
    state: CustomerState
}

impl Customer {
    /// Moves the aggregate out for a worker. `None` unless the customer is idle.
    fn begin(&mut self) -> Option<CustomerAggregate> {
        match mem::replace(&mut self.state, CustomerState::InFlight) {
            CustomerState::Idle(aggregate) => Some(aggregate),
            previous => {
                self.state = previous;
                None
            }
        }
    }

    /// Takes the aggregate back. Returns whether more loads are waiting.
    fn finish(&mut self, aggregate: CustomerAggregate) -> bool {
        if self.queue.is_empty() {
            self.state = CustomerState::Drained(aggregate);
            false
        } else {
            self.state = CustomerState::Idle(aggregate);
            true
        }
    }

    fn into_aggregate(self) -> Option<CustomerAggregate> {
        match self.state {
            CustomerState::Idle(aggregate) | CustomerState::Drained(aggregate) => Some(aggregate),
            CustomerState::InFlight => None
        }
    }
}

/// Concurrent load-limit engine.
///
/// Loads of different customers are decided in parallel, up to a global
/// ceiling, while each customer has at most one load in flight so their loads
/// are applied strictly in arrival order.
pub struct LoadEngine {
    storage: Arc<AggregateStorage>,
    pipeline: Arc<CheckerPipeline>,
    concurrency: usize,
    timeout: Option<Duration>,
    cancellation: CancellationToken
}

impl LoadEngine {
    /// Creates an engine with the standard limits that saves final aggregates to `storage`.
    pub fn new(storage: Arc<AggregateStorage>) -> Self {
        Self {
            storage,
            pipeline: Arc::new(CheckerPipeline::default()),
            concurrency: DEFAULT_CONCURRENCY,
            timeout: None,
            cancellation: CancellationToken::new()
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_pipeline(mut self, pipeline: CheckerPipeline) -> Self {
        self.pipeline = Arc::new(pipeline);
        self
    }

    /// Cancels a run that is still dispatching once `timeout` has elapsed.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_cancellation(mut self, cancellation: CancellationToken) -> Self {
        self.cancellation = cancellation;
        self
    }

    /// Ingests the file at `path` and decides every load in it, writing one
    /// JSON line per result to `sink` in completion order.
    pub async fn run<W: Write + Send + 'static>(&self, path: &str, sink: W) -> anyhow::Result<RunSummary> {
        let path = PathBuf::from(path);

        let batch = spawn_blocking(move || Batch::load(&path))
            .await
            .context("Ingestion task failed")??;

        self.process(batch, sink).await
    }

    /// Decides every load of an already ingested batch.
    pub async fn process<W: Write + Send + 'static>(&self, batch: Batch, sink: W) -> anyhow::Result<RunSummary> {
        let Batch { customers: order, queues, total, dropped } = batch;
        let cancellation = self.cancellation.child_token();

        let deadline = self.timeout.map(|timeout| {
            let cancellation = cancellation.clone();
            spawn(async move {
                sleep(timeout).await;
                warn!("Run exceeded its timeout of {timeout:?}");
                cancellation.cancel();
            })
        });

        let mut customers: HashMap<CustomerId, Customer> = queues.into_iter()
            .map(|(customer_id, queue)| {
                let aggregate = CustomerAggregate::new(customer_id.clone());
                (customer_id, Customer { queue, state: CustomerState::Idle(aggregate) })
            })
            .collect();

        let mut ready: VecDeque<CustomerId> = order.into_iter()
            .filter(|customer_id| customers.get(customer_id).is_some_and(|customer| !customer.queue.is_empty()))
            .collect();

        let slots = Arc::new(Semaphore::new(self.concurrency));
        let (result_sender, result_receiver) = mpsc::channel::<WorkerOutcome>(self.concurrency);
        let (release_sender, mut release_receiver) = mpsc::channel::<Release>(self.concurrency);
        let collector = ResultCollector::new(sink, total).spawn(result_receiver, release_sender);

        info!("Dispatching {total} loads for {} customers across {} slots", customers.len(), self.concurrency);

        let mut status = RunStatus::Completed;
        let mut remaining = total;
        let mut dispatched = 0;
        let mut in_flight = 0;

        while remaining > 0 {
            select! {
                biased;

                _ = cancellation.cancelled() => {
                    warn!("Run cancelled with {remaining} loads still queued");
                    status = RunStatus::Cancelled;
                    break;
                }
                release = release_receiver.recv() => {
                    let Some(release) = release else {
                        error!("Result collector stopped with {remaining} loads still queued");
                        break;
                    };

                    in_flight -= 1;
                    release_customer(&mut customers, &mut ready, release);
                }
                permit = slots.clone().acquire_owned(), if !ready.is_empty() => {
                    let permit = permit.context("Dispatch slots were closed")?;
                    let Some(customer_id) = ready.pop_front() else {
                        continue;
                    };
                    let Some(customer) = customers.get_mut(&customer_id) else {
                        continue;
                    };
                    let Some(aggregate) = customer.begin() else {
                        error!("Customer [{customer_id}] was ready while a load was in flight");
                        continue;
                    };
                    let Some(transaction) = customer.queue.pop_front() else {
                        customer.finish(aggregate);
                        continue;
                    };

                    trace!("Dispatching transaction [{}] at {} for customer [{customer_id}], {} more queued", transaction.id, transaction.time, customer.queue.len());
                    spawn_worker(self.pipeline.clone(), transaction, aggregate, result_sender.clone(), permit);

                    remaining -= 1;
                    dispatched += 1;
                    in_flight += 1;
                }
            }
        }

        // Once our sender is gone the collector also stops when a cancelled run's last worker reports.
        drop(result_sender);

        while in_flight > 0 {
            let Some(release) = release_receiver.recv().await else {
                break;
            };

            in_flight -= 1;
            release_customer(&mut customers, &mut ready, release);
        }

        let report = collector.await.context("Result collector task failed")??;

        if let Some(deadline) = deadline {
            deadline.abort();
        }

        for (customer_id, customer) in customers {
            match customer.into_aggregate() {
                Some(aggregate) => self.storage.save(aggregate.customer_id.clone(), aggregate),
                None => error!("Aggregate for customer [{customer_id}] was not returned by its worker")
            }
        }

        Ok(RunSummary {
            status,
            ingested: total,
            dropped,
            dispatched,
            accepted: report.accepted,
            rejected: report.rejected,
            written: report.written
        })
    }
}

fn release_customer(customers: &mut HashMap<CustomerId, Customer>, ready: &mut VecDeque<CustomerId>, release: Release) {
    let Release { customer_id, aggregate } = release;

    match customers.get_mut(&customer_id) {
        Some(customer) => {
            if customer.finish(aggregate) {
                ready.push_back(customer_id);
            }
        }
        None => error!("Released customer [{customer_id}] is not part of this batch")
    }
}
