use std::io::Write;

use anyhow::Context;
use tokio::spawn;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::engine::worker::WorkerOutcome;
use crate::models::{CustomerAggregate, Decision, LoadResult};
use crate::types::CustomerId;

/// Tells the scheduler a customer has no load in flight any more and returns
/// their aggregate to it.
#[derive(Debug)]
pub struct Release {
    pub customer_id: CustomerId,
    pub aggregate: CustomerAggregate
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CollectorReport {
    pub received: usize,
    pub accepted: usize,
    pub rejected: usize,
    pub written: usize
}

/// Writes results in the order workers finish them.
pub struct ResultCollector<W> {
    sink: W,
    expected: usize
}

impl<W: Write + Send + 'static> ResultCollector<W> {
    pub fn new(sink: W, expected: usize) -> Self {
        Self { sink, expected }
    }

    /// Runs until `expected` results were received or every worker sender is gone.
    pub fn spawn(self, results: mpsc::Receiver<WorkerOutcome>, releases: mpsc::Sender<Release>) -> JoinHandle<anyhow::Result<CollectorReport>> {
        spawn(self.collect(results, releases))
    }

    async fn collect(mut self, mut results: mpsc::Receiver<WorkerOutcome>, releases: mpsc::Sender<Release>) -> anyhow::Result<CollectorReport> {
        let mut report = CollectorReport::default();

        while report.received < self.expected {
            let Some(WorkerOutcome { result, aggregate }) = results.recv().await else {
                break;
            };

            report.received += 1;

            match &result.decision {
                Decision::Accepted => {
                    report.accepted += 1;
                    debug!("Transaction [{}] for customer [{}] accepted", result.id, result.customer_id);
                }
                Decision::Rejected { reason } => {
                    report.rejected += 1;
                    warn!("Transaction [{}] for customer [{}] rejected: {reason}", result.id, result.customer_id);
                }
            }

            match self.write(&result) {
                Ok(()) => report.written += 1,
                Err(error) => error!("Error writing transaction [{}] for customer [{}]: {error}", result.id, result.customer_id)
            }

            let release = Release { customer_id: result.customer_id, aggregate };

            if releases.send(release).await.is_err() {
                warn!("Scheduler stopped listening for released customers");
            }
        }

        self.sink.flush().context("Error flushing results")?;

        Ok(report)
    }

    fn write(&mut self, result: &LoadResult) -> anyhow::Result<()> {
        serde_json::to_writer(&mut self.sink, &result.to_record())?;
        self.sink.write_all(b"\n")?;
        Ok(())
    }
}
