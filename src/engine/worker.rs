use std::sync::Arc;

use tokio::spawn;
use tokio::sync::{mpsc, OwnedSemaphorePermit};
use tracing::error;

use crate::checks::CheckerPipeline;
use crate::models::{CustomerAggregate, LoadResult, LoadTransaction};

/// What a worker hands to the collector: the decision, plus the aggregate it
/// borrowed for the duration of one load.
#[derive(Debug)]
pub struct WorkerOutcome {
    pub result: LoadResult,
    pub aggregate: CustomerAggregate
}

/// Decides one load on its own task.
///
/// The worker owns the customer's aggregate and a global slot until the
/// decision has been handed to the collector.
pub fn spawn_worker(
    pipeline: Arc<CheckerPipeline>,
    transaction: LoadTransaction,
    mut aggregate: CustomerAggregate,
    results: mpsc::Sender<WorkerOutcome>,
    slot: OwnedSemaphorePermit
) {
    spawn(async move {
        let result = pipeline.evaluate(&mut aggregate, &transaction);

        if results.send(WorkerOutcome { result, aggregate }).await.is_err() {
            error!("Result collector stopped before transaction [{}] for customer [{}] was reported", transaction.id, transaction.customer_id);
        }

        drop(slot);
    });
}
