use crate::models::LoadTransaction;
use crate::queue::CustomerQueue;
use crate::types::CustomerId;
use anyhow::Context;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::{debug, error};

/// Every load of a closed input batch, queued per customer in arrival order.
#[derive(Debug, Default)]
pub struct Batch {
    /// Customers in the order their first load arrived.
    pub customers: Vec<CustomerId>,
    pub queues: HashMap<CustomerId, CustomerQueue>,
    /// Loads that were enriched and queued.
    pub total: usize,
    /// Lines that could not be turned into a load.
    pub dropped: usize
}

impl Batch {
    /// Reads a newline-delimited JSON file.
    ///
    /// Failing to open or read the file is fatal; a bad record is logged and skipped.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("Error opening input at path: {}", path.display()))?;

        Self::read(BufReader::new(file))
    }

    /// Lines are split as raw bytes so a line that is not valid UTF-8 is
    /// dropped like any other malformed record.
    pub fn read<R: BufRead>(reader: R) -> anyhow::Result<Self> {
        let mut batch = Self::default();

        for (index, line) in reader.split(b'\n').enumerate() {
            let line_number = index + 1;
            let line = line.with_context(|| format!("Error reading input line {line_number}"))?;

            if line.trim_ascii().is_empty() {
                continue;
            }

            match LoadTransaction::parse_line(&line) {
                Ok(transaction) => batch.push(transaction),
                Err(error) => {
                    batch.dropped += 1;
                    error!("Dropped input line {line_number}: {error}");
                }
            }
        }

        debug!("Ingested {} loads for {} customers, dropped {} lines", batch.total, batch.customers.len(), batch.dropped);

        Ok(batch)
    }

    /// Queues a load behind earlier loads of the same customer.
    pub fn push(&mut self, transaction: LoadTransaction) {
        let customer_id = transaction.customer_id.clone();

        if !self.queues.contains_key(&customer_id) {
            self.customers.push(customer_id.clone());
            self.queues.insert(customer_id.clone(), CustomerQueue::new());
        }

        if let Some(queue) = self.queues.get(&customer_id) {
            queue.push_back(transaction);
            self.total += 1;
        }
    }
}
