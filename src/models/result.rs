use serde::Serialize;

use crate::models::{LimitViolation, LoadTransaction};
use crate::types::{CustomerId, TransactionId};

/// Outcome of the limit checks for one load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Accepted,
    Rejected {
        reason: LimitViolation
    }
}

/// The decision for one queued transaction, emitted exactly once per load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadResult {
    pub id: TransactionId,
    pub customer_id: CustomerId,
    pub decision: Decision
}

/// Line written to the output for every result.
#[derive(Debug, Serialize)]
pub struct OutputRecord<'a> {
    pub id: &'a str,
    pub customer_id: &'a str,
    pub accepted: bool
}

impl LoadResult {
    pub fn accepted(transaction: &LoadTransaction) -> Self {
        Self {
            id: transaction.id.clone(),
            customer_id: transaction.customer_id.clone(),
            decision: Decision::Accepted
        }
    }

    pub fn rejected(transaction: &LoadTransaction, reason: LimitViolation) -> Self {
        Self {
            id: transaction.id.clone(),
            customer_id: transaction.customer_id.clone(),
            decision: Decision::Rejected { reason }
        }
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self.decision, Decision::Accepted)
    }

    pub fn to_record(&self) -> OutputRecord<'_> {
        OutputRecord {
            id: &self.id,
            customer_id: &self.customer_id,
            accepted: self.is_accepted()
        }
    }
}
