use crate::models::LoadTransaction;
use crate::types::{AmountError, DateKey, LoadAmount, TransactionId, WeekKey};
use thiserror::Error;

/// Reasons an input line is dropped before it reaches a customer queue.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Malformed record: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("Record is missing required field [{field}]")]
    MissingField {
        field: &'static str
    },
    #[error("Transaction [{id}] has an invalid load amount: {source}")]
    InvalidAmount {
        id: TransactionId,
        #[source]
        source: AmountError
    },
    #[error("Transaction [{id}] has a zero timestamp")]
    ZeroTime {
        id: TransactionId
    }
}

/// Why a limit check refused a load. This is an ordinary rejected outcome.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LimitViolation {
    #[error("exceeds maximum daily load funds ({limit}) on date {date}")]
    DailyAmount {
        limit: LoadAmount,
        date: DateKey
    },
    #[error("exceeds maximum weekly load funds ({limit}) on week starting {week}")]
    WeeklyAmount {
        limit: LoadAmount,
        week: WeekKey
    },
    #[error("exceeds maximum daily load count ({limit}) on date {date}")]
    DailyCount {
        limit: u32,
        date: DateKey
    }
}

impl LimitViolation {
    pub fn daily_amount(limit: LoadAmount, tx: &LoadTransaction) -> Self {
        Self::DailyAmount { limit, date: tx.date_key }
    }

    pub fn weekly_amount(limit: LoadAmount, tx: &LoadTransaction) -> Self {
        Self::WeeklyAmount { limit, week: tx.week_key }
    }

    pub fn daily_count(limit: u32, tx: &LoadTransaction) -> Self {
        Self::DailyCount { limit, date: tx.date_key }
    }
}
