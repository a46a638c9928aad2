use chrono::{DateTime, FixedOffset};
use serde::Deserialize;
use std::str::FromStr;

use crate::models::IngestError;
use crate::types::{CustomerId, DateKey, LoadAmount, TransactionId, WeekKey};

/// Seconds between the Unix epoch and `0001-01-01T00:00:00Z`, the zero timestamp.
const ZERO_TIME_SECONDS: i64 = -62_135_596_800;

/// Represents a single line from the input file as written.
///
/// Every field is optional here so that a structurally valid record with a
/// missing field is reported as such rather than as a JSON error.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawLoadRecord {
    #[serde(default)]
    pub id: Option<TransactionId>,
    #[serde(default)]
    pub customer_id: Option<CustomerId>,
    #[serde(default)]
    pub load_amount: Option<String>,
    #[serde(default)]
    pub time: Option<DateTime<FixedOffset>>
}

/// A validated load with its derived day and week buckets.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadTransaction {
    pub id: TransactionId,
    pub customer_id: CustomerId,
    pub amount: LoadAmount,
    pub time: DateTime<FixedOffset>,
    /// Day bucket used by the daily amount and count limits.
    pub date_key: DateKey,
    /// Monday bucket used by the weekly amount limit.
    pub week_key: WeekKey
}

impl LoadTransaction {
    pub fn new(id: TransactionId, customer_id: CustomerId, amount: LoadAmount, time: DateTime<FixedOffset>) -> Self {
        Self {
            id,
            customer_id,
            amount,
            date_key: DateKey::from_time(&time),
            week_key: WeekKey::from_time(&time),
            time
        }
    }

    /// Parses and enriches one raw input line. Invalid UTF-8 is reported as malformed.
    pub fn parse_line(line: &[u8]) -> Result<Self, IngestError> {
        let record: RawLoadRecord = serde_json::from_slice(line)?;
        Self::try_from(record)
    }
}

impl TryFrom<RawLoadRecord> for LoadTransaction {
    type Error = IngestError;

    fn try_from(record: RawLoadRecord) -> Result<Self, Self::Error> {
        let id = required(record.id, "id")?;
        let customer_id = required(record.customer_id, "customer_id")?;
        let load_amount = required(record.load_amount, "load_amount")?;
        let time = record.time.ok_or(IngestError::MissingField { field: "time" })?;

        if time.timestamp() == ZERO_TIME_SECONDS && time.timestamp_subsec_nanos() == 0 {
            return Err(IngestError::ZeroTime { id });
        }

        let amount = LoadAmount::from_str(&load_amount)
            .map_err(|source| IngestError::InvalidAmount { id: id.clone(), source })?;

        Ok(Self::new(id, customer_id, amount, time))
    }
}

fn required(value: Option<String>, field: &'static str) -> Result<String, IngestError> {
    value
        .filter(|value| !value.is_empty())
        .ok_or(IngestError::MissingField { field })
}
