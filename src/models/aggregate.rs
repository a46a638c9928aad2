use crate::models::LoadTransaction;
use crate::types::{CustomerId, DateKey, LoadAmount, WeekKey};
use std::collections::HashMap;

/// Running load totals for a single customer.
///
/// An aggregate is owned by exactly one party at a time: the scheduler while
/// the customer is idle, or the worker evaluating that customer's current
/// transaction. It is moved between them rather than shared.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CustomerAggregate {
    /// The customer these totals belong to.
    pub customer_id: CustomerId,
    /// Accepted funds per calendar day.
    daily_loaded: HashMap<DateKey, LoadAmount>,
    /// Accepted funds per week, keyed by the week's Monday.
    weekly_loaded: HashMap<WeekKey, LoadAmount>,
    /// Accepted loads per calendar day.
    daily_count: HashMap<DateKey, u32>
}

impl CustomerAggregate {
    /// Creates an aggregate with no loads for the given customer.
    pub fn new(customer_id: CustomerId) -> Self {
        Self {
            customer_id,
            ..Self::default()
        }
    }

    pub fn daily_loaded(&self, date: &DateKey) -> LoadAmount {
        self.daily_loaded.get(date).copied().unwrap_or_default()
    }

    pub fn weekly_loaded(&self, week: &WeekKey) -> LoadAmount {
        self.weekly_loaded.get(week).copied().unwrap_or_default()
    }

    pub fn daily_count(&self, date: &DateKey) -> u32 {
        self.daily_count.get(date).copied().unwrap_or_default()
    }

    /// Adds an accepted load to every bucket it falls in.
    ///
    /// Callers must only record a transaction after every limit check has
    /// passed for it.
    pub fn record(&mut self, transaction: &LoadTransaction) {
        *self.daily_loaded.entry(transaction.date_key).or_default() += transaction.amount;
        *self.weekly_loaded.entry(transaction.week_key).or_default() += transaction.amount;
        *self.daily_count.entry(transaction.date_key).or_default() += 1;
    }
}
