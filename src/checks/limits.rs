use crate::checks::LimitCheck;
use crate::models::{CustomerAggregate, LimitViolation, LoadTransaction};
use crate::types::LoadAmount;

/// Per-customer velocity limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    /// Maximum funds accepted per calendar day.
    pub daily_amount: LoadAmount,
    /// Maximum funds accepted per Monday-started week.
    pub weekly_amount: LoadAmount,
    /// Maximum number of loads accepted per calendar day.
    pub daily_count: u32
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            daily_amount: LoadAmount::from_dollars(5_000),
            weekly_amount: LoadAmount::from_dollars(20_000),
            daily_count: 3
        }
    }
}

/// Rejects a load that would push the day's accepted funds over the limit.
pub struct DailyAmountCheck {
    limit: LoadAmount
}

impl DailyAmountCheck {
    pub fn new(limit: LoadAmount) -> Self {
        Self { limit }
    }
}

impl LimitCheck for DailyAmountCheck {
    fn check(&self, aggregate: &CustomerAggregate, transaction: &LoadTransaction) -> Result<(), LimitViolation> {
        let loaded = aggregate.daily_loaded(&transaction.date_key);

        match loaded.checked_add(transaction.amount) {
            Some(total) if total <= self.limit => Ok(()),
            _ => Err(LimitViolation::daily_amount(self.limit, transaction))
        }
    }
}

/// Rejects a load that would push the week's accepted funds over the limit.
pub struct WeeklyAmountCheck {
    limit: LoadAmount
}

impl WeeklyAmountCheck {
    pub fn new(limit: LoadAmount) -> Self {
        Self { limit }
    }
}

impl LimitCheck for WeeklyAmountCheck {
    fn check(&self, aggregate: &CustomerAggregate, transaction: &LoadTransaction) -> Result<(), LimitViolation> {
        let loaded = aggregate.weekly_loaded(&transaction.week_key);

        match loaded.checked_add(transaction.amount) {
            Some(total) if total <= self.limit => Ok(()),
            _ => Err(LimitViolation::weekly_amount(self.limit, transaction))
        }
    }
}

/// Rejects a load once the day already holds `limit` accepted loads.
pub struct DailyCountCheck {
    limit: u32
}

impl DailyCountCheck {
    pub fn new(limit: u32) -> Self {
        Self { limit }
    }
}

impl LimitCheck for DailyCountCheck {
    fn check(&self, aggregate: &CustomerAggregate, transaction: &LoadTransaction) -> Result<(), LimitViolation> {
        if aggregate.daily_count(&transaction.date_key).saturating_add(1) > self.limit {
            return Err(LimitViolation::daily_count(self.limit, transaction));
        }

        Ok(())
    }
}
