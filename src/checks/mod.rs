mod limits;

use crate::models::{CustomerAggregate, LimitViolation, LoadResult, LoadTransaction};

pub use limits::{DailyAmountCheck, DailyCountCheck, Limits, WeeklyAmountCheck};

/// A single limit a load must satisfy before it is accepted.
///
/// Checks only read the aggregate; the pipeline records an accepted load once
/// every check has passed.
pub trait LimitCheck: Send + Sync + 'static {
    fn check(&self, aggregate: &CustomerAggregate, transaction: &LoadTransaction) -> Result<(), LimitViolation>;
}

/// Ordered set of limit checks, evaluated until the first violation.
pub struct CheckerPipeline {
    checks: Vec<Box<dyn LimitCheck>>
}

impl CheckerPipeline {
    /// A pipeline with no checks, accepting every load.
    pub fn empty() -> Self {
        Self { checks: Vec::new() }
    }

    /// Daily amount, weekly amount and daily count checks, in that order.
    pub fn standard(limits: Limits) -> Self {
        Self::empty()
            .with_check(DailyAmountCheck::new(limits.daily_amount))
            .with_check(WeeklyAmountCheck::new(limits.weekly_amount))
            .with_check(DailyCountCheck::new(limits.daily_count))
    }

    /// Appends a check after the ones already registered.
    pub fn with_check<C: LimitCheck>(mut self, check: C) -> Self {
        self.checks.push(Box::new(check));
        self
    }

    pub fn check(&self, aggregate: &CustomerAggregate, transaction: &LoadTransaction) -> Result<(), LimitViolation> {
        self.checks.iter().try_for_each(|check| check.check(aggregate, transaction))
    }

    /// Decides a load and, when it is accepted, records it on the aggregate.
    pub fn evaluate(&self, aggregate: &mut CustomerAggregate, transaction: &LoadTransaction) -> LoadResult {
        match self.check(aggregate, transaction) {
            Ok(()) => {
                aggregate.record(transaction);
                LoadResult::accepted(transaction)
            }
            Err(reason) => LoadResult::rejected(transaction, reason)
        }
    }
}

impl Default for CheckerPipeline {
    fn default() -> Self {
        Self::standard(Limits::default())
    }
}
