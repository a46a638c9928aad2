mod aggregate_storage;

use crate::models::CustomerAggregate;
use crate::types::CustomerId;

pub use aggregate_storage::AggregateStorage;

/// Where a finished run leaves its customer aggregates.
///
/// The engine only saves; a run never reads an aggregate back.
pub trait Storage: Send + Sync + 'static {
    #[cfg(test)]
    fn load(&self, customer_id: &str) -> Option<CustomerAggregate>;
    fn save(&self, customer_id: CustomerId, aggregate: CustomerAggregate);
}
