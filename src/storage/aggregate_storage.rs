use crate::models::CustomerAggregate;
use crate::storage::Storage;
use crate::types::CustomerId;
use dashmap::DashMap;
use std::sync::Arc;

/// In-memory map of the aggregates saved by engine runs.
///
/// A later run overwrites the aggregate of every customer it saw.
pub struct AggregateStorage {
    cache: Arc<DashMap<CustomerId, CustomerAggregate>>
}

impl AggregateStorage {
    pub fn new() -> Self {
        Self {
            cache: Arc::new(DashMap::new())
        }
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }
}

impl Default for AggregateStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl Storage for AggregateStorage {
    #[cfg(test)]
    fn load(&self, customer_id: &str) -> Option<CustomerAggregate> {
        self.cache.remove(customer_id).map(|(_, aggregate)| aggregate)
    }

    fn save(&self, customer_id: CustomerId, aggregate: CustomerAggregate) {
        self.cache.insert(customer_id, aggregate);
    }
}
