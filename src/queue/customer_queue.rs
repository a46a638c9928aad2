use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::models::LoadTransaction;

/// FIFO of pending loads for one customer.
///
/// Every call locks the queue, so concurrent pushes and pops never corrupt it.
/// Consecutive calls are not atomic with each other: `is_empty` followed by
/// `pop_front` may still observe an empty queue if another consumer raced in
/// between. The scheduler never lets two consumers at the same customer.
#[derive(Debug, Default)]
pub struct CustomerQueue {
    pending: Mutex<VecDeque<LoadTransaction>>
}

impl CustomerQueue {
    pub fn new() -> Self {
        Self {
            pending: Mutex::new(VecDeque::with_capacity(5))
        }
    }

    pub fn push_back(&self, transaction: LoadTransaction) {
        self.lock().push_back(transaction);
    }

    /// Removes the oldest pending load, or returns `None` without blocking.
    pub fn pop_front(&self) -> Option<LoadTransaction> {
        self.lock().pop_front()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<LoadTransaction>> {
        // A panic while holding the lock cannot leave the deque half-updated.
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
