mod customer_queue;

pub use customer_queue::CustomerQueue;
