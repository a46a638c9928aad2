mod collector;
mod ingest;
mod scheduler;
#[cfg(test)]
mod tests;
mod worker;

pub use scheduler::{LoadEngine, RunStatus, DEFAULT_CONCURRENCY};
