mod aggregate;
mod errors;
mod result;
mod transaction;

pub use aggregate::CustomerAggregate;
pub use errors::{IngestError, LimitViolation};
pub use result::{Decision, LoadResult};
pub use transaction::LoadTransaction;
