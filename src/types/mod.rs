mod amount;
mod calendar;
mod errors;

pub use amount::LoadAmount;
pub use calendar::{DateKey, WeekKey};
pub use errors::AmountError;

pub type CustomerId = String;
pub type TransactionId = String;
