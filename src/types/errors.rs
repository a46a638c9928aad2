use rust_decimal::Error as DecimalError;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AmountError {
    #[error("Load amount error: {0}")]
    InvalidFormat(String),
    #[error("Load amount error: {0}")]
    Decimal(#[from] DecimalError),
    #[error("Load amount error: {0} is not a positive amount")]
    NonPositive(String)
}
