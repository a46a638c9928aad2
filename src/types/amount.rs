use crate::types::errors::AmountError;
use rust_decimal::Decimal;
use std::fmt;
use std::fmt::{Display, Formatter};
use std::ops::AddAssign;
use std::str::FromStr;
use tracing::error;

/// An exact, non-negative amount of funds.
///
/// Input amounts carry a one character currency prefix (`"$653.83"`) which is
/// discarded during parsing; the remainder must be a positive decimal.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct LoadAmount(Decimal);

impl LoadAmount {
    pub fn from_dollars(dollars: i64) -> Self {
        LoadAmount(Decimal::from(dollars))
    }

    pub fn checked_add(self, rhs: LoadAmount) -> Option<LoadAmount> {
        self.0.checked_add(rhs.0).map(LoadAmount)
    }
}

impl AddAssign<LoadAmount> for LoadAmount {
    fn add_assign(&mut self, rhs: LoadAmount) {
        if let Some(new_val) = self.checked_add(rhs) {
            self.0 = new_val.0;
        } else {
            error!("LoadAmount AddAssign error: Overflow")
        }
    }
}

impl Display for LoadAmount {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        write!(formatter, "${}", self.0)
    }
}

impl FromStr for LoadAmount {
    type Err = AmountError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let mut chars = value.chars();

        if chars.next().is_none() {
            return Err(AmountError::InvalidFormat("Value is an empty string".to_string()));
        }

        let digits = chars.as_str().trim();

        if digits.is_empty() {
            return Err(AmountError::InvalidFormat(format!("Value '{value}' has no digits after the currency symbol")));
        }

        let amount = Decimal::from_str(digits)?;

        if amount <= Decimal::ZERO {
            return Err(AmountError::NonPositive(value.to_string()));
        }

        Ok(LoadAmount(amount))
    }
}
