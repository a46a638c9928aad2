use chrono::{DateTime, Datelike, Days, FixedOffset, NaiveDate};
use std::fmt;
use std::fmt::{Display, Formatter};

/// Calendar day a load is bucketed under for daily limits.
///
/// The day is taken in the UTC offset the timestamp was written with, so a
/// load at `2000-01-01T23:30:00-05:00` counts towards January 1st.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct DateKey(NaiveDate);

/// Monday of the week a load is bucketed under for weekly limits.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct WeekKey(NaiveDate);

impl DateKey {
    pub fn from_time(time: &DateTime<FixedOffset>) -> Self {
        DateKey(time.date_naive())
    }
}

impl WeekKey {
    pub fn from_time(time: &DateTime<FixedOffset>) -> Self {
        Self::from_date(time.date_naive())
    }

    /// Sunday belongs to the week that started six days earlier.
    pub fn from_date(date: NaiveDate) -> Self {
        let offset = date.weekday().num_days_from_monday();
        let monday = date.checked_sub_days(Days::new(u64::from(offset))).unwrap_or(date);
        WeekKey(monday)
    }
}

impl Display for DateKey {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}", self.0.format("%Y-%m-%d"))
    }
}

impl Display for WeekKey {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}", self.0.format("%Y-%m-%d"))
    }
}
