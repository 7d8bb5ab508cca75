//! Calendar feature derivation
//!
//! Turns a single date into the calendar flags the ridership models were
//! fitted on: weekday index, ISO week, quarter, weekend, official holiday and
//! school-day classification. Pure and recomputed on every call.

use chrono::{Datelike, NaiveDate};
use serde::Serialize;

pub mod holidays;
pub mod school;

pub use holidays::{Holiday, holiday_name, holidays_for_year, is_official_holiday};
pub use school::{DateRange, SchoolCalendar};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CalendarFeatures {
    pub date: NaiveDate,
    pub year: i32,
    pub month: u32,
    pub day: u32,
    /// Monday = 0 .. Sunday = 6
    pub weekday_num: u32,
    /// ISO week number
    pub weekofyear: u32,
    pub quarter: u32,
    pub is_weekday: bool,
    pub is_weekend: bool,
    pub is_official_holiday: bool,
    /// Mirrors `is_official_holiday`; kept as its own column for the models
    pub is_holiday: bool,
    pub is_school_day: bool,
    pub holiday_name: Option<&'static str>,
}

/// Derive calendar features with the built-in MEB school calendar.
#[must_use]
pub fn derive(date: NaiveDate) -> CalendarFeatures {
    SchoolCalendar::default().derive(date)
}

impl SchoolCalendar {
    #[must_use]
    pub fn derive(&self, date: NaiveDate) -> CalendarFeatures {
        let weekday_num = date.weekday().num_days_from_monday();
        let is_weekend = weekday_num >= 5;

        let month = date.month();
        let holiday_name = holiday_name(date);
        let is_official_holiday = holiday_name.is_some();

        let is_school_day =
            self.in_term(date) && !is_weekend && !is_official_holiday && !self.in_break(date);

        CalendarFeatures {
            date,
            year: date.year(),
            month,
            day: date.day(),
            weekday_num,
            weekofyear: date.iso_week().week(),
            quarter: (month - 1) / 3 + 1,
            is_weekday: !is_weekend,
            is_weekend,
            is_official_holiday,
            is_holiday: is_official_holiday,
            is_school_day,
            holiday_name,
        }
    }
}
