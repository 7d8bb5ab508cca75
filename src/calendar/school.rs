//! MEB academic calendar tables
//!
//! Terms are the broad windows in which schools may be open; breaks are the
//! inter-term holidays (autumn break, semester break, spring break) inside
//! them. Both are closed ranges.

use chrono::NaiveDate;
use serde::Serialize;

/// Closed date interval, inclusive on both ends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    #[must_use]
    pub const fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    #[must_use]
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    /// Every date in the range, start to end.
    pub fn days(&self) -> impl Iterator<Item = NaiveDate> + use<> {
        let end = self.end;
        self.start.iter_days().take_while(move |d| *d <= end)
    }
}

const fn ymd(year: i32, month: u32, day: u32) -> NaiveDate {
    match NaiveDate::from_ymd_opt(year, month, day) {
        Some(date) => date,
        None => panic!("invalid calendar table date"),
    }
}

pub const SCHOOL_TERMS: &[DateRange] = &[
    DateRange::new(ymd(2022, 9, 12), ymd(2023, 6, 16)),
    DateRange::new(ymd(2023, 9, 11), ymd(2024, 6, 14)),
    // first semester of 2024-2025 only
    DateRange::new(ymd(2024, 9, 9), ymd(2025, 1, 17)),
];

pub const SCHOOL_BREAKS: &[DateRange] = &[
    DateRange::new(ymd(2022, 11, 14), ymd(2022, 11, 18)),
    DateRange::new(ymd(2023, 1, 23), ymd(2023, 2, 3)),
    DateRange::new(ymd(2023, 4, 17), ymd(2023, 4, 20)),
    DateRange::new(ymd(2023, 11, 13), ymd(2023, 11, 17)),
    DateRange::new(ymd(2024, 1, 22), ymd(2024, 2, 2)),
    DateRange::new(ymd(2024, 4, 8), ymd(2024, 4, 12)),
    DateRange::new(ymd(2024, 11, 11), ymd(2024, 11, 15)),
];

fn in_any_range(date: NaiveDate, ranges: &[DateRange]) -> bool {
    ranges.iter().any(|r| r.contains(date))
}

/// Term and break tables used for school-day classification
#[derive(Debug, Clone)]
pub struct SchoolCalendar {
    pub terms: Vec<DateRange>,
    pub breaks: Vec<DateRange>,
}

impl Default for SchoolCalendar {
    fn default() -> Self {
        Self {
            terms: SCHOOL_TERMS.to_vec(),
            breaks: SCHOOL_BREAKS.to_vec(),
        }
    }
}

impl SchoolCalendar {
    #[must_use]
    pub fn in_term(&self, date: NaiveDate) -> bool {
        in_any_range(date, &self.terms)
    }

    #[must_use]
    pub fn in_break(&self, date: NaiveDate) -> bool {
        in_any_range(date, &self.breaks)
    }
}
