//! Turkish official public holidays
//!
//! Fixed-date national holidays are generated for any year. The two
//! religious feasts follow the lunar calendar and come from a dated table;
//! years outside the table only get the fixed-date holidays.

use chrono::{Datelike, Duration, NaiveDate};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Holiday {
    pub date: NaiveDate,
    pub name: &'static str,
}

const RAMADAN_FEAST: &str = "Ramadan Feast";
const SACRIFICE_FEAST: &str = "Sacrifice Feast";

/// (year, month, day) of the first day of the Ramadan Feast, per Diyanet.
const RAMADAN_FEAST_START: &[(i32, u32, u32)] = &[
    (2015, 7, 17),
    (2016, 7, 5),
    (2017, 6, 25),
    (2018, 6, 15),
    (2019, 6, 4),
    (2020, 5, 24),
    (2021, 5, 13),
    (2022, 5, 2),
    (2023, 4, 21),
    (2024, 4, 10),
    (2025, 3, 30),
    (2026, 3, 20),
    (2027, 3, 9),
    (2028, 2, 26),
    (2029, 2, 14),
    (2030, 2, 5),
];

/// (year, month, day) of the first day of the Sacrifice Feast.
const SACRIFICE_FEAST_START: &[(i32, u32, u32)] = &[
    (2015, 9, 24),
    (2016, 9, 12),
    (2017, 9, 1),
    (2018, 8, 21),
    (2019, 8, 11),
    (2020, 7, 31),
    (2021, 7, 20),
    (2022, 7, 9),
    (2023, 6, 28),
    (2024, 6, 16),
    (2025, 6, 6),
    (2026, 5, 27),
    (2027, 5, 16),
    (2028, 5, 5),
    (2029, 4, 24),
    (2030, 4, 13),
];

fn feast_days(
    year: i32,
    table: &[(i32, u32, u32)],
    length: i64,
    name: &'static str,
    out: &mut Vec<Holiday>,
) {
    let Some(start) = table
        .iter()
        .find(|(y, _, _)| *y == year)
        .and_then(|&(y, m, d)| NaiveDate::from_ymd_opt(y, m, d))
    else {
        return;
    };
    for offset in 0..length {
        out.push(Holiday {
            date: start + Duration::days(offset),
            name,
        });
    }
}

/// All official holidays of `year`, sorted by date.
#[must_use]
pub fn holidays_for_year(year: i32) -> Vec<Holiday> {
    let mut fixed: Vec<(u32, u32, &'static str)> = vec![
        (1, 1, "New Year's Day"),
        (4, 23, "National Sovereignty and Children's Day"),
        (5, 1, "Labour and Solidarity Day"),
        (5, 19, "Commemoration of Atatürk, Youth and Sports Day"),
        (8, 30, "Victory Day"),
        (10, 29, "Republic Day"),
    ];
    if year >= 2017 {
        fixed.push((7, 15, "Democracy and National Unity Day"));
    }

    let mut holidays: Vec<Holiday> = fixed
        .into_iter()
        .filter_map(|(m, d, name)| NaiveDate::from_ymd_opt(year, m, d).map(|date| Holiday { date, name }))
        .collect();

    feast_days(year, RAMADAN_FEAST_START, 3, RAMADAN_FEAST, &mut holidays);
    feast_days(year, SACRIFICE_FEAST_START, 4, SACRIFICE_FEAST, &mut holidays);

    holidays.sort_by_key(|h| h.date);
    holidays
}

/// Name of the official holiday on `date`, if any. When two holidays fall on
/// the same day the earlier-listed name is returned.
#[must_use]
pub fn holiday_name(date: NaiveDate) -> Option<&'static str> {
    holidays_for_year(date.year())
        .into_iter()
        .find(|h| h.date == date)
        .map(|h| h.name)
}

#[must_use]
pub fn is_official_holiday(date: NaiveDate) -> bool {
    holiday_name(date).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[rstest]
    #[case(ymd(2024, 1, 1), "New Year's Day")]
    #[case(ymd(2024, 4, 23), "National Sovereignty and Children's Day")]
    #[case(ymd(2023, 10, 29), "Republic Day")]
    #[case(ymd(2024, 7, 15), "Democracy and National Unity Day")]
    #[case(ymd(2024, 4, 11), "Ramadan Feast")]
    #[case(ymd(2024, 6, 19), "Sacrifice Feast")]
    #[case(ymd(2023, 6, 28), "Sacrifice Feast")]
    fn test_known_holidays(#[case] date: NaiveDate, #[case] expected: &str) {
        assert_eq!(holiday_name(date), Some(expected));
    }

    #[rstest]
    #[case(ymd(2024, 12, 1))]
    #[case(ymd(2024, 11, 12))]
    #[case(ymd(2024, 6, 20))]
    #[case(ymd(2016, 7, 15))]
    fn test_non_holidays(#[case] date: NaiveDate) {
        assert!(!is_official_holiday(date));
    }

    #[test]
    fn test_feast_lengths() {
        let h = holidays_for_year(2024);
        assert_eq!(h.iter().filter(|h| h.name == RAMADAN_FEAST).count(), 3);
        assert_eq!(h.iter().filter(|h| h.name == SACRIFICE_FEAST).count(), 4);
        assert!(h.windows(2).all(|w| w[0].date <= w[1].date));
    }

    #[test]
    fn test_years_outside_table_keep_fixed_holidays() {
        let h = holidays_for_year(2040);
        assert_eq!(h.len(), 7);
        assert!(h.iter().all(|h| h.name != RAMADAN_FEAST));
    }
}
