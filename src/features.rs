//! Feature rows
//!
//! A single-row table keyed by column name, assembled from a handful of user
//! inputs plus derived calendar flags. Columns the models expect but the
//! input cannot supply are filled from documented defaults.

use std::fmt;

use chrono::NaiveDate;
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use tracing::debug;

use crate::calendar::CalendarFeatures;
use crate::model::Regressor;
use crate::stations::Station;
use crate::{RailcastError, Result};

/// Every column the ridership models know about, in canonical order.
pub const COLUMNS: &[&str] = &[
    "station_name",
    "district_name",
    "district_norm",
    "date",
    "passage_cnt",
    "rain_mm",
    "precip_mm",
    "snowfall_cm",
    "snow_depth_cm",
    "et0_mm",
    "tmax_c",
    "tmin_c",
    "tmean_c",
    "tapp_max_c",
    "tapp_min_c",
    "tapp_mean_c",
    "wind10m_mean_kmh",
    "cloud_cover_mean_pct",
    "sunshine_sec",
    "sunshine_hours",
    "year",
    "month",
    "day",
    "weekday_num",
    "weekofyear",
    "quarter",
    "is_weekday",
    "is_weekend",
    "is_holiday",
    "is_official_holiday",
    "is_religious_holiday",
    "is_school_day",
    "Hafta Sonu",
    "Tatiller",
    "Okul Günleri",
    "is_outlier",
    "is_extreme_day",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FeatureValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl FeatureValue {
    /// Numeric view; booleans count as 0/1, text has none.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FeatureValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            FeatureValue::Int(i) => Some(*i as f64),
            FeatureValue::Float(f) => Some(*f),
            FeatureValue::Text(_) => None,
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FeatureValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for FeatureValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeatureValue::Bool(b) => write!(f, "{b}"),
            FeatureValue::Int(i) => write!(f, "{i}"),
            FeatureValue::Float(x) => write!(f, "{x}"),
            FeatureValue::Text(s) => write!(f, "{s:?}"),
        }
    }
}

impl From<f64> for FeatureValue {
    fn from(v: f64) -> Self {
        FeatureValue::Float(v)
    }
}

impl From<i64> for FeatureValue {
    fn from(v: i64) -> Self {
        FeatureValue::Int(v)
    }
}

impl From<bool> for FeatureValue {
    fn from(v: bool) -> Self {
        FeatureValue::Bool(v)
    }
}

impl From<&str> for FeatureValue {
    fn from(v: &str) -> Self {
        FeatureValue::Text(v.to_string())
    }
}

impl From<String> for FeatureValue {
    fn from(v: String) -> Self {
        FeatureValue::Text(v)
    }
}

fn flag(b: bool) -> FeatureValue {
    FeatureValue::Int(i64::from(b))
}

/// Ordered column → value mapping for one prediction
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureRow {
    columns: Vec<(String, FeatureValue)>,
}

impl FeatureRow {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a column; an existing column keeps its position.
    pub fn insert<K: Into<String>, V: Into<FeatureValue>>(&mut self, column: K, value: V) {
        let column = column.into();
        let value = value.into();
        match self.columns.iter_mut().find(|(c, _)| *c == column) {
            Some((_, slot)) => *slot = value,
            None => self.columns.push((column, value)),
        }
    }

    #[must_use]
    pub fn with<K: Into<String>, V: Into<FeatureValue>>(mut self, column: K, value: V) -> Self {
        self.insert(column, value);
        self
    }

    #[must_use]
    pub fn get(&self, column: &str) -> Option<&FeatureValue> {
        self.columns
            .iter()
            .find(|(c, _)| c == column)
            .map(|(_, v)| v)
    }

    #[must_use]
    pub fn contains(&self, column: &str) -> bool {
        self.get(column).is_some()
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(c, _)| c.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FeatureValue)> {
        self.columns.iter().map(|(c, v)| (c.as_str(), v))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Short one-line description used in error context.
    #[must_use]
    pub fn summary(&self) -> String {
        let key = |c: &str| self.get(c).map_or_else(|| "-".to_string(), ToString::to_string);
        format!(
            "{} columns; station_name={} district_norm={} date={}",
            self.len(),
            key("station_name"),
            key("district_norm"),
            key("date")
        )
    }
}

impl Serialize for FeatureRow {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.columns.len()))?;
        for (column, value) in &self.columns {
            map.serialize_entry(column, value)?;
        }
        map.end()
    }
}

/// Values used for columns the input cannot supply.
///
/// The two weather constants are placeholders, not measurements; rows that
/// rely on them are flagged in [`AssembledRow::placeholders`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDefaults {
    pub wind10m_mean_kmh: f64,
    pub cloud_cover_mean_pct: f64,
}

impl Default for ColumnDefaults {
    fn default() -> Self {
        Self {
            wind10m_mean_kmh: 10.0,
            cloud_cover_mean_pct: 50.0,
        }
    }
}

impl ColumnDefaults {
    /// Default for a missing column; unknown columns get integer 0.
    #[must_use]
    pub fn value_for(&self, column: &str) -> FeatureValue {
        match column {
            "station_name" | "district_name" => "UNKNOWN".into(),
            "district_norm" => "unknown".into(),
            "date" => "1970-01-01".into(),
            "is_outlier" => false.into(),
            "wind10m_mean_kmh" => self.wind10m_mean_kmh.into(),
            "cloud_cover_mean_pct" => self.cloud_cover_mean_pct.into(),
            "rain_mm" | "precip_mm" | "snowfall_cm" | "snow_depth_cm" | "et0_mm" | "tmax_c"
            | "tmin_c" | "tmean_c" | "tapp_max_c" | "tapp_min_c" | "tapp_mean_c"
            | "sunshine_sec" | "sunshine_hours" | "passage_cnt" => 0.0.into(),
            _ => FeatureValue::Int(0),
        }
    }
}

fn default_tmax() -> f64 {
    20.0
}

fn default_tmin() -> f64 {
    10.0
}

/// The few values a caller supplies for one prediction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowInput {
    /// Defaults to today in the configured timezone
    #[serde(default)]
    pub date: Option<NaiveDate>,
    /// Station label (`"<station> — <district>"`) or an unambiguous station name
    pub station: String,
    #[serde(default)]
    pub sunshine_hours: f64,
    #[serde(default)]
    pub rain_mm: f64,
    #[serde(default = "default_tmax")]
    pub tmax_c: f64,
    #[serde(default = "default_tmin")]
    pub tmin_c: f64,
    #[serde(default)]
    pub passage_cnt: f64,
    #[serde(default)]
    pub is_religious_holiday: bool,
}

impl RowInput {
    #[must_use]
    pub fn new<S: Into<String>>(station: S, date: NaiveDate) -> Self {
        Self {
            date: Some(date),
            station: station.into(),
            sunshine_hours: 0.0,
            rain_mm: 0.0,
            tmax_c: default_tmax(),
            tmin_c: default_tmin(),
            passage_cnt: 0.0,
            is_religious_holiday: false,
        }
    }

    pub fn validate(&self) -> Result<()> {
        let numbers = [
            ("sunshine_hours", self.sunshine_hours),
            ("rain_mm", self.rain_mm),
            ("tmax_c", self.tmax_c),
            ("tmin_c", self.tmin_c),
            ("passage_cnt", self.passage_cnt),
        ];
        if let Some((name, _)) = numbers.iter().find(|(_, v)| !v.is_finite()) {
            return Err(RailcastError::validation(format!("{name} must be a finite number")));
        }
        if self.tmin_c > self.tmax_c {
            return Err(RailcastError::validation(format!(
                "tmin_c ({}) cannot exceed tmax_c ({})",
                self.tmin_c, self.tmax_c
            )));
        }
        for (name, value) in [
            ("rain_mm", self.rain_mm),
            ("sunshine_hours", self.sunshine_hours),
            ("passage_cnt", self.passage_cnt),
        ] {
            if value < 0.0 {
                return Err(RailcastError::validation(format!("{name} cannot be negative")));
            }
        }
        if self.sunshine_hours > 24.0 {
            return Err(RailcastError::validation("sunshine_hours cannot exceed 24"));
        }
        Ok(())
    }
}

/// A full row plus what went into it
#[derive(Debug, Clone, Serialize)]
pub struct AssembledRow {
    pub row: FeatureRow,
    pub station: Station,
    pub calendar: CalendarFeatures,
    /// Weather columns filled with placeholder constants instead of
    /// measurements
    pub placeholders: Vec<&'static str>,
}

/// Build the full documented row from user input.
#[must_use]
pub fn build_row(
    input: &RowInput,
    station: &Station,
    calendar: &CalendarFeatures,
    defaults: &ColumnDefaults,
) -> AssembledRow {
    let tmean_c = (input.tmax_c + input.tmin_c) / 2.0;
    let placeholders = vec!["wind10m_mean_kmh", "cloud_cover_mean_pct"];
    debug!(
        wind10m_mean_kmh = defaults.wind10m_mean_kmh,
        cloud_cover_mean_pct = defaults.cloud_cover_mean_pct,
        "Using placeholder weather values"
    );

    let row = FeatureRow::new()
        .with("station_name", station.name.as_str())
        .with("district_name", station.district.as_str())
        .with("district_norm", station.district_norm.as_str())
        .with("date", calendar.date.format("%Y-%m-%d").to_string())
        .with("passage_cnt", input.passage_cnt)
        .with("rain_mm", input.rain_mm)
        .with("precip_mm", input.rain_mm)
        .with("snowfall_cm", 0.0)
        .with("snow_depth_cm", 0.0)
        .with("et0_mm", 0.0)
        .with("tmax_c", input.tmax_c)
        .with("tmin_c", input.tmin_c)
        .with("tmean_c", tmean_c)
        .with("tapp_max_c", input.tmax_c)
        .with("tapp_min_c", input.tmin_c)
        .with("tapp_mean_c", tmean_c)
        .with("wind10m_mean_kmh", defaults.wind10m_mean_kmh)
        .with("cloud_cover_mean_pct", defaults.cloud_cover_mean_pct)
        .with("sunshine_sec", input.sunshine_hours * 3600.0)
        .with("sunshine_hours", input.sunshine_hours)
        .with("year", i64::from(calendar.year))
        .with("month", i64::from(calendar.month))
        .with("day", i64::from(calendar.day))
        .with("weekday_num", i64::from(calendar.weekday_num))
        .with("weekofyear", i64::from(calendar.weekofyear))
        .with("quarter", i64::from(calendar.quarter))
        .with("is_weekday", flag(calendar.is_weekday))
        .with("is_weekend", flag(calendar.is_weekend))
        .with("is_holiday", flag(calendar.is_holiday))
        .with("is_official_holiday", flag(calendar.is_official_holiday))
        .with("is_religious_holiday", flag(input.is_religious_holiday))
        .with("is_school_day", flag(calendar.is_school_day))
        .with("Hafta Sonu", flag(calendar.is_weekend))
        .with("Tatiller", flag(calendar.is_official_holiday))
        .with("Okul Günleri", flag(calendar.is_school_day))
        .with("is_outlier", false)
        .with("is_extreme_day", FeatureValue::Int(0));

    AssembledRow {
        row,
        station: station.clone(),
        calendar: calendar.clone(),
        placeholders,
    }
}

/// Ordered union of column lists, first occurrence wins.
#[must_use]
pub fn union_columns<'a, I>(lists: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a [String]>,
{
    let mut out: Vec<String> = Vec::new();
    for list in lists {
        for column in list {
            if !out.contains(column) {
                out.push(column.clone());
            }
        }
    }
    out
}

/// Columns the given components were fitted on, in first-seen order.
/// Components that do not record their input columns contribute nothing.
#[must_use]
pub fn required_columns(components: &[&dyn Regressor]) -> Vec<String> {
    union_columns(components.iter().filter_map(|c| c.feature_names_in()))
}

/// Row reshaped to the columns the models were fitted on
#[derive(Debug, Clone, Serialize)]
pub struct AlignedRow {
    pub row: FeatureRow,
    /// Required columns that were missing and got a default
    pub filled: Vec<String>,
}

/// Restrict `row` to `required` (in that order), filling gaps from
/// `defaults`. An empty `required` list means the expected columns are
/// unknown and the row passes through unchanged.
#[must_use]
pub fn align(row: &FeatureRow, required: &[String], defaults: &ColumnDefaults) -> AlignedRow {
    if required.is_empty() {
        return AlignedRow {
            row: row.clone(),
            filled: Vec::new(),
        };
    }

    let mut aligned = FeatureRow::new();
    let mut filled = Vec::new();
    for column in required {
        match row.get(column) {
            Some(value) => aligned.insert(column.clone(), value.clone()),
            None => {
                aligned.insert(column.clone(), defaults.value_for(column));
                filled.push(column.clone());
            }
        }
    }
    if !filled.is_empty() {
        debug!(?filled, "Filled missing model columns with defaults");
    }
    AlignedRow {
        row: aligned,
        filled,
    }
}
