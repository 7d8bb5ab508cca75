//! Ridership forecast service
//!
//! Ties the pieces together for one request: station lookup, calendar
//! flags, row assembly, alignment to the columns the models were fitted on,
//! and the blended prediction.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::Result;
use crate::artifact::ArtifactHandle;
use crate::calendar::{self, CalendarFeatures};
use crate::features::{AssembledRow, ColumnDefaults, FeatureRow, RowInput, align, build_row};
use crate::predictor::{EnsemblePredictor, PredictionResult};
use crate::stations::{Station, StationCatalog};

/// Prediction for one station and day, with everything that went into it
#[derive(Debug, Clone, Serialize)]
pub struct RidershipForecast {
    pub station: Station,
    pub date: NaiveDate,
    pub calendar: CalendarFeatures,
    /// Row as handed to the models
    pub row: FeatureRow,
    /// Model columns the input could not supply
    pub filled_columns: Vec<String>,
    /// Weather columns set from placeholder constants
    pub placeholders: Vec<&'static str>,
    pub prediction: PredictionResult,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct ForecastService {
    handle: Arc<ArtifactHandle>,
    catalog: &'static StationCatalog,
    defaults: ColumnDefaults,
    timezone: Tz,
}

impl ForecastService {
    #[must_use]
    pub fn new(handle: Arc<ArtifactHandle>, defaults: ColumnDefaults, timezone: Tz) -> Self {
        Self {
            handle,
            catalog: StationCatalog::builtin(),
            defaults,
            timezone,
        }
    }

    #[must_use]
    pub fn handle(&self) -> &ArtifactHandle {
        &self.handle
    }

    #[must_use]
    pub fn catalog(&self) -> &'static StationCatalog {
        self.catalog
    }

    /// Current date in the configured timezone.
    #[must_use]
    pub fn today(&self) -> NaiveDate {
        Utc::now().with_timezone(&self.timezone).date_naive()
    }

    /// Validate the input and build the full feature row; no model needed.
    pub fn assemble(&self, input: &RowInput) -> Result<AssembledRow> {
        input.validate()?;
        let station = self.catalog.find(&input.station)?;
        let date = input.date.unwrap_or_else(|| self.today());
        let calendar = calendar::derive(date);
        Ok(build_row(input, station, &calendar, &self.defaults))
    }

    /// Predict ridership for one station and day.
    #[instrument(skip(self, input), fields(station = %input.station, date = ?input.date))]
    pub async fn forecast(&self, input: &RowInput) -> Result<RidershipForecast> {
        let assembled = self.assemble(input)?;
        let bundle = self.handle.get().await?;

        let aligned = align(&assembled.row, &bundle.expected_columns(), &self.defaults);
        if !aligned.filled.is_empty() {
            warn!(filled = ?aligned.filled, "Model expects columns the input does not provide");
        }

        let prediction = EnsemblePredictor::new(bundle).predict(&aligned.row)?;
        info!(
            station = %assembled.station.label(),
            date = %assembled.calendar.date,
            value = prediction.value,
            "Predicted ridership"
        );

        Ok(RidershipForecast {
            station: assembled.station,
            date: assembled.calendar.date,
            calendar: assembled.calendar,
            row: aligned.row,
            filled_columns: aligned.filled,
            placeholders: assembled.placeholders,
            prediction,
            generated_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RailcastError;
    use crate::artifact::resolve;
    use serde_json::json;

    fn service(bundle: serde_json::Value) -> ForecastService {
        let handle = ArtifactHandle::preloaded(resolve(&bundle).unwrap());
        ForecastService::new(Arc::new(handle), ColumnDefaults::default(), chrono_tz::Europe::Istanbul)
    }

    fn weekend_split_forest() -> serde_json::Value {
        json!({
            "__class__": "RandomForestRegressor",
            "__module__": "sklearn.ensemble._forest",
            "__dict__": {
                "feature_names_in_": ["is_weekend", "tmax_c", "district_norm", "mystery"],
                "trees": [{"nodes": [
                    {"feature": 0, "threshold": 0.5, "left": 1, "right": 2},
                    {"value": 1000.0},
                    {"value": 400.0}
                ]}]
            }
        })
    }

    fn flat_booster(value: f64) -> serde_json::Value {
        json!({
            "__class__": "CatBoostRegressor",
            "__module__": "catboost.core",
            "__dict__": {
                "feature_names_in_": ["tmax_c"],
                "trees": [{"nodes": [{"value": value}]}]
            }
        })
    }

    #[tokio::test]
    async fn test_forecast_end_to_end() {
        let service = service(json!({
            "rf_pipe": weekend_split_forest(),
            "cat_pipe": flat_booster(500.0),
            "alpha": 0.5
        }));
        let date = NaiveDate::from_ymd_opt(2024, 12, 1).unwrap();
        let forecast = service
            .forecast(&RowInput::new("Kabataş", date))
            .await
            .unwrap();

        assert!(forecast.calendar.is_weekend);
        assert_eq!(forecast.prediction.forest, 400.0);
        assert_eq!(forecast.prediction.boosted, 500.0);
        assert_eq!(forecast.prediction.value, 450.0);
        assert_eq!(forecast.filled_columns, vec!["mystery"]);
        let columns: Vec<&str> = forecast.row.columns().collect();
        assert_eq!(columns, vec!["is_weekend", "tmax_c", "district_norm", "mystery"]);
    }

    #[tokio::test]
    async fn test_invalid_input_fails_before_model() {
        let service = ForecastService::new(
            Arc::new(ArtifactHandle::new("/missing/bundle.json")),
            ColumnDefaults::default(),
            chrono_tz::Europe::Istanbul,
        );
        let date = NaiveDate::from_ymd_opt(2024, 12, 1).unwrap();
        let mut input = RowInput::new("Kabataş", date);
        input.tmin_c = 40.0;
        assert!(matches!(
            service.forecast(&input).await,
            Err(RailcastError::Validation { .. })
        ));

        input.tmin_c = 5.0;
        assert!(matches!(
            service.forecast(&input).await,
            Err(RailcastError::ArtifactNotFound { .. })
        ));
    }

    #[test]
    fn test_assemble_defaults_date_to_today() {
        let service = service(json!({"rf_pipe": weekend_split_forest(), "cat_pipe": flat_booster(1.0)}));
        let mut input = RowInput::new("Kabataş", NaiveDate::MIN);
        input.date = None;
        let assembled = service.assemble(&input).unwrap();
        assert_eq!(assembled.calendar.date, service.today());
    }
}
