//! `railcast` - Daily ridership prediction for Istanbul rail stations
//!
//! This library derives calendar features for a date, resolves a persisted
//! forest + boosted model bundle, and blends both models into one ridership
//! estimate per station and day.

pub mod api;
pub mod artifact;
pub mod calendar;
pub mod config;
pub mod error;
pub mod features;
pub mod forecast;
pub mod logging;
pub mod model;
pub mod predictor;
pub mod stations;
pub mod web;

// Re-export core types for public API
pub use artifact::{ArtifactHandle, BundleShape, Composition, ResolvedBundle, resolve};
pub use calendar::CalendarFeatures;
pub use config::RailcastConfig;
pub use error::{ErrorCode, RailcastError};
pub use features::{FeatureRow, FeatureValue, RowInput};
pub use forecast::{ForecastService, RidershipForecast};
pub use predictor::{EnsemblePredictor, PredictionResult};
pub use stations::{Station, StationCatalog};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Core result type used throughout the library
pub type Result<T> = std::result::Result<T, RailcastError>;
