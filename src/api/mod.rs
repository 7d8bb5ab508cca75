use std::sync::Arc;

use axum::{
    Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use crate::artifact::Composition;
use crate::calendar::{self, CalendarFeatures};
use crate::error::{ErrorContext, RailcastError};
use crate::features::RowInput;
use crate::forecast::{ForecastService, RidershipForecast};
use crate::stations::Station;

pub struct AppState {
    pub service: ForecastService,
}

#[derive(Serialize, Deserialize)]
pub struct ApiStation {
    pub label: String,
    pub name: String,
    pub district: String,
    pub district_norm: String,
}

impl From<&Station> for ApiStation {
    fn from(station: &Station) -> Self {
        Self {
            label: station.label(),
            name: station.name.clone(),
            district: station.district.clone(),
            district_norm: station.district_norm.clone(),
        }
    }
}

#[derive(Serialize, Deserialize)]
pub struct ApiHealth {
    pub status: String,
    pub version: String,
    pub artifact_path: String,
    pub artifact_loaded: bool,
}

#[derive(Serialize, Deserialize)]
pub struct ApiErrorBody {
    pub code: String,
    pub message: String,
    pub detail: String,
    #[serde(default, skip_serializing_if = "ErrorContext::is_empty")]
    pub context: ErrorContext,
}

#[derive(Deserialize)]
pub struct StationQuery {
    #[serde(default)]
    pub filter: Option<String>,
}

/// Domain error rendered as an HTTP response
pub struct ApiError(pub RailcastError);

impl From<RailcastError> for ApiError {
    fn from(err: RailcastError) -> Self {
        Self(err)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            RailcastError::Validation { .. }
            | RailcastError::FeatureMismatch { .. }
            | RailcastError::PredictionRuntime { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            err if err.is_artifact_error() => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(code = %self.0.code(), error = %self.0, "Request failed");
        } else {
            warn!(code = %self.0.code(), error = %self.0, "Request rejected");
        }
        let body = ApiErrorBody {
            code: self.0.code().to_string(),
            message: self.0.user_message(),
            detail: self.0.to_string(),
            context: self.0.context().cloned().unwrap_or_default(),
        };
        (status, Json(body)).into_response()
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(get_health))
        .route("/stations", get(get_stations))
        .route("/calendar/{date}", get(get_calendar))
        .route("/artifact", get(get_artifact))
        .route("/predict", post(post_predict))
        .with_state(state)
}

async fn get_health(State(state): State<Arc<AppState>>) -> Json<ApiHealth> {
    let handle = state.service.handle();
    Json(ApiHealth {
        status: "ok".to_string(),
        version: crate::VERSION.to_string(),
        artifact_path: handle.path().display().to_string(),
        artifact_loaded: handle.is_loaded(),
    })
}

async fn get_stations(
    State(state): State<Arc<AppState>>,
    Query(query): Query<StationQuery>,
) -> Json<Vec<ApiStation>> {
    let filter = query.filter.unwrap_or_default();
    let stations = state
        .service
        .catalog()
        .search(&filter)
        .into_iter()
        .map(ApiStation::from)
        .collect();
    Json(stations)
}

async fn get_calendar(Path(date): Path<String>) -> Result<Json<CalendarFeatures>, ApiError> {
    let date = NaiveDate::parse_from_str(&date, "%Y-%m-%d").map_err(|_| {
        RailcastError::validation(format!("'{date}' is not a date in YYYY-MM-DD form"))
    })?;
    Ok(Json(calendar::derive(date)))
}

async fn get_artifact(State(state): State<Arc<AppState>>) -> Result<Json<Composition>, ApiError> {
    let bundle = state.service.handle().get().await?;
    Ok(Json(bundle.composition()))
}

async fn post_predict(
    State(state): State<Arc<AppState>>,
    Json(input): Json<RowInput>,
) -> Result<Json<RidershipForecast>, ApiError> {
    let forecast = state.service.forecast(&input).await?;
    Ok(Json(forecast))
}
