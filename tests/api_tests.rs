//! Integration tests for the forecast service and the HTTP API

use std::path::PathBuf;
use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::NaiveDate;
use http_body_util::BodyExt;
use railcast::api::AppState;
use railcast::artifact::ArtifactHandle;
use railcast::config::ServerConfig;
use railcast::features::{ColumnDefaults, RowInput};
use railcast::{ForecastService, web};
use rstest::rstest;
use serde_json::{Value, json};
use tower::ServiceExt;

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

fn service(artifact: &str) -> ForecastService {
    ForecastService::new(
        Arc::new(ArtifactHandle::new(fixture(artifact))),
        ColumnDefaults::default(),
        chrono_tz::Europe::Istanbul,
    )
}

fn app(artifact: &str) -> Router {
    let state = Arc::new(AppState {
        service: service(artifact),
    });
    web::app(state, &ServerConfig::default())
}

fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(body).unwrap()))
        .unwrap()
}

// forest: mean(weekday 12000 | weekend 7000, beyoglu 14000 | other 8000)
// boosted: 5000 + (beyoglu 4000 | other 1000) + (tmax < 15 ? 500 : -500)
#[rstest]
#[case::weekday_beyoglu("Kabataş", ymd(2024, 12, 3), 13000.0, 9500.0)]
#[case::weekend_beyoglu("Kabataş", ymd(2024, 12, 1), 10500.0, 9500.0)]
#[case::weekday_fatih("Yenikapı Güney", ymd(2024, 12, 3), 10000.0, 6500.0)]
#[tokio::test]
async fn test_forecast_with_named_pipelines(
    #[case] station: &str,
    #[case] date: NaiveDate,
    #[case] forest: f64,
    #[case] boosted: f64,
) {
    let mut input = RowInput::new(station, date);
    input.tmax_c = 12.0;
    input.tmin_c = 6.0;

    let forecast = service("named_pipelines.json").forecast(&input).await.unwrap();
    assert_eq!(forecast.prediction.forest, forest);
    assert_eq!(forecast.prediction.boosted, boosted);
    assert!((forecast.prediction.value - (0.7 * forest + 0.3 * boosted)).abs() < 1e-6);
    assert!(forecast.filled_columns.is_empty());
    assert_eq!(
        forecast.placeholders,
        vec!["wind10m_mean_kmh", "cloud_cover_mean_pct"]
    );
}

#[tokio::test]
async fn test_forecast_is_repeatable() {
    let service = service("named_pipelines.json");
    let input = RowInput::new("Kabataş", ymd(2024, 11, 12));
    let first = service.forecast(&input).await.unwrap();
    let second = service.forecast(&input).await.unwrap();
    assert_eq!(first.prediction, second.prediction);
    assert_eq!(first.row, second.row);
    assert!(!first.calendar.is_school_day);
}

#[tokio::test]
async fn test_health_reports_artifact_state() {
    let (status, body) = send(app("canonical.json"), get("/api/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["artifact_loaded"], false);
}

#[tokio::test]
async fn test_stations_filter() {
    let (status, body) = send(app("canonical.json"), get("/api/stations?filter=kabatas")).await;
    assert_eq!(status, StatusCode::OK);
    let labels: Vec<&str> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["label"].as_str().unwrap())
        .collect();
    assert_eq!(
        labels,
        vec!["KABATAS — Beyoğlu", "Kabataş — Beyoğlu", "Kabataş 2 — Beyoğlu"]
    );
    assert_eq!(body[0]["district_norm"], "beyoglu");
}

#[tokio::test]
async fn test_calendar_endpoint() {
    let (status, body) = send(app("canonical.json"), get("/api/calendar/2024-12-01")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["is_weekend"], true);
    assert_eq!(body["is_school_day"], false);
    assert_eq!(body["weekday_num"], 6);

    let (status, body) = send(app("canonical.json"), get("/api/calendar/2024-02-30")).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "VALIDATION");
}

#[tokio::test]
async fn test_artifact_composition() {
    let (status, body) = send(app("named_pipelines.json"), get("/api/artifact")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["shape"], "named_pipelines");
    assert_eq!(body["weight"], 0.7);
    assert_eq!(body["forest"]["source"], "rf_pipe");
    assert_eq!(body["preprocessor"], Value::Null);
}

#[tokio::test]
async fn test_predict_endpoint() {
    let request = post_json(
        "/api/predict",
        &json!({"station": "Kabataş", "date": "2024-12-03", "tmax_c": 12.0, "tmin_c": 6.0}),
    );
    let (status, body) = send(app("named_pipelines.json"), request).await;
    assert_eq!(status, StatusCode::OK);
    let value = body["prediction"]["value"].as_f64().unwrap();
    assert!((value - 11950.0).abs() < 1e-6);
    assert_eq!(body["row"]["district_norm"], "beyoglu");
    assert_eq!(body["calendar"]["is_school_day"], true);
}

#[tokio::test]
async fn test_predict_rejects_bad_input() {
    let request = post_json(
        "/api/predict",
        &json!({"station": "Atlantis", "date": "2024-12-03"}),
    );
    let (status, body) = send(app("named_pipelines.json"), request).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "VALIDATION");
    assert!(body["message"].as_str().unwrap().contains("Atlantis"));

    let request = post_json(
        "/api/predict",
        &json!({"station": "Kabataş", "date": "2024-12-03", "tmax_c": 5.0, "tmin_c": 9.0}),
    );
    let (status, _) = send(app("named_pipelines.json"), request).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_unusable_artifact_is_service_unavailable() {
    let (status, body) = send(app("missing.json"), get("/api/artifact")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["code"], "ARTIFACT_NOT_FOUND");

    let request = post_json("/api/predict", &json!({"station": "Kabataş"}));
    let (status, body) = send(app("no_models.json"), request).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["code"], "COMPONENT_NOT_FOUND");
}
