use crate::db::fetch_history;
use crate::errors::IngestError;
use crate::model::{ErrorBody, HistoryQuery, HistoryResponse};
use crate::pipeline::Pipeline;
use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use sqlx::SqlitePool;
use tracing::{debug, error};
use wire::{SensorKind, TelemetryRecord, UnknownKind};

#[derive(Debug, Clone)]
struct AppState {
    pipeline: Pipeline,
    pool: Option<SqlitePool>,
}

pub fn create_router(pipeline: Pipeline, pool: Option<SqlitePool>) -> Router {
    let state = AppState { pipeline, pool };

    Router::new()
        .route("/", get(root))
        .route(SensorKind::Thermal.route(), post(ingest_dht22))
        .route(SensorKind::AirQuality.route(), post(ingest_ens160))
        .route("/sensor/dht22", get(latest_dht22))
        .route("/sensor/ens160", get(latest_ens160))
        .route("/api/v1/history", get(get_history))
        .with_state(state)
}

async fn root() -> &'static str {
    "collector is up and running"
}

async fn ingest_dht22(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Result<Json<TelemetryRecord>, AppError> {
    ingest(&state, SensorKind::Thermal, &headers, &body)
}

async fn ingest_ens160(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Result<Json<TelemetryRecord>, AppError> {
    ingest(&state, SensorKind::AirQuality, &headers, &body)
}

fn ingest(
    state: &AppState,
    kind: SensorKind,
    headers: &HeaderMap,
    body: &str,
) -> Result<Json<TelemetryRecord>, AppError> {
    let device = headers
        .get("x-device-id")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown");
    debug!("{} payload from {}: {:?}", kind, device, body);

    let record = state.pipeline.ingest(kind, body)?;
    Ok(Json(record))
}

async fn latest_dht22(State(state): State<AppState>) -> Result<Json<TelemetryRecord>, AppError> {
    latest(&state, SensorKind::Thermal)
}

async fn latest_ens160(State(state): State<AppState>) -> Result<Json<TelemetryRecord>, AppError> {
    latest(&state, SensorKind::AirQuality)
}

fn latest(state: &AppState, kind: SensorKind) -> Result<Json<TelemetryRecord>, AppError> {
    state
        .pipeline
        .latest(kind)
        .map(|record| Json(TelemetryRecord::clone(&record)))
        .ok_or_else(|| AppError::NotFound(format!("no {} reading received yet", kind)))
}

async fn get_history(
    State(state): State<AppState>,
    Query(params): Query<HistoryQuery>,
) -> Result<Json<HistoryResponse>, AppError> {
    let pool = state
        .pool
        .as_ref()
        .ok_or_else(|| AppError::Unavailable("history is not enabled".to_string()))?;

    let kind = params
        .kind
        .as_deref()
        .map(str::parse::<SensorKind>)
        .transpose()?;
    let limit = params.limit.unwrap_or(100).min(1000);
    let data = fetch_history(pool, kind, limit)
        .await
        .map_err(|e| AppError::Internal(anyhow::anyhow!("History query failed: {}", e)))?;

    Ok(Json(HistoryResponse {
        total: data.len(),
        data,
        limit,
    }))
}

#[derive(Debug)]
enum AppError {
    BadRequest(String),
    NotFound(String),
    Unavailable(String),
    Internal(anyhow::Error),
}

impl From<IngestError> for AppError {
    fn from(err: IngestError) -> Self {
        AppError::BadRequest(err.to_string())
    }
}

impl From<UnknownKind> for AppError {
    fn from(err: UnknownKind) -> Self {
        AppError::BadRequest(err.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            AppError::NotFound(message) => (StatusCode::NOT_FOUND, message),
            AppError::Unavailable(message) => (StatusCode::SERVICE_UNAVAILABLE, message),
            AppError::Internal(e) => {
                error!("API error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("Internal server error: {}", e),
                )
            }
        };

        (status, Json(ErrorBody { error: message })).into_response()
    }
}
