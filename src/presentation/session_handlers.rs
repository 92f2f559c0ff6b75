// HTTP request handlers for the active digitisation session
use crate::application::digitisation_service::{
    AcceptOutcome, ClickOutcome, SaveOutcome, SessionStatus, StartSession,
};
use crate::domain::calibration::{AxisCalibrationInput, PixelPoint};
use crate::domain::gate::ValidationView;
use crate::infrastructure::http_response::{accepts_brotli, download_response, CSV_CONTENT_TYPE};
use crate::presentation::app_state::AppState;
use crate::presentation::error::ApiError;
use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, Response, StatusCode},
    Json,
};
use serde::Deserialize;
use std::sync::Arc;

#[derive(Deserialize)]
pub struct NameRequest {
    pub name: String,
}

#[derive(Deserialize)]
pub struct ClicksRequest {
    pub points: Vec<PixelPoint>,
}

type StatusResult = Result<Json<SessionStatus>, ApiError>;

pub async fn start_session(
    State(state): State<Arc<AppState>>,
    Json(request): Json<StartSession>,
) -> Result<(StatusCode, Json<SessionStatus>), ApiError> {
    let status = state.digitisation_service.start(request).await?;
    Ok((StatusCode::CREATED, Json(status)))
}

pub async fn session_status(State(state): State<Arc<AppState>>) -> StatusResult {
    Ok(Json(state.digitisation_service.status().await?))
}

pub async fn abandon_session(State(state): State<Arc<AppState>>) -> Result<StatusCode, ApiError> {
    if state.digitisation_service.abandon().await {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::not_found("session"))
    }
}

pub async fn calibrate(
    State(state): State<Arc<AppState>>,
    Json(input): Json<AxisCalibrationInput>,
) -> StatusResult {
    Ok(Json(state.digitisation_service.calibrate(input).await?))
}

pub async fn recalibrate(State(state): State<Arc<AppState>>) -> StatusResult {
    Ok(Json(state.digitisation_service.recalibrate().await?))
}

pub async fn enter_name(
    State(state): State<Arc<AppState>>,
    Json(request): Json<NameRequest>,
) -> StatusResult {
    Ok(Json(state.digitisation_service.enter_name(&request.name).await?))
}

pub async fn record_clicks(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ClicksRequest>,
) -> Result<Json<ClickOutcome>, ApiError> {
    Ok(Json(state.digitisation_service.record_clicks(&request.points).await?))
}

pub async fn clear_points(State(state): State<Arc<AppState>>) -> StatusResult {
    Ok(Json(state.digitisation_service.clear_points().await?))
}

pub async fn back_to_name(State(state): State<Arc<AppState>>) -> StatusResult {
    Ok(Json(state.digitisation_service.back_to_name().await?))
}

pub async fn begin_validation(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ValidationView>, ApiError> {
    Ok(Json(state.digitisation_service.begin_validation().await?))
}

pub async fn validation_view(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ValidationView>, ApiError> {
    Ok(Json(state.digitisation_service.validation_view().await?))
}

pub async fn reject(State(state): State<Arc<AppState>>) -> StatusResult {
    Ok(Json(state.digitisation_service.reject().await?))
}

pub async fn back(State(state): State<Arc<AppState>>) -> StatusResult {
    Ok(Json(state.digitisation_service.back().await?))
}

pub async fn accept(State(state): State<Arc<AppState>>) -> Result<Json<AcceptOutcome>, ApiError> {
    Ok(Json(state.digitisation_service.accept().await?))
}

pub async fn previous_dataset(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ValidationView>, ApiError> {
    Ok(Json(state.digitisation_service.previous_dataset().await?))
}

pub async fn save(State(state): State<Arc<AppState>>) -> Result<Json<SaveOutcome>, ApiError> {
    Ok(Json(state.digitisation_service.save().await?))
}

pub async fn export_session(
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> Result<Response<Body>, ApiError> {
    let (filename, bytes) = state.digitisation_service.export_csv().await?;
    Ok(download_response(bytes, CSV_CONTENT_TYPE, &filename, accepts_brotli(&headers)).await?)
}
