// HTTP request handlers for stored plots
use crate::application::plot_repository::{DatabaseStats, PlotSummary, QueryResult, StoredPlot};
use crate::application::plot_service::PlotReport;
use crate::infrastructure::chunked_body::stream_from_receiver;
use crate::infrastructure::http_response::{accepts_brotli, download_response, CSV_CONTENT_TYPE};
use crate::presentation::app_state::AppState;
use crate::presentation::error::ApiError;
use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{HeaderMap, Response, StatusCode},
    Json,
};
use serde::Deserialize;
use std::sync::Arc;

#[derive(Deserialize)]
pub struct SearchQuery {
    pub search: Option<String>,
}

#[derive(Deserialize)]
pub struct SqlRequest {
    pub sql: String,
}

/// Health check endpoint
pub async fn health_check() -> &'static str {
    "ok"
}

pub async fn list_plots(
    Query(query): Query<SearchQuery>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<PlotSummary>>, ApiError> {
    let plots = state.plot_service.list_plots(query.search.as_deref()).await?;
    Ok(Json(plots))
}

pub async fn get_plot(
    Path(id): Path<i64>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<StoredPlot>, ApiError> {
    match state.plot_service.get_plot(id).await? {
        Some(plot) => Ok(Json(plot)),
        None => Err(ApiError::not_found("plot")),
    }
}

pub async fn delete_plot(
    Path(id): Path<i64>,
    State(state): State<Arc<AppState>>,
) -> Result<StatusCode, ApiError> {
    if state.plot_service.delete_plot(id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::not_found("plot"))
    }
}

pub async fn plot_summary(
    Path(id): Path<i64>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<PlotReport>, ApiError> {
    match state.plot_service.plot_report(id).await? {
        Some(report) => Ok(Json(report)),
        None => Err(ApiError::not_found("plot")),
    }
}

pub async fn export_plot(
    Path(id): Path<i64>,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> Result<Response<Body>, ApiError> {
    let Some((filename, bytes)) = state.plot_service.export_plot_csv(id).await? else {
        return Err(ApiError::not_found("plot"));
    };
    Ok(download_response(bytes, CSV_CONTENT_TYPE, &filename, accepts_brotli(&headers)).await?)
}

/// Every stored plot as one CSV, streamed plot by plot
pub async fn export_all(State(state): State<Arc<AppState>>) -> Result<Response<Body>, ApiError> {
    let rx = state.plot_service.stream_all_csv().await?;
    Ok(stream_from_receiver(rx, CSV_CONTENT_TYPE, "all_plots_data.csv"))
}

pub async fn database_stats(
    State(state): State<Arc<AppState>>,
) -> Result<Json<DatabaseStats>, ApiError> {
    Ok(Json(state.plot_service.stats().await?))
}

pub async fn run_query(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SqlRequest>,
) -> Result<Json<QueryResult>, ApiError> {
    Ok(Json(state.plot_service.run_query(&request.sql).await?))
}
