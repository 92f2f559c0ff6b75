// Main entry point - Dependency injection and server setup
mod domain;
mod application;
mod infrastructure;
mod presentation;

use std::{net::SocketAddr, path::Path, sync::Arc};
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use crate::application::digitisation_service::DigitisationService;
use crate::application::plot_repository::PlotRepository;
use crate::application::plot_service::PlotService;
use crate::infrastructure::config::load_app_config;
use crate::infrastructure::sqlite_repository::SqliteRepository;
use crate::presentation::app_state::AppState;
use crate::presentation::{handlers, session_handlers};

fn router(state: Arc<AppState>) -> Router {
    let session = Router::new()
        .route(
            "/",
            get(session_handlers::session_status)
                .post(session_handlers::start_session)
                .delete(session_handlers::abandon_session),
        )
        .route("/calibration", post(session_handlers::calibrate))
        .route("/recalibrate", post(session_handlers::recalibrate))
        .route("/dataset", post(session_handlers::enter_name))
        .route(
            "/clicks",
            post(session_handlers::record_clicks).delete(session_handlers::clear_points),
        )
        .route("/back-to-name", post(session_handlers::back_to_name))
        .route(
            "/validate",
            post(session_handlers::begin_validation).get(session_handlers::validation_view),
        )
        .route("/reject", post(session_handlers::reject))
        .route("/back", post(session_handlers::back))
        .route("/accept", post(session_handlers::accept))
        .route("/previous", post(session_handlers::previous_dataset))
        .route("/save", post(session_handlers::save))
        .route("/export.csv", get(session_handlers::export_session));

    // Downloads are compressed in the response builders, so no CompressionLayer here
    Router::new()
        .route("/healthz", get(handlers::health_check))
        .nest("/session", session)
        .route("/plots", get(handlers::list_plots))
        .route("/plots/:id", get(handlers::get_plot).delete(handlers::delete_plot))
        .route("/plots/:id/export.csv", get(handlers::export_plot))
        .route("/plots/:id/summary", get(handlers::plot_summary))
        .route("/export.csv", get(handlers::export_all))
        .route("/stats", get(handlers::database_stats))
        .route("/query", post(handlers::run_query))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("qp_digitiser=info,tower_http=info")),
        )
        .init();

    let config = load_app_config()?;

    // Create repository (infrastructure layer)
    let repository = Arc::new(SqliteRepository::open(Path::new(&config.database.path))?);
    repository.initialise().await?;

    // Create services (application layer)
    let digitisation_service =
        DigitisationService::new(repository.clone(), config.digitisation.gate_settings());
    let plot_service = PlotService::new(repository.clone(), config.query.max_rows);

    let state = Arc::new(AppState {
        digitisation_service,
        plot_service,
    });

    let addr: SocketAddr = config.server.bind_addr.parse()?;
    tracing::info!("Starting qp-digitiser service on {}", addr);

    axum::serve(tokio::net::TcpListener::bind(addr).await?, router(state)).await?;

    Ok(())
}
