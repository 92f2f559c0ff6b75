// Repository trait for digitised plot storage
use crate::domain::data_point::Dataset;
use crate::domain::plot::PlotSession;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PersistenceError {
    #[error("plot {0} is already stored")]
    Duplicate(String),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("storage task failed: {0}")]
    Task(String),
}

/// Everything written by one atomic save
#[derive(Debug, Clone, PartialEq)]
pub struct NewPlot {
    pub doi: String,
    pub figure_number: String,
    pub plot_identifier: String,
    pub image_reference: Option<String>,
    pub x_axis_range: String,
    pub y_axis_range: String,
    pub datasets: Vec<Dataset>,
}

impl From<&PlotSession> for NewPlot {
    fn from(session: &PlotSession) -> Self {
        Self {
            doi: session.metadata.doi.clone(),
            figure_number: session.metadata.figure_number.clone(),
            plot_identifier: session.metadata.plot_identifier.clone(),
            image_reference: session.metadata.image_reference.clone(),
            x_axis_range: session.calibration.x_axis_range(),
            y_axis_range: session.calibration.y_axis_range(),
            datasets: session.datasets.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlotSummary {
    pub id: i64,
    pub doi: String,
    pub figure_number: String,
    pub plot_identifier: String,
    pub x_axis_range: Option<String>,
    pub y_axis_range: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub dataset_count: i64,
    pub total_points: i64,
}

impl PlotSummary {
    /// Case-insensitive substring match on DOI, figure number or identifier
    pub fn matches(&self, search: &str) -> bool {
        let needle = search.to_lowercase();
        self.doi.to_lowercase().contains(&needle)
            || self.figure_number.to_lowercase().contains(&needle)
            || self.plot_identifier.to_lowercase().contains(&needle)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredPlot {
    pub id: i64,
    pub doi: String,
    pub figure_number: String,
    pub plot_identifier: String,
    pub image_reference: Option<String>,
    pub x_axis_range: Option<String>,
    pub y_axis_range: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    /// Datasets in insertion order, points in insertion order within each
    pub datasets: Vec<Dataset>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DatabaseStats {
    pub plots: i64,
    pub datasets: i64,
    pub data_points: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<serde_json::Value>>,
    pub row_count: usize,
    /// More rows were available than `max_rows`
    pub truncated: bool,
}

#[async_trait]
pub trait PlotRepository: Send + Sync {
    /// Create tables and indexes if they do not exist yet
    async fn initialise(&self) -> Result<(), PersistenceError>;

    /// True when the figure is stored, or another stored figure derives the same identifier
    async fn plot_exists(&self, doi: &str, figure_number: &str) -> Result<bool, PersistenceError>;

    /// Store the plot, its datasets and all points in one transaction.
    /// On error nothing is written.
    async fn save_plot(&self, plot: NewPlot) -> Result<i64, PersistenceError>;

    /// All plots, newest first
    async fn list_plots(&self) -> Result<Vec<PlotSummary>, PersistenceError>;

    async fn get_plot(&self, id: i64) -> Result<Option<StoredPlot>, PersistenceError>;

    /// Removes the plot with its datasets and points; `false` if it did not exist
    async fn delete_plot(&self, id: i64) -> Result<bool, PersistenceError>;

    async fn database_stats(&self) -> Result<DatabaseStats, PersistenceError>;

    /// Run an already sanitised read-only statement, returning at most `max_rows` rows
    /// whatever its own LIMIT says
    async fn run_read_only(&self, sql: &str, max_rows: u64) -> Result<QueryResult, PersistenceError>;
}
