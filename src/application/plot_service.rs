// Plot service - Browsing, exporting and querying stored plots
use crate::application::plot_repository::{
    DatabaseStats, PersistenceError, PlotRepository, PlotSummary, QueryResult, StoredPlot,
};
use crate::domain::aggregator::{aggregate, summarize, DatasetSummary};
use crate::domain::query_guard::{sanitize_query, QuerySecurityError};
use crate::infrastructure::csv_export::{bulk_header, plot_to_bulk_rows, points_to_csv};
use bytes::Bytes;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Debug, Error)]
pub enum PlotServiceError {
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
    #[error("export failed: {0}")]
    Export(String),
}

#[derive(Debug, Error)]
pub enum QueryError {
    #[error(transparent)]
    Security(#[from] QuerySecurityError),
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

/// Per-dataset validation metrics for one stored plot
#[derive(Debug, Clone, Serialize)]
pub struct PlotReport {
    pub id: i64,
    pub plot_identifier: String,
    pub x_axis_range: Option<String>,
    pub y_axis_range: Option<String>,
    pub total_points: usize,
    pub datasets: Vec<DatasetSummary>,
}

#[derive(Clone)]
pub struct PlotService {
    repository: Arc<dyn PlotRepository>,
    max_query_rows: u64,
}

impl PlotService {
    pub fn new(repository: Arc<dyn PlotRepository>, max_query_rows: u64) -> Self {
        Self {
            repository,
            max_query_rows,
        }
    }

    /// Stored plots, newest first, optionally filtered by a case-insensitive search term
    pub async fn list_plots(&self, search: Option<&str>) -> Result<Vec<PlotSummary>, PersistenceError> {
        let plots = self.repository.list_plots().await?;
        Ok(match search.map(str::trim).filter(|s| !s.is_empty()) {
            Some(term) => plots.into_iter().filter(|p| p.matches(term)).collect(),
            None => plots,
        })
    }

    pub async fn get_plot(&self, id: i64) -> Result<Option<StoredPlot>, PersistenceError> {
        self.repository.get_plot(id).await
    }

    pub async fn delete_plot(&self, id: i64) -> Result<bool, PersistenceError> {
        let deleted = self.repository.delete_plot(id).await?;
        if deleted {
            tracing::info!("Deleted plot {}", id);
        }
        Ok(deleted)
    }

    pub async fn plot_report(&self, id: i64) -> Result<Option<PlotReport>, PersistenceError> {
        let Some(plot) = self.repository.get_plot(id).await? else {
            return Ok(None);
        };
        // Datasets accepted without points still get a row
        let datasets = plot
            .datasets
            .iter()
            .map(|d| {
                summarize(&d.points)
                    .pop()
                    .unwrap_or_else(|| DatasetSummary::empty(&d.name))
            })
            .collect();

        Ok(Some(PlotReport {
            id: plot.id,
            total_points: plot.datasets.iter().map(|d| d.points.len()).sum(),
            plot_identifier: plot.plot_identifier,
            x_axis_range: plot.x_axis_range,
            y_axis_range: plot.y_axis_range,
            datasets,
        }))
    }

    /// CSV of one stored plot with its download filename
    pub async fn export_plot_csv(&self, id: i64) -> Result<Option<(String, Vec<u8>)>, PlotServiceError> {
        let Some(plot) = self.repository.get_plot(id).await? else {
            return Ok(None);
        };
        let bytes = points_to_csv(&aggregate(&plot.datasets))
            .map_err(|e| PlotServiceError::Export(e.to_string()))?;
        Ok(Some((format!("{}_complete_data.csv", plot.plot_identifier), bytes)))
    }

    /// Streams every stored plot as CSV, one chunk per plot.
    ///
    /// The plot list and header are produced before returning so those failures
    /// surface as errors; a later failure ends the stream with an `Err` item.
    pub async fn stream_all_csv(
        &self,
    ) -> Result<mpsc::Receiver<std::io::Result<Bytes>>, PlotServiceError> {
        let plots = self.repository.list_plots().await?;
        let header = bulk_header().map_err(|e| PlotServiceError::Export(e.to_string()))?;

        let (tx, rx) = mpsc::channel(16);
        let repository = self.repository.clone();

        tokio::spawn(async move {
            let start_time = Instant::now();

            if tx.send(Ok(Bytes::from(header))).await.is_err() {
                return;
            }

            let mut exported = 0;
            // Oldest first so the file reads in digitisation order
            for summary in plots.iter().rev() {
                let rows = match repository.get_plot(summary.id).await {
                    // Deleted while exporting
                    Ok(None) => continue,
                    Ok(Some(plot)) => plot_to_bulk_rows(&plot).map_err(|e| e.to_string()),
                    Err(e) => Err(e.to_string()),
                };
                let chunk = match rows {
                    Ok(chunk) => Ok(Bytes::from(chunk)),
                    Err(e) => {
                        let message = format!("Bulk export of plot {} failed: {}", summary.id, e);
                        tracing::error!("{}", message);
                        let _ = tx.send(Err(std::io::Error::other(message))).await;
                        return;
                    }
                };
                if tx.send(chunk).await.is_err() {
                    tracing::debug!("Bulk export client disconnected");
                    return;
                }
                exported += 1;
            }

            tracing::info!(
                "Bulk export of {} plots finished in {:?}",
                exported,
                start_time.elapsed()
            );
        });

        Ok(rx)
    }

    pub async fn stats(&self) -> Result<DatabaseStats, PersistenceError> {
        self.repository.database_stats().await
    }

    /// Runs a caller-supplied statement after the read-only guard accepts it
    pub async fn run_query(&self, sql: &str) -> Result<QueryResult, QueryError> {
        let sanitized = sanitize_query(sql, self.max_query_rows).map_err(|e| {
            tracing::warn!("Rejected query: {}", e);
            e
        })?;
        tracing::debug!("Running query: {}", sanitized);
        Ok(self
            .repository
            .run_read_only(&sanitized, self.max_query_rows)
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::plot_repository::NewPlot;
    use crate::domain::data_point::{DataPoint, Dataset};
    use crate::infrastructure::sqlite_repository::SqliteRepository;
    use tempfile::TempDir;

    fn new_plot(doi: &str, figure: &str) -> NewPlot {
        let identifier = crate::domain::plot::derive_plot_identifier(doi, figure);
        NewPlot {
            doi: doi.to_string(),
            figure_number: figure.to_string(),
            plot_identifier: identifier,
            image_reference: None,
            x_axis_range: "0 to 100".to_string(),
            y_axis_range: "0 to 50".to_string(),
            datasets: vec![
                Dataset::new(
                    "Berea".to_string(),
                    vec![
                        DataPoint::new("Berea".to_string(), 60.0, 150.0, 50.0, 25.0),
                        DataPoint::new("Berea".to_string(), 20.0, 180.0, 10.0, 10.0),
                    ],
                ),
                Dataset::new("Empty".to_string(), Vec::new()),
            ],
        }
    }

    async fn service_with_plots(dir: &TempDir) -> (PlotService, Vec<i64>) {
        let repository = SqliteRepository::open(&dir.path().join("plots.db")).unwrap();
        repository.initialise().await.unwrap();
        let first = repository.save_plot(new_plot("10.1000/alpha", "1")).await.unwrap();
        let second = repository.save_plot(new_plot("10.2000/beta", "2b")).await.unwrap();
        (PlotService::new(Arc::new(repository), 50), vec![first, second])
    }

    #[tokio::test]
    async fn test_search_filters_plots() {
        let dir = TempDir::new().unwrap();
        let (service, _) = service_with_plots(&dir).await;

        assert_eq!(service.list_plots(None).await.unwrap().len(), 2);
        assert_eq!(service.list_plots(Some("  ")).await.unwrap().len(), 2);

        let found = service.list_plots(Some("BETA")).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].plot_identifier, "10_2000_beta_Fig2b");
    }

    #[tokio::test]
    async fn test_plot_report_includes_empty_datasets() {
        let dir = TempDir::new().unwrap();
        let (service, ids) = service_with_plots(&dir).await;

        let report = service.plot_report(ids[0]).await.unwrap().unwrap();
        assert_eq!(report.total_points, 2);
        assert_eq!(report.datasets.len(), 2);
        assert_eq!(report.datasets[0].name, "Berea");
        assert_eq!(report.datasets[0].point_count, 2);
        assert_eq!(report.datasets[1].name, "Empty");
        assert_eq!(report.datasets[1].point_count, 0);

        assert!(service.plot_report(9999).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_export_plot_csv() {
        let dir = TempDir::new().unwrap();
        let (service, ids) = service_with_plots(&dir).await;

        let (filename, bytes) = service.export_plot_csv(ids[0]).await.unwrap().unwrap();
        assert_eq!(filename, "10_1000_alpha_Fig1_complete_data.csv");
        let text = String::from_utf8(bytes).unwrap();
        assert_eq!(text.lines().count(), 3);
        assert!(text.contains("Berea,60.0000,150.0000,50.0000,25.0000"));
    }

    #[tokio::test]
    async fn test_stream_all_csv_in_save_order() {
        let dir = TempDir::new().unwrap();
        let (service, _) = service_with_plots(&dir).await;

        let mut rx = service.stream_all_csv().await.unwrap();
        let mut body = Vec::new();
        while let Some(chunk) = rx.recv().await {
            body.extend_from_slice(&chunk.unwrap());
        }
        let text = String::from_utf8(body).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines[0],
            "doi,figure_number,plot_identifier,dataset,x_pixel,y_pixel,P(MPa),Q(MPa)"
        );
        assert_eq!(lines.len(), 5);
        assert!(lines[1].starts_with("10.1000/alpha,1,"));
        assert!(lines[4].starts_with("10.2000/beta,2b,"));
    }

    #[tokio::test]
    async fn test_run_query_guards_and_limits() {
        let dir = TempDir::new().unwrap();
        let (service, _) = service_with_plots(&dir).await;

        let result = service
            .run_query("SELECT name FROM sandstones ORDER BY id;")
            .await
            .unwrap();
        assert_eq!(result.columns, vec!["name".to_string()]);
        assert_eq!(result.row_count, 4);

        let err = service.run_query("DELETE FROM plots").await.unwrap_err();
        assert!(matches!(err, QueryError::Security(_)));
        assert_eq!(service.stats().await.unwrap().plots, 2);

        let limited = PlotService::new(service.repository.clone(), 1);
        let result = limited.run_query("SELECT id FROM plots").await.unwrap();
        assert_eq!(result.row_count, 1);
    }

    #[tokio::test]
    async fn test_run_query_row_cap_holds_for_any_limit_clause() {
        let dir = TempDir::new().unwrap();
        let (service, _) = service_with_plots(&dir).await;
        let limited = PlotService::new(service.repository.clone(), 3);

        for sql in [
            "SELECT id FROM data_points LIMIT -1",
            "SELECT id FROM data_points LIMIT 0, 1000",
            "SELECT id, 'no limit' FROM data_points",
            "SELECT id FROM (SELECT id FROM data_points LIMIT 2) UNION ALL SELECT id FROM data_points",
        ] {
            let result = limited.run_query(sql).await.unwrap();
            assert_eq!(result.row_count, 3, "{}", sql);
            assert!(result.truncated, "{}", sql);
        }
    }

    /// Lists plots from SQLite but fails every other read
    struct FailingReads {
        inner: SqliteRepository,
        fail_list: bool,
    }

    #[async_trait::async_trait]
    impl PlotRepository for FailingReads {
        async fn initialise(&self) -> Result<(), PersistenceError> {
            self.inner.initialise().await
        }

        async fn plot_exists(&self, doi: &str, figure_number: &str) -> Result<bool, PersistenceError> {
            self.inner.plot_exists(doi, figure_number).await
        }

        async fn save_plot(&self, plot: NewPlot) -> Result<i64, PersistenceError> {
            self.inner.save_plot(plot).await
        }

        async fn list_plots(&self) -> Result<Vec<PlotSummary>, PersistenceError> {
            if self.fail_list {
                return Err(PersistenceError::Storage("disk I/O error".to_string()));
            }
            self.inner.list_plots().await
        }

        async fn get_plot(&self, _id: i64) -> Result<Option<StoredPlot>, PersistenceError> {
            Err(PersistenceError::Storage("disk I/O error".to_string()))
        }

        async fn delete_plot(&self, id: i64) -> Result<bool, PersistenceError> {
            self.inner.delete_plot(id).await
        }

        async fn database_stats(&self) -> Result<DatabaseStats, PersistenceError> {
            self.inner.database_stats().await
        }

        async fn run_read_only(&self, sql: &str, max_rows: u64) -> Result<QueryResult, PersistenceError> {
            self.inner.run_read_only(sql, max_rows).await
        }
    }

    async fn failing_service(dir: &TempDir, fail_list: bool) -> PlotService {
        let inner = SqliteRepository::open(&dir.path().join("plots.db")).unwrap();
        inner.initialise().await.unwrap();
        inner.save_plot(new_plot("10.1000/alpha", "1")).await.unwrap();
        PlotService::new(Arc::new(FailingReads { inner, fail_list }), 50)
    }

    #[tokio::test]
    async fn test_stream_all_csv_listing_failure_is_an_error() {
        let dir = TempDir::new().unwrap();
        let service = failing_service(&dir, true).await;
        assert!(matches!(
            service.stream_all_csv().await.unwrap_err(),
            PlotServiceError::Persistence(_)
        ));
    }

    #[tokio::test]
    async fn test_stream_all_csv_ends_with_error_on_failed_plot() {
        let dir = TempDir::new().unwrap();
        let service = failing_service(&dir, false).await;

        let mut rx = service.stream_all_csv().await.unwrap();
        let mut items = Vec::new();
        while let Some(item) = rx.recv().await {
            items.push(item);
        }
        assert_eq!(items.len(), 2);
        assert!(items[0].is_ok());
        assert!(items[1].is_err());
    }

    #[tokio::test]
    async fn test_delete_plot() {
        let dir = TempDir::new().unwrap();
        let (service, ids) = service_with_plots(&dir).await;

        assert!(service.delete_plot(ids[0]).await.unwrap());
        assert!(!service.delete_plot(ids[0]).await.unwrap());
        let stats = service.stats().await.unwrap();
        assert_eq!(stats.plots, 1);
        assert_eq!(stats.datasets, 2);
        assert_eq!(stats.data_points, 2);
    }
}
