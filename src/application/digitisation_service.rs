// Digitisation service - Use case for driving one plot through the validation gate
use crate::application::plot_repository::{NewPlot, PersistenceError, PlotRepository};
use crate::domain::aggregator::aggregate;
use crate::domain::calibration::{AxisCalibrationInput, CalibrationError, PixelPoint};
use crate::domain::gate::{
    GateError, GateSettings, GateState, GateStatus, ValidationError, ValidationGate, ValidationView,
};
use crate::domain::plot::{validate_doi, PlotMetadata};
use crate::infrastructure::csv_export::points_to_csv;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;

#[derive(Debug, Error)]
pub enum DigitisationError {
    #[error("no digitisation session is active")]
    NoSession,
    #[error("invalid DOI format: {0}")]
    InvalidDoi(String),
    #[error("figure number must not be empty")]
    MissingFigureNumber,
    #[error("plot already exists: {doi} Figure {figure_number}")]
    PlotAlreadyExists { doi: String, figure_number: String },
    #[error(transparent)]
    Calibration(#[from] CalibrationError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
    #[error("export failed: {0}")]
    Export(String),
}

impl From<GateError> for DigitisationError {
    fn from(e: GateError) -> Self {
        match e {
            GateError::Calibration(e) => DigitisationError::Calibration(e),
            GateError::Validation(e) => DigitisationError::Validation(e),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StartSession {
    pub doi: String,
    pub figure_number: String,
    pub dataset_count: usize,
    #[serde(default)]
    pub image_reference: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    #[serde(flatten)]
    pub gate: GateStatus,
    pub saved_plot_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClickOutcome {
    pub recorded: usize,
    pub discarded: usize,
    pub total: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SaveOutcome {
    pub plot_id: i64,
    pub plot_identifier: String,
    pub datasets: usize,
    pub points: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct AcceptOutcome {
    pub status: SessionStatus,
    pub saved: Option<SaveOutcome>,
}

#[derive(Debug)]
struct ActiveSession {
    gate: ValidationGate,
    saved_plot_id: Option<i64>,
}

impl ActiveSession {
    fn status(&self) -> SessionStatus {
        SessionStatus {
            gate: self.gate.status(),
            saved_plot_id: self.saved_plot_id,
        }
    }
}

/// Holds the single active digitisation session.
///
/// Nothing reaches the repository before the gate is complete; a failed save
/// keeps the completed session so it can be retried.
#[derive(Clone)]
pub struct DigitisationService {
    repository: Arc<dyn PlotRepository>,
    settings: GateSettings,
    session: Arc<Mutex<Option<ActiveSession>>>,
}

impl DigitisationService {
    pub fn new(repository: Arc<dyn PlotRepository>, settings: GateSettings) -> Self {
        Self {
            repository,
            settings,
            session: Arc::new(Mutex::new(None)),
        }
    }

    async fn with_session<T, E, F>(&self, f: F) -> Result<T, DigitisationError>
    where
        F: FnOnce(&mut ActiveSession) -> Result<T, E>,
        DigitisationError: From<E>,
    {
        let mut guard = self.session.lock().await;
        let active = guard.as_mut().ok_or(DigitisationError::NoSession)?;
        Ok(f(active)?)
    }

    /// Validate the plot identity and open a fresh session, replacing any previous one
    pub async fn start(&self, request: StartSession) -> Result<SessionStatus, DigitisationError> {
        if !validate_doi(&request.doi) {
            return Err(DigitisationError::InvalidDoi(request.doi));
        }
        if request.figure_number.trim().is_empty() {
            return Err(DigitisationError::MissingFigureNumber);
        }

        let metadata = PlotMetadata::new(&request.doi, &request.figure_number, request.image_reference);
        if self
            .repository
            .plot_exists(&metadata.doi, &metadata.figure_number)
            .await?
        {
            return Err(DigitisationError::PlotAlreadyExists {
                doi: metadata.doi,
                figure_number: metadata.figure_number,
            });
        }

        let gate = ValidationGate::new(metadata, request.dataset_count, self.settings)?;
        let active = ActiveSession {
            gate,
            saved_plot_id: None,
        };
        let status = active.status();

        let mut guard = self.session.lock().await;
        if let Some(previous) = guard.as_ref() {
            if previous.gate.state() == GateState::Complete && previous.saved_plot_id.is_none() {
                tracing::warn!(
                    "Discarding unsaved completed session {}",
                    previous.gate.metadata().plot_identifier
                );
            }
        }
        *guard = Some(active);

        tracing::info!(
            "Started digitisation of {} with {} datasets",
            status.gate.plot_identifier,
            status.gate.expected_datasets
        );
        Ok(status)
    }

    pub async fn status(&self) -> Result<SessionStatus, DigitisationError> {
        self.with_session(|s| Ok::<_, DigitisationError>(s.status())).await
    }

    /// Abandoning is always safe; nothing was persisted for an unfinished session
    pub async fn abandon(&self) -> bool {
        let mut guard = self.session.lock().await;
        let abandoned = guard.take();
        if let Some(active) = &abandoned {
            tracing::info!("Abandoned session {}", active.gate.metadata().plot_identifier);
        }
        abandoned.is_some()
    }

    pub async fn calibrate(
        &self,
        input: AxisCalibrationInput,
    ) -> Result<SessionStatus, DigitisationError> {
        self.with_session(|s| {
            s.gate.calibrate(&input)?;
            Ok::<_, GateError>(s.status())
        })
        .await
    }

    pub async fn recalibrate(&self) -> Result<SessionStatus, DigitisationError> {
        self.with_session(|s| {
            s.gate.recalibrate()?;
            Ok::<_, ValidationError>(s.status())
        })
        .await
    }

    pub async fn enter_name(&self, name: &str) -> Result<SessionStatus, DigitisationError> {
        self.with_session(|s| {
            s.gate.enter_name(name)?;
            Ok::<_, ValidationError>(s.status())
        })
        .await
    }

    pub async fn record_clicks(
        &self,
        clicks: &[PixelPoint],
    ) -> Result<ClickOutcome, DigitisationError> {
        self.with_session(|s| {
            let mut recorded = 0;
            for click in clicks {
                if s.gate.record_click(*click)? {
                    recorded += 1;
                }
            }
            Ok::<_, ValidationError>(ClickOutcome {
                recorded,
                discarded: clicks.len() - recorded,
                total: s.gate.collected().len(),
            })
        })
        .await
    }

    pub async fn clear_points(&self) -> Result<SessionStatus, DigitisationError> {
        self.with_session(|s| {
            s.gate.clear_points()?;
            Ok::<_, ValidationError>(s.status())
        })
        .await
    }

    pub async fn back_to_name(&self) -> Result<SessionStatus, DigitisationError> {
        self.with_session(|s| {
            s.gate.back_to_name()?;
            Ok::<_, ValidationError>(s.status())
        })
        .await
    }

    pub async fn begin_validation(&self) -> Result<ValidationView, DigitisationError> {
        self.with_session(|s| s.gate.begin_validation()).await
    }

    pub async fn validation_view(&self) -> Result<ValidationView, DigitisationError> {
        self.with_session(|s| s.gate.validation_view()).await
    }

    pub async fn reject(&self) -> Result<SessionStatus, DigitisationError> {
        self.with_session(|s| {
            s.gate.reject()?;
            Ok::<_, ValidationError>(s.status())
        })
        .await
    }

    pub async fn back(&self) -> Result<SessionStatus, DigitisationError> {
        self.with_session(|s| {
            s.gate.back()?;
            Ok::<_, ValidationError>(s.status())
        })
        .await
    }

    pub async fn previous_dataset(&self) -> Result<ValidationView, DigitisationError> {
        self.with_session(|s| s.gate.previous_dataset()).await
    }

    /// Accept the dataset under review; accepting the last one saves the plot
    pub async fn accept(&self) -> Result<AcceptOutcome, DigitisationError> {
        let mut guard = self.session.lock().await;
        let active = guard.as_mut().ok_or(DigitisationError::NoSession)?;

        let saved = match active.gate.accept()? {
            GateState::Complete => Some(self.persist(active).await?),
            _ => None,
        };
        Ok(AcceptOutcome {
            status: active.status(),
            saved,
        })
    }

    /// Retry saving a completed session
    pub async fn save(&self) -> Result<SaveOutcome, DigitisationError> {
        let mut guard = self.session.lock().await;
        let active = guard.as_mut().ok_or(DigitisationError::NoSession)?;
        self.persist(active).await
    }

    async fn persist(&self, active: &mut ActiveSession) -> Result<SaveOutcome, DigitisationError> {
        let session = active.gate.completed_session()?;
        let outcome = |plot_id| SaveOutcome {
            plot_id,
            plot_identifier: session.metadata.plot_identifier.clone(),
            datasets: session.datasets.len(),
            points: session.total_points(),
        };

        if let Some(plot_id) = active.saved_plot_id {
            return Ok(outcome(plot_id));
        }

        match self.repository.save_plot(NewPlot::from(&session)).await {
            Ok(plot_id) => {
                active.saved_plot_id = Some(plot_id);
                Ok(outcome(plot_id))
            }
            Err(e) => {
                tracing::error!(
                    "Saving {} failed, session kept for retry: {}",
                    session.metadata.plot_identifier,
                    e
                );
                Err(e.into())
            }
        }
    }

    /// CSV of every accepted dataset so far, with the suggested filename
    pub async fn export_csv(&self) -> Result<(String, Vec<u8>), DigitisationError> {
        self.with_session(|s| {
            let points = aggregate(s.gate.accepted());
            let bytes = points_to_csv(&points).map_err(|e| DigitisationError::Export(e.to_string()))?;
            let filename = format!("{}_complete_data.csv", s.gate.metadata().plot_identifier);
            Ok::<_, DigitisationError>((filename, bytes))
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::plot_repository::{
        DatabaseStats, PlotSummary, QueryResult, StoredPlot,
    };
    use crate::domain::calibration::AxisReference;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[derive(Default)]
    struct InMemoryRepository {
        plots: std::sync::Mutex<Vec<NewPlot>>,
        fail_saves: AtomicBool,
    }

    #[async_trait]
    impl PlotRepository for InMemoryRepository {
        async fn initialise(&self) -> Result<(), PersistenceError> {
            Ok(())
        }

        async fn plot_exists(&self, doi: &str, figure_number: &str) -> Result<bool, PersistenceError> {
            let identifier = crate::domain::plot::derive_plot_identifier(doi, figure_number);
            let plots = self.plots.lock().unwrap();
            Ok(plots.iter().any(|p| {
                (p.doi == doi && p.figure_number == figure_number) || p.plot_identifier == identifier
            }))
        }

        async fn save_plot(&self, plot: NewPlot) -> Result<i64, PersistenceError> {
            if self.fail_saves.load(Ordering::SeqCst) {
                return Err(PersistenceError::Storage("connection refused".to_string()));
            }
            let mut plots = self.plots.lock().unwrap();
            plots.push(plot);
            Ok(plots.len() as i64)
        }

        async fn list_plots(&self) -> Result<Vec<PlotSummary>, PersistenceError> {
            Ok(Vec::new())
        }

        async fn get_plot(&self, _id: i64) -> Result<Option<StoredPlot>, PersistenceError> {
            Ok(None)
        }

        async fn delete_plot(&self, _id: i64) -> Result<bool, PersistenceError> {
            Ok(false)
        }

        async fn database_stats(&self) -> Result<DatabaseStats, PersistenceError> {
            Ok(DatabaseStats {
                plots: 0,
                datasets: 0,
                data_points: 0,
            })
        }

        async fn run_read_only(&self, _sql: &str, _max_rows: u64) -> Result<QueryResult, PersistenceError> {
            Ok(QueryResult {
                columns: Vec::new(),
                rows: Vec::new(),
                row_count: 0,
                truncated: false,
            })
        }
    }

    fn calibration_input() -> AxisCalibrationInput {
        AxisCalibrationInput {
            x: AxisReference {
                pixel_low: PixelPoint::new(10.0, 0.0),
                pixel_high: PixelPoint::new(110.0, 0.0),
                data_low: 0.0,
                data_high: 100.0,
            },
            y: AxisReference {
                pixel_low: PixelPoint::new(0.0, 200.0),
                pixel_high: PixelPoint::new(0.0, 100.0),
                data_low: 0.0,
                data_high: 50.0,
            },
        }
    }

    fn start_request(doi: &str, datasets: usize) -> StartSession {
        StartSession {
            doi: doi.to_string(),
            figure_number: "1a".to_string(),
            dataset_count: datasets,
            image_reference: None,
        }
    }

    fn service(repository: Arc<InMemoryRepository>) -> DigitisationService {
        DigitisationService::new(repository, GateSettings::default())
    }

    async fn digitise_single_dataset(service: &DigitisationService) -> Result<AcceptOutcome, DigitisationError> {
        service.calibrate(calibration_input()).await?;
        service.enter_name("A").await?;
        let clicks = service
            .record_clicks(&[PixelPoint::new(60.0, 150.0), PixelPoint::new(61.0, 151.0)])
            .await?;
        assert_eq!(clicks.recorded, 1);
        assert_eq!(clicks.discarded, 1);
        service.begin_validation().await?;
        service.accept().await
    }

    #[tokio::test]
    async fn test_completing_session_saves_plot() {
        let repository = Arc::new(InMemoryRepository::default());
        let service = service(repository.clone());
        service
            .start(start_request("https://doi.org/10.1016/j.jrmge.2023.02.015", 1))
            .await
            .unwrap();

        let outcome = digitise_single_dataset(&service).await.unwrap();
        let saved = outcome.saved.unwrap();
        assert_eq!(saved.plot_identifier, "10_1016_j_jrmge_2023_02_015_Fig1a");
        assert_eq!(saved.points, 1);
        assert_eq!(outcome.status.gate.state, GateState::Complete);

        let plots = repository.plots.lock().unwrap();
        assert_eq!(plots[0].doi, "10.1016/j.jrmge.2023.02.015");
        assert_eq!(plots[0].x_axis_range, "0 to 100");
        assert_eq!(plots[0].datasets[0].points[0].x_data, 50.0);
        assert_eq!(plots[0].datasets[0].points[0].y_data, 25.0);
    }

    #[tokio::test]
    async fn test_failed_save_keeps_session_for_retry() {
        let repository = Arc::new(InMemoryRepository::default());
        repository.fail_saves.store(true, Ordering::SeqCst);
        let service = service(repository.clone());
        service.start(start_request("10.1000/retry", 1)).await.unwrap();

        let err = digitise_single_dataset(&service).await.unwrap_err();
        assert!(matches!(err, DigitisationError::Persistence(_)));
        assert_eq!(service.status().await.unwrap().gate.state, GateState::Complete);

        repository.fail_saves.store(false, Ordering::SeqCst);
        let saved = service.save().await.unwrap();
        assert_eq!(saved.points, 1);

        // A second save is a no-op returning the same plot
        assert_eq!(service.save().await.unwrap().plot_id, saved.plot_id);
        assert_eq!(repository.plots.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_start_rejects_existing_plot() {
        let repository = Arc::new(InMemoryRepository::default());
        let service = service(repository.clone());
        service.start(start_request("10.1000/dup", 1)).await.unwrap();
        digitise_single_dataset(&service).await.unwrap();

        let err = service
            .start(start_request("doi:10.1000/dup", 1))
            .await
            .unwrap_err();
        assert!(matches!(err, DigitisationError::PlotAlreadyExists { .. }));
    }

    #[tokio::test]
    async fn test_start_rejects_figure_with_same_identifier() {
        let repository = Arc::new(InMemoryRepository::default());
        let service = service(repository.clone());
        let mut request = start_request("10.1000/x", 1);
        request.figure_number = "1.a".to_string();
        service.start(request).await.unwrap();
        digitise_single_dataset(&service).await.unwrap();

        let mut request = start_request("10.1000/x", 1);
        request.figure_number = "1_a".to_string();
        let err = service.start(request).await.unwrap_err();
        assert!(matches!(err, DigitisationError::PlotAlreadyExists { .. }));
    }

    #[tokio::test]
    async fn test_start_validates_input() {
        let service = service(Arc::new(InMemoryRepository::default()));
        assert!(matches!(
            service.start(start_request("not-a-doi", 1)).await.unwrap_err(),
            DigitisationError::InvalidDoi(_)
        ));
        assert!(matches!(
            service.start(start_request("10.1000/x", 0)).await.unwrap_err(),
            DigitisationError::Validation(ValidationError::NoDatasets)
        ));

        let mut request = start_request("10.1000/x", 1);
        request.figure_number = " ".to_string();
        assert!(matches!(
            service.start(request).await.unwrap_err(),
            DigitisationError::MissingFigureNumber
        ));
    }

    #[tokio::test]
    async fn test_events_without_session() {
        let service = service(Arc::new(InMemoryRepository::default()));
        assert!(matches!(
            service.enter_name("A").await.unwrap_err(),
            DigitisationError::NoSession
        ));
        assert!(!service.abandon().await);
    }

    #[tokio::test]
    async fn test_abandon_persists_nothing() {
        let repository = Arc::new(InMemoryRepository::default());
        let service = service(repository.clone());
        service.start(start_request("10.1000/abandon", 2)).await.unwrap();
        service.calibrate(calibration_input()).await.unwrap();
        service.enter_name("A").await.unwrap();
        service.begin_validation().await.unwrap();
        service.accept().await.unwrap();

        assert!(service.abandon().await);
        assert!(repository.plots.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_export_accepted_points() {
        let service = service(Arc::new(InMemoryRepository::default()));
        service.start(start_request("10.1000/csv", 1)).await.unwrap();
        digitise_single_dataset(&service).await.unwrap();

        let (filename, bytes) = service.export_csv().await.unwrap();
        assert_eq!(filename, "10_1000_csv_Fig1a_complete_data.csv");
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            "dataset,x_pixel,y_pixel,P(MPa),Q(MPa)\nA,60.0000,150.0000,50.0000,25.0000\n"
        );
    }
}
