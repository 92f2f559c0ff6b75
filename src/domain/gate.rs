// Validation gate - per-dataset digitisation workflow state machine
use super::calibration::{
    AxisCalibration, AxisCalibrationInput, CalibrationError, CalibrationOverlay, PixelPoint,
};
use super::collector::PointCollector;
use super::data_point::{DataPoint, Dataset};
use super::plot::{PlotMetadata, PlotSession};
use super::transformer::transform;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GateState {
    Calibrating,
    NameEntry,
    Collecting,
    Validating,
    Complete,
}

impl std::fmt::Display for GateState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            GateState::Calibrating => "calibrating",
            GateState::NameEntry => "name_entry",
            GateState::Collecting => "collecting",
            GateState::Validating => "validating",
            GateState::Complete => "complete",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("dataset name must not be empty")]
    EmptyName,
    #[error("dataset name '{0}' is already used in this plot")]
    DuplicateName(String),
    #[error("a plot needs at least one dataset")]
    NoDatasets,
    #[error("'{event}' is not possible while {state}")]
    InvalidTransition { event: &'static str, state: GateState },
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum GateError {
    #[error("calibration incomplete: {0}")]
    Calibration(#[from] CalibrationError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// Soft findings that never block acceptance
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValidationWarning {
    NoPoints { dataset: String },
}

/// Freshly converted points of the dataset under review
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationView {
    pub dataset_index: usize,
    pub dataset_name: String,
    pub points: Vec<DataPoint>,
    pub warning: Option<ValidationWarning>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GateSettings {
    pub min_calibration_separation: f64,
    pub dedup_threshold: f64,
}

impl Default for GateSettings {
    fn default() -> Self {
        Self {
            min_calibration_separation: super::calibration::DEFAULT_MIN_PIXEL_SEPARATION,
            dedup_threshold: super::collector::DEFAULT_DEDUP_THRESHOLD,
        }
    }
}

/// Point-in-time view of the workflow for the UI
#[derive(Debug, Clone, Serialize)]
pub struct GateStatus {
    pub state: GateState,
    pub plot_identifier: String,
    pub dataset_index: usize,
    pub expected_datasets: usize,
    pub current_name: Option<String>,
    pub collected_points: usize,
    pub accepted: Vec<String>,
    pub calibration: Option<CalibrationOverlay>,
}

/// Drives one plot through calibration and per-dataset collect/validate cycles.
///
/// Every operation is one discrete UI event. Errors leave the gate untouched,
/// so the workflow can always be resumed in place.
#[derive(Debug, Clone)]
pub struct ValidationGate {
    metadata: PlotMetadata,
    expected_datasets: usize,
    settings: GateSettings,
    state: GateState,
    calibration: Option<AxisCalibration>,
    dataset_index: usize,
    current_name: String,
    collector: PointCollector,
    accepted: Vec<Dataset>,
}

impl ValidationGate {
    pub fn new(
        metadata: PlotMetadata,
        expected_datasets: usize,
        settings: GateSettings,
    ) -> Result<Self, ValidationError> {
        if expected_datasets == 0 {
            return Err(ValidationError::NoDatasets);
        }
        Ok(Self {
            metadata,
            expected_datasets,
            settings,
            state: GateState::Calibrating,
            calibration: None,
            dataset_index: 0,
            current_name: String::new(),
            collector: PointCollector::new(settings.dedup_threshold),
            accepted: Vec::new(),
        })
    }

    pub fn state(&self) -> GateState {
        self.state
    }

    pub fn metadata(&self) -> &PlotMetadata {
        &self.metadata
    }

    pub fn accepted(&self) -> &[Dataset] {
        &self.accepted
    }

    pub fn collected(&self) -> &[PixelPoint] {
        self.collector.points()
    }

    fn expect(&self, state: GateState, event: &'static str) -> Result<(), ValidationError> {
        if self.state == state {
            Ok(())
        } else {
            Err(ValidationError::InvalidTransition {
                event,
                state: self.state,
            })
        }
    }

    fn calibration(&self, event: &'static str) -> Result<&AxisCalibration, ValidationError> {
        self.calibration
            .as_ref()
            .ok_or(ValidationError::InvalidTransition {
                event,
                state: self.state,
            })
    }

    pub fn status(&self) -> GateStatus {
        let current_name = match self.state {
            GateState::Collecting | GateState::Validating => Some(self.current_name.clone()),
            GateState::NameEntry if !self.current_name.is_empty() => Some(self.current_name.clone()),
            _ => None,
        };
        GateStatus {
            state: self.state,
            plot_identifier: self.metadata.plot_identifier.clone(),
            dataset_index: self.dataset_index,
            expected_datasets: self.expected_datasets,
            current_name,
            collected_points: self.collector.len(),
            accepted: self.accepted.iter().map(|d| d.name.clone()).collect(),
            calibration: self.calibration.as_ref().map(AxisCalibration::overlay),
        }
    }

    pub fn calibrate(&mut self, input: &AxisCalibrationInput) -> Result<(), GateError> {
        self.expect(GateState::Calibrating, "calibrate")?;
        let calibration =
            AxisCalibration::from_input(input, self.settings.min_calibration_separation)?;
        self.calibration = Some(calibration);
        self.state = GateState::NameEntry;
        tracing::info!(
            "Calibrated {}: X {}, Y {}",
            self.metadata.plot_identifier,
            calibration.x_axis_range(),
            calibration.y_axis_range()
        );
        Ok(())
    }

    /// Back from the first dataset's name entry to calibration
    pub fn recalibrate(&mut self) -> Result<(), ValidationError> {
        self.expect(GateState::NameEntry, "recalibrate")?;
        if self.dataset_index != 0 || !self.accepted.is_empty() {
            return Err(ValidationError::InvalidTransition {
                event: "recalibrate",
                state: self.state,
            });
        }
        self.calibration = None;
        self.state = GateState::Calibrating;
        Ok(())
    }

    pub fn enter_name(&mut self, name: &str) -> Result<(), ValidationError> {
        self.expect(GateState::NameEntry, "enter_name")?;
        let name = name.trim();
        if name.is_empty() {
            return Err(ValidationError::EmptyName);
        }
        if self.accepted.iter().any(|d| d.name == name) {
            tracing::warn!("Rejected duplicate dataset name '{}'", name);
            return Err(ValidationError::DuplicateName(name.to_string()));
        }

        // Returning to name entry keeps the clicks unless the name changes
        if name != self.current_name {
            self.current_name = name.to_string();
            self.collector.clear();
        }
        self.state = GateState::Collecting;
        Ok(())
    }

    /// Returns `false` if the click was dropped as a duplicate
    pub fn record_click(&mut self, point: PixelPoint) -> Result<bool, ValidationError> {
        self.expect(GateState::Collecting, "record_click")?;
        Ok(self.collector.record(point))
    }

    pub fn clear_points(&mut self) -> Result<(), ValidationError> {
        self.expect(GateState::Collecting, "clear_points")?;
        self.collector.clear();
        Ok(())
    }

    pub fn back_to_name(&mut self) -> Result<(), ValidationError> {
        self.expect(GateState::Collecting, "back_to_name")?;
        self.state = GateState::NameEntry;
        Ok(())
    }

    pub fn begin_validation(&mut self) -> Result<ValidationView, ValidationError> {
        self.expect(GateState::Collecting, "begin_validation")?;
        self.state = GateState::Validating;
        self.validation_view()
    }

    /// Recomputed on every call so it always reflects the current calibration
    pub fn validation_view(&self) -> Result<ValidationView, ValidationError> {
        self.expect(GateState::Validating, "validation_view")?;
        let calibration = self.calibration("validation_view")?;
        let points = transform(&self.current_name, self.collector.points(), calibration);
        let warning = points.is_empty().then(|| {
            tracing::warn!("Dataset '{}' has no points", self.current_name);
            ValidationWarning::NoPoints {
                dataset: self.current_name.clone(),
            }
        });
        Ok(ValidationView {
            dataset_index: self.dataset_index,
            dataset_name: self.current_name.clone(),
            points,
            warning,
        })
    }

    /// Discard the clicks and collect the same dataset again
    pub fn reject(&mut self) -> Result<(), ValidationError> {
        self.expect(GateState::Validating, "reject")?;
        self.collector.clear();
        self.state = GateState::Collecting;
        Ok(())
    }

    /// Resume collecting with the clicks kept
    pub fn back(&mut self) -> Result<(), ValidationError> {
        self.expect(GateState::Validating, "back")?;
        self.state = GateState::Collecting;
        Ok(())
    }

    pub fn accept(&mut self) -> Result<GateState, ValidationError> {
        self.expect(GateState::Validating, "accept")?;
        let calibration = self.calibration("accept")?;
        let points = transform(&self.current_name, self.collector.points(), calibration);
        let dataset = Dataset::new(self.current_name.clone(), points);

        tracing::info!(
            "Accepted dataset {}/{} '{}' with {} points",
            self.dataset_index + 1,
            self.expected_datasets,
            dataset.name,
            dataset.points.len()
        );

        match self.accepted.iter().position(|d| d.name == dataset.name) {
            Some(existing) => self.accepted[existing] = dataset,
            None => self.accepted.push(dataset),
        }

        if self.dataset_index + 1 >= self.expected_datasets {
            self.state = GateState::Complete;
        } else {
            self.dataset_index += 1;
            self.current_name.clear();
            self.collector.clear();
            self.state = GateState::NameEntry;
        }
        Ok(self.state)
    }

    /// From name entry of dataset `i` back to validating dataset `i - 1`.
    ///
    /// The previous dataset leaves the accepted list so accepting it again
    /// cannot produce a duplicate entry.
    pub fn previous_dataset(&mut self) -> Result<ValidationView, ValidationError> {
        self.expect(GateState::NameEntry, "previous_dataset")?;
        let no_previous = ValidationError::InvalidTransition {
            event: "previous_dataset",
            state: self.state,
        };
        if self.dataset_index == 0 {
            return Err(no_previous);
        }
        let Some(previous) = self.accepted.pop() else {
            return Err(no_previous);
        };
        if !self.collector.is_empty() {
            tracing::warn!(
                "Discarding {} pending clicks of '{}' to revisit '{}'",
                self.collector.len(),
                self.current_name,
                previous.name
            );
        }

        let clicks = previous
            .points
            .iter()
            .map(|p| PixelPoint::new(p.x_pixel, p.y_pixel))
            .collect();
        self.collector = PointCollector::with_points(self.settings.dedup_threshold, clicks);
        self.current_name = previous.name;
        self.dataset_index -= 1;
        self.state = GateState::Validating;
        self.validation_view()
    }

    /// The finished session, available once every dataset was accepted
    pub fn completed_session(&self) -> Result<PlotSession, ValidationError> {
        self.expect(GateState::Complete, "completed_session")?;
        let calibration = *self.calibration("completed_session")?;
        Ok(PlotSession {
            metadata: self.metadata.clone(),
            calibration,
            datasets: self.accepted.clone(),
        })
    }
}
