// Axis calibration - linear pixel to data mapping per axis
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Minimum pixel distance between the two reference clicks of one axis.
pub const DEFAULT_MIN_PIXEL_SEPARATION: f64 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PixelPoint {
    pub x: f64,
    pub y: f64,
}

impl PixelPoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    X,
    Y,
}

impl Axis {
    /// The pixel component this axis is calibrated along
    fn component(self, point: PixelPoint) -> f64 {
        match self {
            Axis::X => point.x,
            Axis::Y => point.y,
        }
    }
}

impl std::fmt::Display for Axis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Axis::X => write!(f, "X"),
            Axis::Y => write!(f, "Y"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CalibrationError {
    #[error("{axis}-axis calibration points are {span:.1} px apart (minimum: {minimum:.1} px)")]
    PixelSpanTooSmall { axis: Axis, span: f64, minimum: f64 },
    #[error("{axis}-axis calibration values are identical ({value})")]
    DegenerateDataRange { axis: Axis, value: f64 },
    #[error("{axis}-axis calibration input is not a finite number")]
    NonFinite { axis: Axis },
}

/// Reference clicks and user-entered values for one axis, as received from the UI
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AxisReference {
    pub pixel_low: PixelPoint,
    pub pixel_high: PixelPoint,
    pub data_low: f64,
    pub data_high: f64,
}

/// Reference clicks and fitted coefficients, for drawing the calibration overlay
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AxisOverlay {
    pub axis: Axis,
    pub pixel_low: PixelPoint,
    pub pixel_high: PixelPoint,
    pub range: String,
    pub scale: f64,
    pub offset: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalibrationOverlay {
    pub x: AxisOverlay,
    pub y: AxisOverlay,
}

/// Calibration of one axis: `data = scale * pixel + offset`.
///
/// Coefficients are derived once in [`CalibrationAxis::new`] and never change.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationAxis {
    axis: Axis,
    pixel_point_low: PixelPoint,
    pixel_point_high: PixelPoint,
    data_value_low: f64,
    data_value_high: f64,
    scale: f64,
    offset: f64,
}

impl CalibrationAxis {
    pub fn new(
        axis: Axis,
        reference: AxisReference,
        min_separation: f64,
    ) -> Result<Self, CalibrationError> {
        let AxisReference {
            pixel_low,
            pixel_high,
            data_low,
            data_high,
        } = reference;

        let finite = [pixel_low.x, pixel_low.y, pixel_high.x, pixel_high.y, data_low, data_high]
            .iter()
            .all(|v| v.is_finite());
        if !finite {
            return Err(CalibrationError::NonFinite { axis });
        }

        let low = axis.component(pixel_low);
        let high = axis.component(pixel_high);
        let span = high - low;

        // Checked before dividing so a near-zero span never reaches the division
        if span.abs() < min_separation {
            return Err(CalibrationError::PixelSpanTooSmall {
                axis,
                span: span.abs(),
                minimum: min_separation,
            });
        }
        if data_low == data_high {
            return Err(CalibrationError::DegenerateDataRange {
                axis,
                value: data_low,
            });
        }

        let scale = (data_high - data_low) / span;
        let offset = data_low - scale * low;

        Ok(Self {
            axis,
            pixel_point_low: pixel_low,
            pixel_point_high: pixel_high,
            data_value_low: data_low,
            data_value_high: data_high,
            scale,
            offset,
        })
    }

    pub fn overlay(&self) -> AxisOverlay {
        AxisOverlay {
            axis: self.axis,
            pixel_low: self.pixel_point_low,
            pixel_high: self.pixel_point_high,
            range: self.range_label(),
            scale: self.scale,
            offset: self.offset,
        }
    }

    pub fn apply(&self, pixel: f64) -> f64 {
        self.scale * pixel + self.offset
    }

    /// Free-text range persisted alongside the plot, e.g. "0 to 100"
    pub fn range_label(&self) -> String {
        format!("{} to {}", self.data_value_low, self.data_value_high)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AxisCalibrationInput {
    pub x: AxisReference,
    pub y: AxisReference,
}

/// Both axes, calibrated from four independent clicks
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AxisCalibration {
    x: CalibrationAxis,
    y: CalibrationAxis,
}

impl AxisCalibration {
    pub fn new(x: CalibrationAxis, y: CalibrationAxis) -> Self {
        Self { x, y }
    }

    pub fn from_input(
        input: &AxisCalibrationInput,
        min_separation: f64,
    ) -> Result<Self, CalibrationError> {
        let x = CalibrationAxis::new(Axis::X, input.x, min_separation)?;
        let y = CalibrationAxis::new(Axis::Y, input.y, min_separation)?;
        Ok(Self::new(x, y))
    }

    pub fn pixel_to_data(&self, x_pixel: f64, y_pixel: f64) -> (f64, f64) {
        (self.x.apply(x_pixel), self.y.apply(y_pixel))
    }

    pub fn overlay(&self) -> CalibrationOverlay {
        CalibrationOverlay {
            x: self.x.overlay(),
            y: self.y.overlay(),
        }
    }

    pub fn x_axis_range(&self) -> String {
        self.x.range_label()
    }

    pub fn y_axis_range(&self) -> String {
        self.y.range_label()
    }
}
