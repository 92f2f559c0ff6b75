// Point transformer - pixel clicks to data space
use super::calibration::{AxisCalibration, PixelPoint};
use super::data_point::DataPoint;

/// Converts a collector snapshot through the calibration.
///
/// Always computed from the current calibration; results are never cached.
pub fn transform(
    dataset_name: &str,
    raw_points: &[PixelPoint],
    calibration: &AxisCalibration,
) -> Vec<DataPoint> {
    raw_points
        .iter()
        .map(|p| {
            let (x_data, y_data) = calibration.pixel_to_data(p.x, p.y);
            DataPoint::new(dataset_name.to_string(), p.x, p.y, x_data, y_data)
        })
        .collect()
}
