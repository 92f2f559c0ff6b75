// CSV export of digitised points
use crate::application::plot_repository::StoredPlot;
use crate::domain::data_point::DataPoint;
use serde::Serialize;

/// Decimal places used when formatting exported values
const EXPORT_PRECISION: usize = 4;

#[derive(Debug, Serialize)]
struct PointRow<'a> {
    dataset: &'a str,
    x_pixel: String,
    y_pixel: String,
    #[serde(rename = "P(MPa)")]
    p_mpa: String,
    #[serde(rename = "Q(MPa)")]
    q_mpa: String,
}

fn fixed(value: f64) -> String {
    format!("{:.*}", EXPORT_PRECISION, value)
}

impl<'a> From<&'a DataPoint> for PointRow<'a> {
    fn from(p: &'a DataPoint) -> Self {
        Self {
            dataset: &p.dataset_name,
            x_pixel: fixed(p.x_pixel),
            y_pixel: fixed(p.y_pixel),
            p_mpa: fixed(p.x_data),
            q_mpa: fixed(p.y_data),
        }
    }
}

fn into_bytes(writer: csv::Writer<Vec<u8>>) -> anyhow::Result<Vec<u8>> {
    writer
        .into_inner()
        .map_err(|e| anyhow::anyhow!("Failed to flush CSV writer: {}", e))
}

/// One row per point: `dataset,x_pixel,y_pixel,P(MPa),Q(MPa)`
pub fn points_to_csv(points: &[DataPoint]) -> anyhow::Result<Vec<u8>> {
    let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(Vec::new());
    writer.write_record(["dataset", "x_pixel", "y_pixel", "P(MPa)", "Q(MPa)"])?;
    for p in points {
        writer.serialize(PointRow::from(p))?;
    }
    into_bytes(writer)
}

pub const BULK_HEADER: [&str; 8] = [
    "doi",
    "figure_number",
    "plot_identifier",
    "dataset",
    "x_pixel",
    "y_pixel",
    "P(MPa)",
    "Q(MPa)",
];

/// Header line for the bulk export
pub fn bulk_header() -> anyhow::Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(BULK_HEADER)?;
    into_bytes(writer)
}

/// Rows of one plot for the bulk export, without header
pub fn plot_to_bulk_rows(plot: &StoredPlot) -> anyhow::Result<Vec<u8>> {
    let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(Vec::new());
    for dataset in &plot.datasets {
        for p in &dataset.points {
            let row = PointRow::from(p);
            writer.write_record([
                plot.doi.as_str(),
                plot.figure_number.as_str(),
                plot.plot_identifier.as_str(),
                row.dataset,
                row.x_pixel.as_str(),
                row.y_pixel.as_str(),
                row.p_mpa.as_str(),
                row.q_mpa.as_str(),
            ])?;
        }
    }
    into_bytes(writer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::data_point::Dataset;

    #[test]
    fn test_points_to_csv() {
        let points = vec![
            DataPoint::new("Berea".to_string(), 60.0, 150.0, 50.0, 25.0),
            DataPoint::new("Bentheim, A".to_string(), 61.5, 10.25, 1.0 / 3.0, -2.0),
        ];
        let csv = String::from_utf8(points_to_csv(&points).unwrap()).unwrap();
        assert_eq!(
            csv,
            "dataset,x_pixel,y_pixel,P(MPa),Q(MPa)\n\
             Berea,60.0000,150.0000,50.0000,25.0000\n\
             \"Bentheim, A\",61.5000,10.2500,0.3333,-2.0000\n"
        );
    }

    #[test]
    fn test_empty_export_has_header_only() {
        let csv = String::from_utf8(points_to_csv(&[]).unwrap()).unwrap();
        assert_eq!(csv, "dataset,x_pixel,y_pixel,P(MPa),Q(MPa)\n");
    }

    #[test]
    fn test_bulk_rows_carry_plot_identity() {
        let plot = StoredPlot {
            id: 1,
            doi: "10.1/x".to_string(),
            figure_number: "2".to_string(),
            plot_identifier: "10_1_x_Fig2".to_string(),
            image_reference: None,
            x_axis_range: None,
            y_axis_range: None,
            created_at: None,
            datasets: vec![Dataset::new(
                "A".to_string(),
                vec![DataPoint::new("A".to_string(), 1.0, 2.0, 3.0, 4.0)],
            )],
        };
        let header = String::from_utf8(bulk_header().unwrap()).unwrap();
        let rows = String::from_utf8(plot_to_bulk_rows(&plot).unwrap()).unwrap();
        assert_eq!(
            header,
            "doi,figure_number,plot_identifier,dataset,x_pixel,y_pixel,P(MPa),Q(MPa)\n"
        );
        assert_eq!(rows, "10.1/x,2,10_1_x_Fig2,A,1.0000,2.0000,3.0000,4.0000\n");
    }
}
