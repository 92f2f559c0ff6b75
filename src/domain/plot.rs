// Plot identity - DOI handling and session metadata
use super::calibration::AxisCalibration;
use super::data_point::Dataset;

const DOI_PREFIXES: [&str; 3] = ["https://doi.org/", "http://doi.org/", "doi:"];

fn strip_doi_prefixes(doi: &str) -> String {
    DOI_PREFIXES
        .iter()
        .fold(doi.to_string(), |acc, prefix| acc.replace(prefix, ""))
}

/// DOI as stored: resolver prefixes removed, surrounding whitespace trimmed
pub fn clean_doi(doi: &str) -> String {
    strip_doi_prefixes(doi).trim().to_string()
}

/// Basic DOI shape check: `10.` registrant prefix followed by a `/` suffix
pub fn validate_doi(doi: &str) -> bool {
    let clean = clean_doi(doi);
    match clean.strip_prefix("10.") {
        Some(rest) => rest.contains('/'),
        None => false,
    }
}

/// Natural key for a figure, e.g. `10_1016_j_jrmge_2023_02_015_Fig1a`
pub fn derive_plot_identifier(doi: &str, figure_number: &str) -> String {
    let doi = strip_doi_prefixes(doi).replace(['/', '.'], "_");
    let figure = figure_number.replace([' ', '.'], "_");
    format!("{}_Fig{}", doi, figure)
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlotMetadata {
    pub doi: String,
    pub figure_number: String,
    pub plot_identifier: String,
    pub image_reference: Option<String>,
}

impl PlotMetadata {
    /// Cleans the DOI and derives the identifier from the cleaned form
    pub fn new(doi: &str, figure_number: &str, image_reference: Option<String>) -> Self {
        let doi = clean_doi(doi);
        let figure_number = figure_number.trim().to_string();
        let plot_identifier = derive_plot_identifier(&doi, &figure_number);
        Self {
            doi,
            figure_number,
            plot_identifier,
            image_reference,
        }
    }
}

/// A completed digitisation: metadata, calibration and accepted datasets
#[derive(Debug, Clone, PartialEq)]
pub struct PlotSession {
    pub metadata: PlotMetadata,
    pub calibration: AxisCalibration,
    pub datasets: Vec<Dataset>,
}

impl PlotSession {
    pub fn total_points(&self) -> usize {
        self.datasets.iter().map(|d| d.points.len()).sum()
    }
}
