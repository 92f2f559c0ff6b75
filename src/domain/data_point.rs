// Digitised data models
use serde::Serialize;

/// One converted click, tagged with its dataset and source pixel
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataPoint {
    pub dataset_name: String,
    pub x_pixel: f64,
    pub y_pixel: f64,
    pub x_data: f64,
    pub y_data: f64,
}

impl DataPoint {
    pub fn new(dataset_name: String, x_pixel: f64, y_pixel: f64, x_data: f64, y_data: f64) -> Self {
        Self {
            dataset_name,
            x_pixel,
            y_pixel,
            x_data,
            y_data,
        }
    }
}

/// A named group of points (one sandstone sample) within a figure
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dataset {
    pub name: String,
    pub points: Vec<DataPoint>,
}

impl Dataset {
    pub fn new(name: String, points: Vec<DataPoint>) -> Self {
        Self { name, points }
    }
}
