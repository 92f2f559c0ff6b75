// Aggregation and per-dataset summaries
use super::data_point::{DataPoint, Dataset};
use serde::Serialize;

/// P values at or below this are excluded from Q/P ratio checks
const MIN_RATIO_PRESSURE: f64 = 0.1;
const EXTREME_Q_P_RATIO: f64 = 10.0;

/// Flattens accepted datasets in dataset-then-point order
pub fn aggregate(datasets: &[Dataset]) -> Vec<DataPoint> {
    datasets
        .iter()
        .flat_map(|d| d.points.iter().cloned())
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValueStats {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    /// Sample standard deviation; `None` for fewer than two values
    pub std_dev: Option<f64>,
}

impl ValueStats {
    fn from_values(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        let n = values.len() as f64;
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let mean = values.iter().sum::<f64>() / n;
        let std_dev = (values.len() > 1).then(|| {
            let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
            var.sqrt()
        });
        Some(Self {
            min,
            max,
            mean,
            std_dev,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatasetSummary {
    pub name: String,
    pub point_count: usize,
    pub p: Option<ValueStats>,
    pub q: Option<ValueStats>,
    pub negative_p_count: usize,
    pub negative_q_count: usize,
    pub extreme_q_p_ratio_count: usize,
}

impl DatasetSummary {
    pub fn empty(name: &str) -> Self {
        Self {
            name: name.to_string(),
            point_count: 0,
            p: None,
            q: None,
            negative_p_count: 0,
            negative_q_count: 0,
            extreme_q_p_ratio_count: 0,
        }
    }
}

/// Summaries grouped by dataset name, in first-appearance order
pub fn summarize(points: &[DataPoint]) -> Vec<DatasetSummary> {
    let mut order: Vec<&str> = Vec::new();
    for p in points {
        if !order.contains(&p.dataset_name.as_str()) {
            order.push(&p.dataset_name);
        }
    }

    order
        .into_iter()
        .map(|name| {
            let subset: Vec<&DataPoint> = points.iter().filter(|p| p.dataset_name == name).collect();
            let ps: Vec<f64> = subset.iter().map(|p| p.x_data).collect();
            let qs: Vec<f64> = subset.iter().map(|p| p.y_data).collect();

            DatasetSummary {
                name: name.to_string(),
                point_count: subset.len(),
                p: ValueStats::from_values(&ps),
                q: ValueStats::from_values(&qs),
                negative_p_count: ps.iter().filter(|v| **v < 0.0).count(),
                negative_q_count: qs.iter().filter(|v| **v < 0.0).count(),
                extreme_q_p_ratio_count: subset
                    .iter()
                    .filter(|p| p.x_data > MIN_RATIO_PRESSURE && p.y_data / p.x_data > EXTREME_Q_P_RATIO)
                    .count(),
            }
        })
        .collect()
}
