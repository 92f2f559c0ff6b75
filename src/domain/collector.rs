// Point collector - raw pixel clicks for the active dataset
use super::calibration::PixelPoint;

pub const DEFAULT_DEDUP_THRESHOLD: f64 = 5.0;

/// Accumulates clicks for one dataset in insertion order.
///
/// A click closer than `dedup_threshold` pixels (on both axes) to an already
/// collected point is dropped. This absorbs the same click being delivered
/// twice by the UI event source; it is a heuristic, not a guarantee that
/// legitimate neighbouring points survive.
#[derive(Debug, Clone)]
pub struct PointCollector {
    dedup_threshold: f64,
    points: Vec<PixelPoint>,
}

impl PointCollector {
    pub fn new(dedup_threshold: f64) -> Self {
        Self {
            dedup_threshold,
            points: Vec::new(),
        }
    }

    pub fn with_points(dedup_threshold: f64, points: Vec<PixelPoint>) -> Self {
        Self {
            dedup_threshold,
            points,
        }
    }

    /// Returns `false` when the click was discarded as a duplicate
    pub fn record(&mut self, point: PixelPoint) -> bool {
        if self.is_duplicate(point) {
            tracing::debug!("Discarding duplicate click at ({:.1}, {:.1})", point.x, point.y);
            return false;
        }
        self.points.push(point);
        true
    }

    fn is_duplicate(&self, point: PixelPoint) -> bool {
        self.points.iter().any(|existing| {
            (existing.x - point.x).abs() < self.dedup_threshold
                && (existing.y - point.y).abs() < self.dedup_threshold
        })
    }

    pub fn clear(&mut self) {
        self.points.clear();
    }

    pub fn points(&self) -> &[PixelPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

impl Default for PointCollector {
    fn default() -> Self {
        Self::new(DEFAULT_DEDUP_THRESHOLD)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repeated_click_yields_single_point() {
        let mut collector = PointCollector::default();
        assert!(collector.record(PixelPoint::new(120.0, 80.0)));
        assert!(!collector.record(PixelPoint::new(120.0, 80.0)));
        assert!(!collector.record(PixelPoint::new(123.5, 77.0)));

        assert_eq!(collector.points(), &[PixelPoint::new(120.0, 80.0)]);
    }

    #[test]
    fn test_close_on_one_axis_only_is_kept() {
        let mut collector = PointCollector::default();
        collector.record(PixelPoint::new(100.0, 100.0));
        assert!(collector.record(PixelPoint::new(102.0, 140.0)));
        assert!(collector.record(PixelPoint::new(160.0, 101.0)));
        assert_eq!(collector.len(), 3);
    }

    #[test]
    fn test_threshold_is_exclusive() {
        let mut collector = PointCollector::new(5.0);
        collector.record(PixelPoint::new(0.0, 0.0));
        assert!(collector.record(PixelPoint::new(5.0, 5.0)));
    }

    #[test]
    fn test_insertion_order_preserved_and_clear() {
        let mut collector = PointCollector::default();
        let clicks = [(300.0, 20.0), (10.0, 400.0), (150.0, 150.0)];
        for (x, y) in clicks {
            collector.record(PixelPoint::new(x, y));
        }
        let xs: Vec<f64> = collector.points().iter().map(|p| p.x).collect();
        assert_eq!(xs, vec![300.0, 10.0, 150.0]);

        collector.clear();
        assert!(collector.is_empty());
        // A cleared collector accepts the same location again
        assert!(collector.record(PixelPoint::new(300.0, 20.0)));
    }
}
