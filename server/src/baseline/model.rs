use std::collections::HashMap;
use std::fmt;

use serde::Serialize;

use crate::flow::now_ts;

/// Metric a baseline is tracked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Metric {
    #[serde(rename = "p50_ms")]
    P50Ms,
    #[serde(rename = "p95_ms")]
    P95Ms,
}

impl Metric {
    pub fn as_str(self) -> &'static str {
        match self {
            Metric::P50Ms => "p50_ms",
            Metric::P95Ms => "p95_ms",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rolling baseline for one (key, metric): EWMA mean plus EWM variance
/// over squared residuals. Fast, streaming, and simple to tune.
#[derive(Debug, Clone, Default)]
pub struct BaselinePoint {
    pub mean: f64,
    pub var: f64,
    pub n: u64,
    pub last_update_ts: f64,
}

impl BaselinePoint {
    /// EWMA update for mean and variance. The first sample seeds the
    /// mean directly and zeroes the variance.
    pub fn update(&mut self, x: f64, alpha: f64) {
        if self.n == 0 {
            self.mean = x;
            self.var = 0.0;
            self.n = 1;
            self.last_update_ts = now_ts();
            return;
        }

        let prev_mean = self.mean;
        self.mean = alpha * x + (1.0 - alpha) * self.mean;

        let residual = x - prev_mean;
        self.var = alpha * (residual * residual) + (1.0 - alpha) * self.var;

        self.n += 1;
        self.last_update_ts = now_ts();
    }

    pub fn std(&self) -> f64 {
        self.var.max(0.0).sqrt()
    }
}

/// Anomaly verdict from a baseline comparison.
#[derive(Debug, Clone, Copy)]
pub struct Detection {
    pub mean: f64,
    pub std: f64,
    pub zscore: f64,
}

/// Baselines per (grouping key, metric).
///
/// Example keys: `exporter:10.0.0.9`, `src:10.0.0.1`,
/// `pair:10.0.0.1->10.0.0.2`, `proto:UDP`.
#[derive(Default)]
pub struct BaselineModel {
    points: HashMap<(String, Metric), BaselinePoint>,
}

impl BaselineModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn point(&self, key: &str, metric: Metric) -> Option<&BaselinePoint> {
        self.points.get(&(key.to_string(), metric))
    }

    pub fn update(&mut self, key: &str, metric: Metric, value: f64, alpha: f64) {
        self.points
            .entry((key.to_string(), metric))
            .or_default()
            .update(value, alpha);
    }

    /// Compare `current_value` against the stored baseline without
    /// mutating it. Returns a [`Detection`] when the deviation is
    /// anomalous, `None` otherwise.
    ///
    /// The zero-variance guard: a baseline that has learned a perfectly
    /// flat signal (std ~ 0) treats any departure from the mean as an
    /// anomaly with an infinite z-score. A flat baseline must not mask
    /// spikes.
    pub fn detect_anomaly(
        &self,
        key: &str,
        metric: Metric,
        current_value: f64,
        z_threshold: f64,
        min_updates: u64,
    ) -> Option<Detection> {
        let pt = self.points.get(&(key.to_string(), metric))?;

        // Not enough history yet.
        if pt.n < min_updates {
            return None;
        }

        let std = pt.std();
        if std <= 1e-9 {
            if current_value != pt.mean {
                return Some(Detection {
                    mean: pt.mean,
                    std,
                    zscore: f64::INFINITY,
                });
            }
            return None;
        }

        let z = (current_value - pt.mean) / std;
        if z.abs() >= z_threshold {
            return Some(Detection {
                mean: pt.mean,
                std,
                zscore: z,
            });
        }

        None
    }

    pub fn tracked_keys(&self) -> usize {
        self.points.len()
    }
}

/// Interpolated percentile over unsorted samples. `p` in [0, 100].
pub fn percentile(values: &[f64], p: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    if p <= 0.0 {
        return sorted[0];
    }
    if p >= 100.0 {
        return sorted[sorted.len() - 1];
    }

    let k = (sorted.len() - 1) as f64 * (p / 100.0);
    let f = k.floor();
    let c = k.ceil();
    if f == c {
        return sorted[k as usize];
    }
    sorted[f as usize] * (c - k) + sorted[c as usize] * (k - f)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_update_seeds_baseline() {
        let mut pt = BaselinePoint::default();
        pt.update(42.0, 0.2);

        assert_eq!(pt.mean, 42.0);
        assert_eq!(pt.var, 0.0);
        assert_eq!(pt.n, 1);
        assert!(pt.last_update_ts > 0.0);
    }

    #[test]
    fn test_ewma_converges_on_constant_input() {
        let mut pt = BaselinePoint::default();
        pt.update(100.0, 0.2);
        // Perturb, then feed a long constant stream.
        pt.update(200.0, 0.2);

        let mut prev_gap = (pt.mean - 100.0).abs();
        for _ in 0..200 {
            pt.update(100.0, 0.2);
            let gap = (pt.mean - 100.0).abs();
            assert!(gap <= prev_gap);
            prev_gap = gap;
        }
        assert!((pt.mean - 100.0).abs() < 1e-6);
        assert!(pt.var < 1e-6);
    }

    #[test]
    fn test_variance_never_negative() {
        let mut pt = BaselinePoint::default();
        for x in [5.0, 5.0, 9.0, 1.0, 5.0, 5.0] {
            pt.update(x, 0.3);
            assert!(pt.var >= 0.0);
        }
    }

    #[test]
    fn test_detect_skipped_below_min_updates() {
        let mut model = BaselineModel::new();
        for _ in 0..4 {
            model.update("k", Metric::P95Ms, 20.0, 0.2);
        }
        assert!(model
            .detect_anomaly("k", Metric::P95Ms, 500.0, 3.0, 5)
            .is_none());
    }

    #[test]
    fn test_zero_variance_guard_flags_any_change() {
        let mut model = BaselineModel::new();
        for _ in 0..10 {
            model.update("k", Metric::P95Ms, 20.0, 0.2);
        }

        let det = model
            .detect_anomaly("k", Metric::P95Ms, 20.5, 3.0, 5)
            .expect("flat baseline must flag any deviation");
        assert_eq!(det.mean, 20.0);
        assert!(det.zscore.is_infinite());

        // Equal to the mean: not an anomaly.
        assert!(model
            .detect_anomaly("k", Metric::P95Ms, 20.0, 3.0, 5)
            .is_none());
    }

    #[test]
    fn test_zscore_detection_with_variance() {
        let mut model = BaselineModel::new();
        // Alternate to build up real variance.
        for x in [10.0, 12.0, 10.0, 12.0, 10.0, 12.0, 10.0, 12.0] {
            model.update("k", Metric::P50Ms, x, 0.3);
        }

        assert!(model
            .detect_anomaly("k", Metric::P50Ms, 11.0, 3.0, 5)
            .is_none());

        let det = model
            .detect_anomaly("k", Metric::P50Ms, 1000.0, 3.0, 5)
            .expect("large spike must be anomalous");
        assert!(det.zscore.is_finite());
        assert!(det.zscore > 3.0);
    }

    #[test]
    fn test_unseen_key_never_detects() {
        let model = BaselineModel::new();
        assert!(model
            .detect_anomaly("missing", Metric::P95Ms, 1.0, 3.0, 0)
            .is_none());
    }

    #[test]
    fn test_percentile_empty_and_extremes() {
        assert_eq!(percentile(&[], 50.0), 0.0);

        let vals = [4.0, 1.0, 3.0, 2.0];
        assert_eq!(percentile(&vals, 0.0), 1.0);
        assert_eq!(percentile(&vals, 100.0), 4.0);
    }

    #[test]
    fn test_percentile_interpolates() {
        let vals = [10.0, 20.0, 30.0, 40.0];
        // k = 3 * 0.5 = 1.5 -> halfway between 20 and 30.
        assert_eq!(percentile(&vals, 50.0), 25.0);
        // k = 3 * 0.95 = 2.85 -> 30 * 0.15 + 40 * 0.85.
        let p95 = percentile(&vals, 95.0);
        assert!((p95 - 38.5).abs() < 1e-9);
    }

    #[test]
    fn test_percentile_exact_index() {
        let vals = [10.0, 20.0, 30.0];
        // k = 2 * 0.5 = 1.0 exactly.
        assert_eq!(percentile(&vals, 50.0), 20.0);
    }
}
