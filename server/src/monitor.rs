use std::collections::HashMap;

use serde::Serialize;

use crate::dedupe::AlertDeduper;
use crate::flow::{now_ts, FlowRecord};

/// Per-flow latency statistics over one analysis window.
#[derive(Debug, Clone, Serialize)]
pub struct FlowStats {
    pub flow: String,
    pub samples: usize,
    pub avg_ms: f64,
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub max_ms: f64,
}

/// Result of one `analyze` pass.
#[derive(Debug, Clone, Serialize)]
pub struct LatencyAnalysis {
    pub window_seconds: u64,
    pub threshold_ms: f64,
    pub min_samples: usize,
    pub offenders: Vec<FlowStats>,
    pub top: Vec<FlowStats>,
}

/// Alert emitted for an offender that passed dedupe.
#[derive(Debug, Clone, Serialize)]
pub struct LatencyAlert {
    #[serde(rename = "type")]
    pub alert_type: &'static str,
    pub flow: String,
    pub p95_ms: f64,
    pub threshold_ms: f64,
    pub samples: usize,
    pub ts: f64,
    pub message: String,
}

/// Current monitor parameters, returned by `set_thresholds`.
#[derive(Debug, Clone, Serialize)]
pub struct MonitorSettings {
    pub threshold_ms: f64,
    pub window_seconds: u64,
    pub min_samples: usize,
    pub cooldown_seconds: u64,
}

/// Protocol-neutral latency monitor.
///
/// Works on [`FlowRecord`]s only, never on raw protocol packets. An
/// offender is a flow whose windowed p95 latency meets the threshold with
/// at least `min_samples` samples; offenders become alerts at most once
/// per cooldown interval per flow key.
pub struct LatencyMonitor {
    pub threshold_ms: f64,
    pub window_seconds: u64,
    pub min_samples: usize,
    deduper: AlertDeduper,
}

impl LatencyMonitor {
    pub fn new(
        threshold_ms: f64,
        window_seconds: u64,
        min_samples: usize,
        cooldown_seconds: u64,
    ) -> Self {
        Self {
            threshold_ms,
            window_seconds,
            min_samples,
            deduper: AlertDeduper::new(cooldown_seconds),
        }
    }

    /// Update monitor parameters at runtime; unset fields are untouched.
    pub fn set_thresholds(
        &mut self,
        threshold_ms: Option<f64>,
        window_seconds: Option<u64>,
        min_samples: Option<usize>,
        cooldown_seconds: Option<u64>,
    ) -> MonitorSettings {
        if let Some(v) = threshold_ms {
            self.threshold_ms = v;
        }
        if let Some(v) = window_seconds {
            self.window_seconds = v;
        }
        if let Some(v) = min_samples {
            self.min_samples = v;
        }
        if let Some(v) = cooldown_seconds {
            self.deduper.cooldown_seconds = v;
        }

        MonitorSettings {
            threshold_ms: self.threshold_ms,
            window_seconds: self.window_seconds,
            min_samples: self.min_samples,
            cooldown_seconds: self.deduper.cooldown_seconds,
        }
    }

    /// Compute latency stats per flow key.
    ///
    /// Percentiles use nearest-rank indexing into the sorted sample list
    /// (the baseline capability interpolates instead; the two paths are
    /// intentionally different).
    pub fn analyze(&self, records: &[FlowRecord]) -> LatencyAnalysis {
        let mut groups: HashMap<String, Vec<f64>> = HashMap::new();
        for record in records {
            groups.entry(record.key()).or_default().push(record.latency_ms);
        }

        let mut offenders: Vec<FlowStats> = Vec::new();
        let mut summary: Vec<FlowStats> = Vec::new();

        for (key, mut vals) in groups {
            if vals.is_empty() {
                continue;
            }
            vals.sort_by(f64::total_cmp);

            let n = vals.len();
            let p50 = vals[(0.50 * (n - 1) as f64) as usize];
            let p95 = vals[(0.95 * (n - 1) as f64) as usize];
            let avg = vals.iter().sum::<f64>() / n as f64;
            let max = vals[n - 1];

            let row = FlowStats {
                flow: key,
                samples: n,
                avg_ms: avg,
                p50_ms: p50,
                p95_ms: p95,
                max_ms: max,
            };

            if n >= self.min_samples && p95 >= self.threshold_ms {
                offenders.push(row.clone());
            }
            summary.push(row);
        }

        offenders.sort_by(|a, b| b.p95_ms.total_cmp(&a.p95_ms));
        summary.sort_by(|a, b| b.p95_ms.total_cmp(&a.p95_ms));
        offenders.truncate(50);
        summary.truncate(50);

        LatencyAnalysis {
            window_seconds: self.window_seconds,
            threshold_ms: self.threshold_ms,
            min_samples: self.min_samples,
            offenders,
            top: summary,
        }
    }

    /// Convert offenders to alerts, applying dedupe. Alerts are returned
    /// as data; delivery is up to the caller.
    pub fn build_alerts(&mut self, analysis: &LatencyAnalysis) -> Vec<LatencyAlert> {
        let mut alerts = Vec::new();

        for off in &analysis.offenders {
            if self.deduper.should_alert(&off.flow) {
                alerts.push(LatencyAlert {
                    alert_type: "latency_threshold",
                    flow: off.flow.clone(),
                    p95_ms: off.p95_ms,
                    threshold_ms: analysis.threshold_ms,
                    samples: off.samples,
                    ts: now_ts(),
                    message: format!(
                        "p95 latency {:.1} ms exceeds threshold {:.1} ms",
                        off.p95_ms, analysis.threshold_ms
                    ),
                });
            }
        }

        alerts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(latency_ms: f64) -> FlowRecord {
        FlowRecord {
            ts: now_ts(),
            src: "10.0.0.1".to_string(),
            dst: "10.0.0.2".to_string(),
            src_port: 1234,
            dst_port: 80,
            proto: "TCP".to_string(),
            latency_ms,
            bytes: 0,
            packets: 0,
            exporter: None,
        }
    }

    #[test]
    fn test_single_offender_detected() {
        let monitor = LatencyMonitor::new(150.0, 300, 5, 120);
        let records: Vec<FlowRecord> =
            [10.0, 20.0, 30.0, 200.0, 220.0].iter().map(|&l| record(l)).collect();

        let analysis = monitor.analyze(&records);
        assert_eq!(analysis.offenders.len(), 1);
        assert_eq!(analysis.offenders[0].flow, "10.0.0.1:1234->10.0.0.2:80/TCP");
        assert_eq!(analysis.offenders[0].samples, 5);
        // Nearest-rank p95 of 5 samples: sorted[(0.95 * 4) as usize] = sorted[3].
        assert_eq!(analysis.offenders[0].p95_ms, 200.0);
        assert_eq!(analysis.offenders[0].p50_ms, 30.0);
        assert_eq!(analysis.offenders[0].max_ms, 220.0);
    }

    #[test]
    fn test_below_min_samples_not_an_offender() {
        let monitor = LatencyMonitor::new(150.0, 300, 5, 120);
        let records: Vec<FlowRecord> = [500.0, 500.0].iter().map(|&l| record(l)).collect();

        let analysis = monitor.analyze(&records);
        assert!(analysis.offenders.is_empty());
        assert_eq!(analysis.top.len(), 1);
    }

    #[test]
    fn test_below_threshold_not_an_offender() {
        let monitor = LatencyMonitor::new(150.0, 300, 5, 120);
        let records: Vec<FlowRecord> =
            [10.0, 12.0, 14.0, 16.0, 18.0].iter().map(|&l| record(l)).collect();

        let analysis = monitor.analyze(&records);
        assert!(analysis.offenders.is_empty());
    }

    #[test]
    fn test_alerts_deduped_within_cooldown() {
        let mut monitor = LatencyMonitor::new(150.0, 300, 5, 120);
        let records: Vec<FlowRecord> =
            [10.0, 20.0, 30.0, 200.0, 220.0].iter().map(|&l| record(l)).collect();

        let analysis = monitor.analyze(&records);
        let first = monitor.build_alerts(&analysis);
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].alert_type, "latency_threshold");
        assert_eq!(first[0].p95_ms, 200.0);
        assert!(first[0].message.contains("exceeds threshold"));

        // Same offender again within cooldown: suppressed.
        let second = monitor.build_alerts(&analysis);
        assert!(second.is_empty());
    }

    #[test]
    fn test_set_thresholds_partial_update() {
        let mut monitor = LatencyMonitor::new(150.0, 300, 5, 120);
        let settings = monitor.set_thresholds(Some(90.0), None, Some(10), None);

        assert_eq!(settings.threshold_ms, 90.0);
        assert_eq!(settings.window_seconds, 300);
        assert_eq!(settings.min_samples, 10);
        assert_eq!(settings.cooldown_seconds, 120);
    }

    #[test]
    fn test_summary_sorted_by_p95_descending() {
        let monitor = LatencyMonitor::new(1000.0, 300, 1, 120);
        let mut records = Vec::new();
        for (dst, latency) in [("10.0.0.2", 10.0), ("10.0.0.3", 50.0), ("10.0.0.4", 30.0)] {
            let mut r = record(latency);
            r.dst = dst.to_string();
            records.push(r);
        }

        let analysis = monitor.analyze(&records);
        let p95s: Vec<f64> = analysis.top.iter().map(|s| s.p95_ms).collect();
        assert_eq!(p95s, vec![50.0, 30.0, 10.0]);
    }
}
