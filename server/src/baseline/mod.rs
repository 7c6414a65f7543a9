//! Rolling-baseline anomaly and distribution-shift detection.
//!
//! Protocol neutral: reads the shared store's recent window and produces
//! anomaly events (baseline deviation on latency percentiles) and shift
//! events (distribution change across the grouping dimension), without
//! touching collectors.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

use crate::flow::{now_ts, FlowRecord};
use crate::store::FlowStore;

pub mod model;
pub mod shift;

use model::{percentile, BaselineModel, Metric};
use shift::{ShiftEvent, ShiftModel};

/// How flows are grouped for baseline and shift logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupMode {
    Exporter,
    Src,
    Dst,
    Pair,
    Proto,
}

impl GroupMode {
    pub fn as_str(self) -> &'static str {
        match self {
            GroupMode::Exporter => "exporter",
            GroupMode::Src => "src",
            GroupMode::Dst => "dst",
            GroupMode::Pair => "pair",
            GroupMode::Proto => "proto",
        }
    }
}

impl fmt::Display for GroupMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GroupMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "exporter" => Ok(GroupMode::Exporter),
            "src" => Ok(GroupMode::Src),
            "dst" => Ok(GroupMode::Dst),
            "pair" => Ok(GroupMode::Pair),
            "proto" => Ok(GroupMode::Proto),
            other => Err(format!(
                "unknown group mode '{other}' (expected exporter, src, dst, pair, or proto)"
            )),
        }
    }
}

fn group_key(record: &FlowRecord, mode: GroupMode) -> String {
    match mode {
        GroupMode::Exporter => match &record.exporter {
            Some(ip) => format!("exporter:{ip}"),
            None => "exporter:unknown".to_string(),
        },
        GroupMode::Src => format!("src:{}", record.src),
        GroupMode::Dst => format!("dst:{}", record.dst),
        GroupMode::Pair => format!("pair:{}->{}", record.src, record.dst),
        GroupMode::Proto => format!("proto:{}", record.proto),
    }
}

/// Runtime-settable parameters of the baseline capability.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BaselineSettings {
    pub window_seconds: u64,
    pub min_samples_per_key: usize,
    pub alpha: f64,
    pub z_threshold: f64,
    pub min_updates: u64,
    pub group_mode: GroupMode,
    pub cooldown_seconds: u64,
    pub shift_threshold: f64,
    pub shift_min_total: f64,
}

impl Default for BaselineSettings {
    fn default() -> Self {
        Self {
            window_seconds: 60,
            min_samples_per_key: 20,
            alpha: 0.15,
            z_threshold: 4.0,
            min_updates: 10,
            group_mode: GroupMode::Exporter,
            cooldown_seconds: 120,
            shift_threshold: 0.7,
            shift_min_total: 200.0,
        }
    }
}

/// Partial settings update; unset fields are left untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BaselineUpdate {
    pub window_seconds: Option<u64>,
    pub min_samples_per_key: Option<usize>,
    pub alpha: Option<f64>,
    pub z_threshold: Option<f64>,
    pub min_updates: Option<u64>,
    pub group_mode: Option<GroupMode>,
    pub cooldown_seconds: Option<u64>,
    pub shift_threshold: Option<f64>,
    pub shift_min_total: Option<f64>,
}

/// One baseline deviation on a (key, metric).
#[derive(Debug, Clone, Serialize)]
pub struct AnomalyEvent {
    pub key: String,
    pub metric: Metric,
    pub current: f64,
    pub baseline_mean: f64,
    pub baseline_std: f64,
    pub zscore: f64,
    pub window_seconds: u64,
    pub sample_count: usize,
    pub ts: f64,
}

/// Aggregate result of one analysis pass.
#[derive(Debug, Clone, Serialize)]
pub struct BaselineReport {
    pub group_mode: GroupMode,
    pub window_seconds: u64,
    pub keys_seen: usize,
    pub anomalies: Vec<AnomalyEvent>,
    pub shift: Option<ShiftEvent>,
}

struct BaselineState {
    settings: BaselineSettings,
    baseline: BaselineModel,
    shift: ShiftModel,
    last_alert_ts: HashMap<String, f64>,
}

impl BaselineState {
    fn in_cooldown(&self, alert_key: &str, now: f64) -> bool {
        let last = self.last_alert_ts.get(alert_key).copied().unwrap_or(0.0);
        now - last < self.settings.cooldown_seconds as f64
    }

    fn mark_alert(&mut self, alert_key: &str, now: f64) {
        self.last_alert_ts.insert(alert_key.to_string(), now);
    }
}

/// The baseline anomaly capability. All mutable state sits behind one
/// mutex; an analysis pass is a single synchronous unit of work.
pub struct BaselineAnomaly {
    pub name: &'static str,
    store: Arc<FlowStore>,
    state: Mutex<BaselineState>,
}

impl BaselineAnomaly {
    pub fn new(store: Arc<FlowStore>, settings: BaselineSettings) -> Self {
        Self {
            name: "baseline_anomaly",
            store,
            state: Mutex::new(BaselineState {
                settings,
                baseline: BaselineModel::new(),
                shift: ShiftModel::new(),
                last_alert_ts: HashMap::new(),
            }),
        }
    }

    /// Apply a partial settings update and return the current settings.
    pub async fn configure(&self, update: BaselineUpdate) -> BaselineSettings {
        let mut state = self.state.lock().await;
        let s = &mut state.settings;

        if let Some(v) = update.window_seconds {
            s.window_seconds = v;
        }
        if let Some(v) = update.min_samples_per_key {
            s.min_samples_per_key = v;
        }
        if let Some(v) = update.alpha {
            s.alpha = v;
        }
        if let Some(v) = update.z_threshold {
            s.z_threshold = v;
        }
        if let Some(v) = update.min_updates {
            s.min_updates = v;
        }
        if let Some(v) = update.group_mode {
            s.group_mode = v;
        }
        if let Some(v) = update.cooldown_seconds {
            s.cooldown_seconds = v;
        }
        if let Some(v) = update.shift_threshold {
            s.shift_threshold = v;
        }
        if let Some(v) = update.shift_min_total {
            s.shift_min_total = v;
        }

        s.clone()
    }

    pub async fn settings(&self) -> BaselineSettings {
        self.state.lock().await.settings.clone()
    }

    pub async fn status(&self) -> serde_json::Value {
        let state = self.state.lock().await;
        serde_json::json!({
            "name": self.name,
            "keys_tracked": state.baseline.tracked_keys(),
            "settings": state.settings,
        })
    }

    /// One analysis pass over the recent window.
    ///
    /// Detection runs against the prior baseline, and only then is the
    /// window value absorbed. The other order would let a single large
    /// spike drag the mean far enough to hide itself within the same
    /// pass.
    pub async fn analyze_once(&self) -> BaselineReport {
        let mut state = self.state.lock().await;
        let flows = self.store.recent(state.settings.window_seconds).await;

        let mut lat_by_key: HashMap<String, Vec<f64>> = HashMap::new();
        let mut count_by_key: HashMap<String, f64> = HashMap::new();

        for flow in &flows {
            let key = group_key(flow, state.settings.group_mode);
            lat_by_key
                .entry(key.clone())
                .or_default()
                .push(flow.latency_ms);
            *count_by_key.entry(key).or_insert(0.0) += 1.0;
        }

        let now = now_ts();
        let mut anomalies: Vec<AnomalyEvent> = Vec::new();
        let settings = state.settings.clone();

        for (key, lats) in &lat_by_key {
            if lats.len() < settings.min_samples_per_key {
                continue;
            }

            let p50 = percentile(lats, 50.0);
            let p95 = percentile(lats, 95.0);

            for (metric, current) in [(Metric::P50Ms, p50), (Metric::P95Ms, p95)] {
                // Detect first, update second.
                let detection = state.baseline.detect_anomaly(
                    key,
                    metric,
                    current,
                    settings.z_threshold,
                    settings.min_updates,
                );

                if let Some(det) = detection {
                    let alert_key = format!("anomaly:{key}:{metric}");
                    if !state.in_cooldown(&alert_key, now) {
                        anomalies.push(AnomalyEvent {
                            key: key.clone(),
                            metric,
                            current,
                            baseline_mean: det.mean,
                            baseline_std: det.std,
                            zscore: det.zscore,
                            window_seconds: settings.window_seconds,
                            sample_count: lats.len(),
                            ts: now,
                        });
                        state.mark_alert(&alert_key, now);
                    }
                }

                state.baseline.update(key, metric, current, settings.alpha);
            }
        }

        let dimension = format!("count_by_{}", settings.group_mode);
        let shift_event = state.shift.update_and_detect(
            &dimension,
            &count_by_key,
            settings.shift_threshold,
            settings.shift_min_total,
            settings.window_seconds,
        );

        let shift = match shift_event {
            Some(event) => {
                let alert_key = format!("shift:{}", event.dimension);
                if state.in_cooldown(&alert_key, now) {
                    None
                } else {
                    state.mark_alert(&alert_key, now);
                    Some(event)
                }
            }
            None => None,
        };

        debug!(
            keys = lat_by_key.len(),
            anomalies = anomalies.len(),
            shift = shift.is_some(),
            "baseline analysis pass"
        );

        BaselineReport {
            group_mode: settings.group_mode,
            window_seconds: settings.window_seconds,
            keys_seen: lat_by_key.len(),
            anomalies,
            shift,
        }
    }
}
