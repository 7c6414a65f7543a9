use axum::{
    extract::{Query, State},
    Json,
};
use serde::{Deserialize, Serialize};

use super::AppState;
use crate::monitor::{LatencyAlert, LatencyAnalysis, MonitorSettings};

/// Body for the thresholds endpoint; every field optional.
#[derive(Debug, Default, Deserialize)]
pub struct ThresholdsRequest {
    pub threshold_ms: Option<f64>,
    pub window_seconds: Option<u64>,
    pub min_samples: Option<usize>,
    pub cooldown_seconds: Option<u64>,
}

/// Query parameters for the analyze endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct AnalyzeQuery {
    /// Window override; the monitor's window when absent.
    pub seconds: Option<u64>,
}

/// Combined result of one full monitoring pass.
#[derive(Debug, Serialize)]
pub struct MonitorOnceResponse {
    pub alerts: Vec<LatencyAlert>,
    pub analysis: LatencyAnalysis,
    pub alert_count: usize,
}

/// POST /api/v1/monitor/thresholds — partial update, returns current.
pub async fn set_thresholds(
    State(state): State<AppState>,
    body: Option<Json<ThresholdsRequest>>,
) -> Json<MonitorSettings> {
    let req = body.map(|Json(r)| r).unwrap_or_default();
    let mut monitor = state.monitor.lock().await;
    Json(monitor.set_thresholds(
        req.threshold_ms,
        req.window_seconds,
        req.min_samples,
        req.cooldown_seconds,
    ))
}

/// GET /api/v1/monitor/analyze — latency stats for the recent window.
pub async fn analyze(
    State(state): State<AppState>,
    Query(query): Query<AnalyzeQuery>,
) -> Json<LatencyAnalysis> {
    let monitor = state.monitor.lock().await;
    let window = query.seconds.unwrap_or(monitor.window_seconds);
    let records = state.store.recent(window).await;
    Json(monitor.analyze(&records))
}

/// POST /api/v1/monitor/once — analyze and build deduped alerts.
pub async fn monitor_once(State(state): State<AppState>) -> Json<MonitorOnceResponse> {
    let mut monitor = state.monitor.lock().await;
    let records = state.store.recent(monitor.window_seconds).await;
    let analysis = monitor.analyze(&records);
    let alerts = monitor.build_alerts(&analysis);

    Json(MonitorOnceResponse {
        alert_count: alerts.len(),
        alerts,
        analysis,
    })
}
