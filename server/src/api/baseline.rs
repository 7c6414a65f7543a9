use std::sync::Arc;

use axum::{extract::State, Json};
use serde::Deserialize;

use super::{AppError, AppState};
use crate::baseline::{
    BaselineAnomaly, BaselineReport, BaselineSettings, BaselineUpdate, GroupMode,
};

/// Body for the configure endpoint; every field optional. `group_mode`
/// arrives as a string so an unknown mode can be rejected with a useful
/// validation message.
#[derive(Debug, Default, Deserialize)]
pub struct ConfigureRequest {
    pub window_seconds: Option<u64>,
    pub min_samples_per_key: Option<usize>,
    pub alpha: Option<f64>,
    pub z_threshold: Option<f64>,
    pub min_updates: Option<u64>,
    pub group_mode: Option<String>,
    pub cooldown_seconds: Option<u64>,
    pub shift_threshold: Option<f64>,
    pub shift_min_total: Option<f64>,
}

fn baseline(state: &AppState) -> Result<Arc<BaselineAnomaly>, AppError> {
    state.baseline.clone().ok_or_else(|| {
        AppError::ServiceUnavailable("baseline_anomaly capability is not loaded".to_string())
    })
}

/// POST /api/v1/baseline/configure — partial update, returns current.
pub async fn configure(
    State(state): State<AppState>,
    body: Option<Json<ConfigureRequest>>,
) -> Result<Json<BaselineSettings>, AppError> {
    let capability = baseline(&state)?;
    let req = body.map(|Json(r)| r).unwrap_or_default();

    let group_mode = match req.group_mode {
        Some(raw) => Some(raw.parse::<GroupMode>().map_err(AppError::Validation)?),
        None => None,
    };

    let update = BaselineUpdate {
        window_seconds: req.window_seconds,
        min_samples_per_key: req.min_samples_per_key,
        alpha: req.alpha,
        z_threshold: req.z_threshold,
        min_updates: req.min_updates,
        group_mode,
        cooldown_seconds: req.cooldown_seconds,
        shift_threshold: req.shift_threshold,
        shift_min_total: req.shift_min_total,
    };

    Ok(Json(capability.configure(update).await))
}

/// POST /api/v1/baseline/analyze — one analysis pass.
pub async fn analyze_once(
    State(state): State<AppState>,
) -> Result<Json<BaselineReport>, AppError> {
    let capability = baseline(&state)?;
    Ok(Json(capability.analyze_once().await))
}
