use axum::{
    extract::{Path, State},
    Json,
};
use serde::Deserialize;
use serde_json::json;

use super::{AppError, AppState};
use crate::registry::Capability;

/// Body for starting a collector; both fields fall back to the
/// collector's current endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct StartRequest {
    pub host: Option<String>,
    pub port: Option<u16>,
}

/// GET /api/v1/capabilities — sorted capability names.
pub async fn list(State(state): State<AppState>) -> Json<Vec<String>> {
    Json(state.registry.list())
}

/// GET /api/v1/capabilities/:name — capability status.
pub async fn status(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let cap = state.registry.get(&name).ok_or(AppError::NotFound)?;
    Ok(Json(cap.status().await))
}

/// POST /api/v1/capabilities/:name/start — start a collector.
pub async fn start(
    State(state): State<AppState>,
    Path(name): Path<String>,
    body: Option<Json<StartRequest>>,
) -> Result<Json<serde_json::Value>, AppError> {
    let cap = state.registry.get(&name).ok_or(AppError::NotFound)?;
    let collector = match cap {
        Capability::Collector(c) => c,
        Capability::Analyzer(_) => {
            return Err(AppError::Validation(format!(
                "capability '{name}' is not a collector"
            )))
        }
    };

    let req = body.map(|Json(r)| r).unwrap_or_default();
    let current = collector.status().await;
    let host = req.host.unwrap_or(current.host);
    let port = req.port.unwrap_or(current.port);

    let message = collector
        .start(&host, port)
        .await
        .map_err(|e| AppError::Internal(format!("failed to start '{name}': {e}")))?;

    Ok(Json(json!({
        "message": message,
        "status": collector.status().await,
    })))
}

/// POST /api/v1/capabilities/:name/stop — stop a collector.
pub async fn stop(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let cap = state.registry.get(&name).ok_or(AppError::NotFound)?;
    let collector = match cap {
        Capability::Collector(c) => c,
        Capability::Analyzer(_) => {
            return Err(AppError::Validation(format!(
                "capability '{name}' is not a collector"
            )))
        }
    };

    let message = collector.stop().await;
    Ok(Json(json!({ "message": message })))
}
