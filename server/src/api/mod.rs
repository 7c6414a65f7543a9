use axum::http::{header, Method};
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::cors::CorsLayer;

use crate::baseline::BaselineAnomaly;
use crate::monitor::LatencyMonitor;
use crate::registry::CapabilityRegistry;
use crate::store::FlowStore;

pub mod baseline;
pub mod capabilities;
pub mod error;
pub mod monitor;

pub use error::AppError;

/// Shared application state available to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<FlowStore>,
    pub registry: Arc<CapabilityRegistry>,
    pub monitor: Arc<Mutex<LatencyMonitor>>,
    /// The baseline capability, when it was loaded into the registry.
    pub baseline: Option<Arc<BaselineAnomaly>>,
}

impl AppState {
    pub fn new(
        store: Arc<FlowStore>,
        registry: Arc<CapabilityRegistry>,
        monitor: LatencyMonitor,
    ) -> Self {
        let baseline = registry.baseline();
        Self {
            store,
            registry,
            monitor: Arc::new(Mutex::new(monitor)),
            baseline,
        }
    }
}

/// Build the main application router with all API routes.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::AllowOrigin::mirror_request())
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE])
        .allow_credentials(true);

    let api_routes = Router::new()
        .route("/health", get(health))
        // Capabilities
        .route("/capabilities", get(capabilities::list))
        .route("/capabilities/:name", get(capabilities::status))
        .route("/capabilities/:name/start", post(capabilities::start))
        .route("/capabilities/:name/stop", post(capabilities::stop))
        // Latency monitor
        .route("/monitor/thresholds", post(monitor::set_thresholds))
        .route("/monitor/analyze", get(monitor::analyze))
        .route("/monitor/once", post(monitor::monitor_once))
        // Baseline anomaly capability
        .route("/baseline/configure", post(baseline::configure))
        .route("/baseline/analyze", post(baseline::analyze_once));

    Router::new()
        .nest("/api/v1", api_routes)
        .layer(cors)
        .with_state(state)
}

/// Simple health check endpoint.
async fn health() -> &'static str {
    "ok"
}
