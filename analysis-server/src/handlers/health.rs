//! Health check handler
//!
//! Ready once the detector set is loaded. Missing optional capabilities
//! make the service `degraded`, not unready: the affected detector answers
//! with `DependencyUnavailable` instead.

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;

use scamwatch_core::logic::detector::Capabilities;

use crate::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    ready: bool,
    version: &'static str,
    timestamp: i64,
    uptime_secs: u64,
    detectors: Vec<&'static str>,
    capabilities: Capabilities,
}

pub async fn check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let detectors = state.registry.names();
    let capabilities = state.registry.capabilities().clone();
    let ready = !detectors.is_empty();

    let status = match (ready, capabilities.is_ready()) {
        (false, _) => "not_ready",
        (true, true) => "ready",
        (true, false) => "degraded",
    };
    let code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };

    (
        code,
        Json(HealthResponse {
            status,
            ready,
            version: env!("CARGO_PKG_VERSION"),
            timestamp: chrono::Utc::now().timestamp(),
            uptime_secs: state.started.elapsed().as_secs(),
            detectors,
            capabilities,
        }),
    )
}
