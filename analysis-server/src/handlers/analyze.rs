//! Analysis handler
//!
//! Decodes the artifact, runs every supporting detector and returns the
//! aggregated verdict. Detection runs on the blocking pool; the shared
//! registry is read-only.

use axum::{extract::rejection::JsonRejection, extract::State, Json};

use scamwatch_core::logic::telemetry::{self, AuditEvent};
use scamwatch_core::logic::wire::{AnalyzeRequest, AnalyzeResponse};

use crate::{AppError, AppResult, AppState};

pub async fn analyze(
    State(state): State<AppState>,
    payload: Result<Json<AnalyzeRequest>, JsonRejection>,
) -> AppResult<Json<AnalyzeResponse>> {
    let Json(request) = payload?;

    if request.source_identifier.trim().is_empty() {
        return Err(AppError::ValidationError("source_identifier is required".into()));
    }

    let source = request.source_identifier.clone();
    let channel = request.channel();
    let registry = state.registry.clone();

    let result = tokio::task::spawn_blocking(move || registry.analyze_request(request)).await?;

    match result {
        Ok(verdict) => {
            tracing::info!(
                source = %source,
                channel = %verdict.channel(),
                confidence = verdict.confidence(),
                findings = verdict.findings().len(),
                "Verdict issued"
            );
            telemetry::record(AuditEvent::verdict_issued(&source, &verdict));
            Ok(Json(AnalyzeResponse::from_verdict(&verdict)))
        }
        Err(e) => {
            tracing::warn!(source = %source, kind = e.kind(), "No verdict: {}", e);
            Ok(Json(AnalyzeResponse::from_error(channel, &e)))
        }
    }
}
