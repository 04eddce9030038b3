use std::time::Instant;

use axum::{Json, extract::State};
use tracing::info;

use super::super::AppState;
use crate::core::radar::{RadarReport, run_radar};

/// Radar scan. Generation and store failures are absorbed inside the pipeline,
/// so this endpoint always answers 200 with a contract-shaped report.
pub async fn alerts_endpoint(State(state): State<AppState>) -> Json<RadarReport> {
    state.metrics.record_request();
    let started = Instant::now();

    let report = run_radar(state.store.as_ref(), state.llm.as_ref()).await;

    info!(
        "Alerts endpoint served {} alerts in {}ms",
        report.alerts.len(),
        started.elapsed().as_millis()
    );
    Json(report)
}
