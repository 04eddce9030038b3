use axum::{Json, extract::State};

use super::super::AppState;
use crate::core::metrics::MetricsSnapshot;

pub async fn metrics_endpoint(State(state): State<AppState>) -> Json<MetricsSnapshot> {
    state.metrics.record_request();
    Json(state.metrics.snapshot())
}
