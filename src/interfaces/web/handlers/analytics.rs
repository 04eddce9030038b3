use axum::{Json, extract::State};

use super::super::AppState;
use crate::core::analytics::{AnalyticsReport, analytics_report};

pub async fn analytics_endpoint(State(state): State<AppState>) -> Json<AnalyticsReport> {
    state.metrics.record_request();
    let report = analytics_report(state.store.as_ref()).await;
    Json(report)
}
