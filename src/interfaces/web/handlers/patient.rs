use axum::{
    Json,
    extract::{Path, State},
};

use super::super::AppState;
use crate::core::patient::{PatientProfile, patient_profile};

pub async fn patient_endpoint(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Json<PatientProfile> {
    state.metrics.record_request();
    let profile = patient_profile(&id, state.store.as_ref(), state.llm.as_ref()).await;
    Json(profile)
}
