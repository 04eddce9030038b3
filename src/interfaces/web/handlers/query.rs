use std::time::Instant;

use axum::{Json, extract::State};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info};

use super::super::AppState;
use crate::core::narrator;
use crate::core::query::{synth, validate};
use crate::core::store::{NormalizedRow, QueryResult};
use crate::error::ApiError;

#[derive(Deserialize)]
pub struct QueryRequest {
    question: String,
}

/// Dashboard row summary, one per result row.
#[derive(Serialize)]
pub struct RowSummary {
    id: String,
    name: String,
    age: i64,
    #[serde(rename = "lastTest")]
    last_test: String,
    overdue: String,
}

#[derive(Serialize)]
pub struct QueryResponse {
    sql: String,
    results: Vec<RowSummary>,
    narrative: String,
    #[serde(rename = "executionTime")]
    execution_time: u64,
    truncated: bool,
}

fn summarize_row(row: &NormalizedRow) -> RowSummary {
    let id = row
        .get("patient_id")
        .and_then(Value::as_str)
        .unwrap_or("Unknown")
        .to_string();
    RowSummary {
        name: format!("Patient {id}"),
        age: row.get("age").and_then(Value::as_i64).unwrap_or(0),
        last_test: row
            .get("last_a1c_date")
            .map(|v| match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .unwrap_or_else(|| "N/A".to_string()),
        overdue: "N/A".to_string(),
        id,
    }
}

/// Question -> synthesizer -> validator -> executor -> narrator. The validator
/// sits between generation and execution; nothing generated runs unchecked.
async fn run_query(state: &AppState, question: &str) -> Result<QueryResponse, ApiError> {
    let started = Instant::now();

    let candidate = synth::synthesize(question, &state.table, state.llm.as_ref()).await?;
    let sql = validate::sanitize(&candidate)?;
    info!("Validated query: {}", sql);

    let result = match &state.store {
        Some(store) => store.execute(&sql).await?,
        // Degraded mode: answer with the empty result rather than failing.
        None => QueryResult::empty(),
    };

    let narrative = narrator::narrate_or_default(question, &result, state.llm.as_ref()).await;

    Ok(QueryResponse {
        sql,
        results: result.rows.iter().map(summarize_row).collect(),
        narrative,
        execution_time: started.elapsed().as_millis() as u64,
        truncated: result.truncated,
    })
}

pub async fn query_endpoint(
    State(state): State<AppState>,
    Json(payload): Json<QueryRequest>,
) -> Result<Json<QueryResponse>, ApiError> {
    state.metrics.record_request();
    let started = Instant::now();

    match run_query(&state, &payload.question).await {
        Ok(response) => Ok(Json(response)),
        Err(e) => {
            state.metrics.record_error();
            error!(
                "Query endpoint failed after {}ms: {}",
                started.elapsed().as_millis(),
                e
            );
            Err(e)
        }
    }
}
