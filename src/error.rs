use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Failure taxonomy for the request pipeline.
///
/// The alert path absorbs `GenerationUnavailable` and `MalformedGenerationOutput`
/// into fallback results; everything that reaches a handler boundary surfaces as
/// HTTP 500 with a `detail` body, matching the external contract.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid request: {0}")]
    Validation(String),

    #[error("unsafe query rejected: {0}")]
    UnsafeQuery(String),

    #[error("query execution failed: {0}")]
    Execution(String),

    #[error("generation capability unavailable: {0}")]
    GenerationUnavailable(String),

    #[error("malformed generation output: {0}")]
    MalformedGenerationOutput(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({ "detail": self.to_string() });
        (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
    }
}
