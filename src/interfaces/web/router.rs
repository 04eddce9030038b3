use axum::{
    Router,
    http::{HeaderValue, Method},
    routing::{get, post},
};
use tower_http::cors::CorsLayer;

use super::AppState;
use super::handlers::{analytics, metrics, patient, query, radar};

/// Allow the local dashboard dev servers (Vite and CRA defaults).
fn build_dashboard_cors() -> CorsLayer {
    let origins: Vec<HeaderValue> =
        ["http://localhost:3000", "http://localhost:5173"].iter().filter_map(|o| o.parse().ok()).collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(tower_http::cors::Any)
}

pub fn build_api_router(state: AppState) -> Router {
    Router::new()
        .route("/api/query", post(query::query_endpoint))
        .route("/api/alerts", get(radar::alerts_endpoint))
        .route("/api/patient/{id}", get(patient::patient_endpoint))
        .route("/api/analytics", get(analytics::analytics_endpoint))
        .route("/api/metrics", get(metrics::metrics_endpoint))
        .layer(build_dashboard_cors())
        .with_state(state)
}
