//! Health check endpoint for monitoring probes.

use axum::{response::IntoResponse, routing::get, Router};

use super::AppState;

/// Health check router
pub fn create_health_router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}

/// Always returns OK while the process is serving
pub async fn health_check() -> impl IntoResponse {
    "OK"
}
