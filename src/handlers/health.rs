use axum::{extract::State, Json};
use crate::AppState;
use crate::models::{HealthResponse, ReadyResponse};
use tracing::debug;

/// Health check endpoint
pub async fn health_check(State(app_state): State<AppState>) -> Json<HealthResponse> {
    debug!("Health check requested");
    Json(HealthResponse {
        status: "ok".to_string(),
        message: format!("{} is running", app_state.config.cloud_service_name),
    })
}

/// Readiness check endpoint
pub async fn ready_check(State(app_state): State<AppState>) -> Json<ReadyResponse> {
    debug!("Readiness check requested");
    Json(ReadyResponse {
        status: "ok".to_string(),
        message: "Service is ready".to_string(),
        connections: app_state.broker.connection_count().await,
    })
}
