use axum::{extract::State, http::StatusCode, Json};
use std::sync::Arc;
use tracing::{debug, error};

use crate::models::{ApiError, ErrorResponse, HealthResponse};
use crate::state::AppState;

/// Health check endpoint
pub async fn health_check(State(app_state): State<Arc<AppState>>) -> Json<HealthResponse> {
    debug!("Health check requested");
    Json(HealthResponse {
        status: "ok".to_string(),
        service: app_state.config.service_name.clone(),
        message: "Server is running".to_string(),
    })
}

/// Readiness check endpoint, fails while the document store is unreachable
pub async fn ready_check(
    State(app_state): State<Arc<AppState>>,
) -> Result<Json<HealthResponse>, ApiError> {
    debug!("Readiness check requested");
    if let Err(e) = app_state.store.ping().await {
        error!("Document store not ready: {}", e);
        return Err(ErrorResponse::reject(
            StatusCode::SERVICE_UNAVAILABLE,
            "Document store unavailable",
        ));
    }

    Ok(Json(HealthResponse {
        status: "ok".to_string(),
        service: app_state.config.service_name.clone(),
        message: "Service is ready".to_string(),
    }))
}
