use utoipa::OpenApi;
use crate::models::*;

/// Health check endpoint
#[utoipa::path(
    get,
    path = "/api/health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse)
    )
)]
#[allow(dead_code)]
pub async fn health_check_doc() {}

/// Readiness check endpoint
#[utoipa::path(
    get,
    path = "/api/ready",
    responses(
        (status = 200, description = "Document store reachable", body = HealthResponse),
        (status = 503, description = "Document store unavailable", body = ErrorResponse)
    )
)]
#[allow(dead_code)]
pub async fn ready_check_doc() {}

/// Session and process diagnostics
#[utoipa::path(
    get,
    path = "/api/v1/diagnostics",
    responses(
        (status = 200, description = "Current diagnostics", body = DiagnosticsResponse),
        (status = 401, description = "Caller is not authenticated", body = ErrorResponse)
    )
)]
#[allow(dead_code)]
pub async fn diagnostics_doc() {}

/// Collaboration socket for one document
#[utoipa::path(
    get,
    path = "/ws/documents/{doc_id}/",
    params(("doc_id" = i64, Path, description = "Document id")),
    responses(
        (status = 101, description = "Upgraded to a collaboration session"),
        (status = 403, description = "Caller may not access the document")
    )
)]
#[allow(dead_code)]
pub async fn websocket_doc() {}

#[derive(OpenApi)]
#[openapi(
    paths(
        health_check_doc,
        ready_check_doc,
        diagnostics_doc,
        websocket_doc,
    ),
    components(
        schemas(HealthResponse, ErrorResponse, DiagnosticsResponse)
    ),
    tags(
        (name = "api", description = "API endpoints")
    )
)]
pub struct ApiDoc;
