use crate::{
    docs::ApiDoc,
    handlers::{diagnostics, health_check, ready_check},
    routes::auth_middleware::identity_middleware,
    state::AppState,
    websocket::websocket_handler,
};
use axum::{http::{HeaderValue, Method}, middleware, routing::get, Router};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// Create API routes
pub fn create_api_routes() -> Router<Arc<AppState>> {
    Router::<Arc<AppState>>::new()
        .route("/health", get(health_check))
        .route("/ready", get(ready_check))
        .route("/v1/diagnostics", get(diagnostics))
}

/// Create the full application router
pub fn create_router(app_state: Arc<AppState>) -> Router {
    let cors = cors_layer(&app_state.config.cors_origin_list());

    let router = Router::new()
        // Mount API routes
        .nest("/api", create_api_routes())
        // Collaboration socket, with and without trailing slash
        .route("/ws/documents/:doc_id", get(websocket_handler))
        .route("/ws/documents/:doc_id/", get(websocket_handler))
        .with_state(app_state.clone())
        // Mount Swagger UI
        .merge(SwaggerUi::new("/swagger").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(middleware::from_fn_with_state(app_state, identity_middleware))
        // Add tracing layer
        .layer(TraceLayer::new_for_http());

    match cors {
        Some(cors) => router.layer(cors),
        None => router,
    }
}

fn cors_layer(origins: &[String]) -> Option<CorsLayer> {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin '{}'", origin);
                None
            }
        })
        .collect();

    if allowed.is_empty() {
        return None;
    }
    Some(
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(allowed))
            .allow_methods([Method::GET]),
    )
}
