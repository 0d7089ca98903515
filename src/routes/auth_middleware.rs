use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

use crate::services::auth_service::resolve_identity;
use crate::state::AppState;

/// Resolve the caller and hand it to downstream handlers as an `Identity` extension.
///
/// Never rejects: unauthenticated callers continue as anonymous and each
/// handler decides what anonymous may do.
pub async fn identity_middleware(
    State(app_state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Response {
    let identity = resolve_identity(&req, app_state.config.auth_jwt_secret.as_deref());
    req.extensions_mut().insert(identity);
    next.run(req).await
}
