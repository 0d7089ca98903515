use axum::http::StatusCode;
use crate::auth::identity::Identity;
use crate::models::{ApiError, ErrorResponse};

pub fn ensure_authenticated(identity: &Identity) -> Result<(), ApiError> {
    if identity.is_authenticated() {
        return Ok(());
    }
    Err(ErrorResponse::reject(StatusCode::UNAUTHORIZED, "Authentication required"))
}
