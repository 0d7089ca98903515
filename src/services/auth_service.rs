use axum::http::{self};
use jsonwebtoken::{decode, Algorithm, DecodingKey, TokenData, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::auth::Identity;

/// Name of the cookie carrying the session token
pub const AUTH_COOKIE: &str = "auth_token";

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Missing Authorization header or Cookie")]
    MissingToken,
    #[error("Invalid {0} header")]
    InvalidHeader(&'static str),
    #[error("auth_token cookie not found")]
    CookieNotFound,
    #[error("JWT validation failed: {0}")]
    InvalidToken(#[from] jsonwebtoken::errors::Error),
    #[error("Can't extract a user id from subject '{0}'")]
    InvalidSubject(String),
    #[error("No JWT secret configured")]
    NoSecret,
}

/// Session token claims
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    #[serde(default)]
    pub username: Option<String>,
    pub exp: usize,
}

// Get the auth token from a request
pub fn get_auth_token<B>(req: &http::Request<B>) -> Result<String, AuthError> {
    // 1. Try to get token from Authorization header
    if let Some(auth_header) = req.headers().get(http::header::AUTHORIZATION) {
        let auth_str = auth_header
            .to_str()
            .map_err(|_| AuthError::InvalidHeader("Authorization"))?;
        Ok(auth_str
            .strip_prefix("Bearer ")
            .unwrap_or(auth_str)
            .to_string())
    }
    // 2. Try to get token from cookies
    else {
        let cookie_header = req
            .headers()
            .get(http::header::COOKIE)
            .ok_or(AuthError::MissingToken)?
            .to_str()
            .map_err(|_| AuthError::InvalidHeader("Cookie"))?;

        cookie::Cookie::split_parse(cookie_header)
            .flatten()
            .find(|c| c.name() == AUTH_COOKIE)
            .map(|c| c.value().to_string())
            .ok_or(AuthError::CookieNotFound)
    }
}

// Validate a JWT token and return the token data
pub fn validate_jwt(token: &str, secret: &str) -> Result<TokenData<Claims>, AuthError> {
    let validation = Validation::new(Algorithm::HS256);
    let decoding_key = DecodingKey::from_secret(secret.as_bytes());
    Ok(decode::<Claims>(token, &decoding_key, &validation)?)
}

/// Resolve the identity behind a token
pub fn identity_from_token(token: &str, secret: &str) -> Result<Identity, AuthError> {
    let claims = validate_jwt(token, secret)?.claims;
    let id = claims
        .sub
        .parse()
        .map_err(|_| AuthError::InvalidSubject(claims.sub.clone()))?;
    let username = claims.username.unwrap_or(claims.sub);
    Ok(Identity::user(id, username))
}

/// Resolve the caller of a request, falling back to anonymous on any failure
pub fn resolve_identity<B>(req: &http::Request<B>, secret: Option<&str>) -> Identity {
    let resolved = get_auth_token(req).and_then(|token| {
        let secret = secret.ok_or(AuthError::NoSecret)?;
        identity_from_token(&token, secret)
    });

    match resolved {
        Ok(identity) => {
            debug!("Resolved identity {}", identity.display_name());
            identity
        }
        Err(AuthError::MissingToken) | Err(AuthError::CookieNotFound) => Identity::Anonymous,
        Err(e) => {
            warn!("Treating caller as anonymous: {}", e);
            Identity::Anonymous
        }
    }
}
