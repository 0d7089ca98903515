use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use colab_relay::db::MemoryDocumentStore;
use colab_relay::routes::create_router;
use colab_relay::services::auth_service::Claims;
use colab_relay::{AppState, Config};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;

const SECRET: &str = "http-secret";

fn app() -> axum::Router {
    let config = Config {
        auth_jwt_secret: Some(SECRET.to_string()),
        ..Config::default()
    };
    create_router(Arc::new(AppState::new(config, Arc::new(MemoryDocumentStore::new()))))
}

async fn get(uri: &str, bearer: Option<String>) -> (StatusCode, Value) {
    let mut request = Request::builder().uri(uri);
    if let Some(token) = bearer {
        request = request.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let response = app()
        .oneshot(request.body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&body).unwrap_or(Value::Null))
}

#[tokio::test]
async fn health_and_ready_report_ok() {
    let (status, body) = get("/api/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "colab-relay");

    let (status, body) = get("/api/ready", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Service is ready");
}

#[tokio::test]
async fn diagnostics_require_an_authenticated_caller() {
    let (status, body) = get("/api/v1/diagnostics", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], 401);

    let claims = Claims {
        sub: "1".to_string(),
        username: Some("admin".to_string()),
        exp: 4_102_444_800,
    };
    let token = encode(&Header::default(), &claims, &EncodingKey::from_secret(SECRET.as_bytes())).unwrap();
    let (status, body) = get("/api/v1/diagnostics", Some(token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["n_conn"], 0);
    assert_eq!(body["n_groups"], 0);
}

#[tokio::test]
async fn openapi_document_is_served() {
    let (status, body) = get("/api-docs/openapi.json", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["paths"]["/api/health"].is_object());
}
