use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use axum::{routing::get, Json, Router};
use chrono::{Duration as ChronoDuration, Utc};
use forgeerp_auth::{Hs256JwtValidator, JwtClaims, PrincipalId, Role};
use forgeerp_core::TenantId;
use forgeerp_gateway::config::GatewayConfig;
use forgeerp_gateway::{build_router, GatewayState};
use serde_json::json;

const SECRET: &str = "test-secret";

async fn spawn_backend() -> String {
    let app = Router::new()
        .route("/health", get(|| async { Json(json!({"status": "ok"})) }))
        .route(
            "/invoices/123",
            get(|| async { Json(json!({"id": "123", "status": "open"})) }),
        );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

async fn spawn_gateway(backend: &str) -> String {
    let mut targets = BTreeMap::new();
    for prefix in forgeerp_gateway::config::ROUTE_PREFIXES {
        targets.insert((*prefix).to_string(), backend.to_string());
    }
    let config = GatewayConfig {
        targets,
        jwt_secret: SECRET.as_bytes().to_vec(),
        cors_origins: vec!["https://app.example.com".to_string()],
        upstream_timeout: Duration::from_secs(5),
        health_timeout: Duration::from_secs(2),
        listen_addr: "127.0.0.1:0".to_string(),
    };

    let state = Arc::new(GatewayState::new(config));
    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
        )
        .await
        .unwrap();
    });
    format!("http://{addr}")
}

fn mint_token() -> String {
    let now = Utc::now();
    let claims = JwtClaims {
        sub: PrincipalId::new(),
        tenant_id: TenantId::new(),
        roles: vec![Role::new("admin")],
        session_id: uuid::Uuid::new_v4(),
        issued_at: now,
        expires_at: now + ChronoDuration::minutes(10),
    };
    Hs256JwtValidator::new(SECRET.as_bytes().to_vec())
        .issue(&claims)
        .unwrap()
}

#[tokio::test]
async fn health_is_exempt_and_unauthenticated() {
    let backend = spawn_backend().await;
    let gateway = spawn_gateway(&backend).await;

    let resp = reqwest::get(format!("{gateway}/health")).await.unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::OK);
}

#[tokio::test]
async fn missing_bearer_is_rejected_without_proxying() {
    let backend = spawn_backend().await;
    let gateway = spawn_gateway(&backend).await;

    let resp = reqwest::get(format!("{gateway}/invoices/123")).await.unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn valid_bearer_is_proxied_to_backend() {
    let backend = spawn_backend().await;
    let gateway = spawn_gateway(&backend).await;
    let token = mint_token();

    let client = reqwest::Client::new();
    let resp = client
        .get(format!("{gateway}/invoices/123"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), reqwest::StatusCode::OK);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["id"], "123");
}

#[tokio::test]
async fn unknown_route_prefix_is_not_found() {
    let backend = spawn_backend().await;
    let gateway = spawn_gateway(&backend).await;
    let token = mint_token();

    let client = reqwest::Client::new();
    let resp = client
        .get(format!("{gateway}/unknown-prefix"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), reqwest::StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn ready_aggregates_backend_health() {
    let backend = spawn_backend().await;
    let gateway = spawn_gateway(&backend).await;

    let resp = reqwest::get(format!("{gateway}/ready")).await.unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::OK);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert!(body["backends"]["invoices"]["healthy"].as_bool().unwrap());
}

#[tokio::test]
async fn cors_preflight_echoes_allow_listed_origin() {
    let backend = spawn_backend().await;
    let gateway = spawn_gateway(&backend).await;

    let client = reqwest::Client::new();
    let resp = client
        .request(reqwest::Method::OPTIONS, format!("{gateway}/invoices/123"))
        .header("Origin", "https://app.example.com")
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), reqwest::StatusCode::NO_CONTENT);
    assert_eq!(
        resp.headers().get("access-control-allow-origin").unwrap(),
        "https://app.example.com"
    );
}

#[tokio::test]
async fn cors_preflight_ignores_non_allow_listed_origin() {
    let backend = spawn_backend().await;
    let gateway = spawn_gateway(&backend).await;

    let client = reqwest::Client::new();
    let resp = client
        .request(reqwest::Method::OPTIONS, format!("{gateway}/invoices/123"))
        .header("Origin", "https://evil.example.com")
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), reqwest::StatusCode::NO_CONTENT);
    assert!(resp.headers().get("access-control-allow-origin").is_none());
}
