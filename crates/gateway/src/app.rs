//! Router assembly: auth gate, CORS, routing-table lookup, proxying, health.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::{Method, Request, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::any;
use axum::Router;

use forgeerp_auth::{Hs256JwtValidator, JwtValidator};

use crate::config::GatewayConfig;
use crate::{auth, cors, health, proxy};

pub struct GatewayState {
    pub config: GatewayConfig,
    pub jwt: Arc<dyn JwtValidator>,
    pub http_client: reqwest::Client,
}

impl GatewayState {
    pub fn new(config: GatewayConfig) -> Self {
        let jwt = Arc::new(Hs256JwtValidator::new(config.jwt_secret.clone()));
        let http_client = reqwest::Client::builder()
            .build()
            .expect("reqwest client config is static and always valid");
        Self {
            config,
            jwt,
            http_client,
        }
    }
}

pub fn build_router(state: Arc<GatewayState>) -> Router {
    Router::new()
        .route("/health", any(health_handler))
        .route("/live", any(health_handler))
        .route("/ready", any(ready_handler))
        .fallback(any(gateway_handler))
        .with_state(state)
}

async fn health_handler() -> impl IntoResponse {
    Json(health::HealthBody::ok("forgeerp-gateway"))
}

async fn ready_handler(State(state): State<Arc<GatewayState>>) -> impl IntoResponse {
    let body = health::aggregate_readiness(
        &state.http_client,
        &state.config.targets,
        state.config.health_timeout,
    )
    .await;
    Json(body)
}

/// Single entrypoint for every other path: CORS preflight, auth gate, route
/// lookup, proxy.
async fn gateway_handler(
    State(state): State<Arc<GatewayState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    req: Request<Body>,
) -> Response {
    let path = req.uri().path().to_string();
    let request_origin = cors::origin_header(req.headers()).map(str::to_string);

    if req.method() == Method::OPTIONS {
        return cors::preflight_response(&state.config.cors_origins, req.headers());
    }

    if !auth::is_auth_exempt(&path) {
        if let Err(status) = auth::check_bearer(req.headers(), &*state.jwt) {
            return unauthenticated_response(status);
        }
    }

    let Some((_, target)) = state.config.target_for_path(&path) else {
        return not_found_response(&path);
    };

    let mut response = match proxy::forward(
        &state.http_client,
        target,
        req,
        Some(addr),
        state.config.upstream_timeout,
    )
    .await
    {
        Ok(resp) => resp,
        Err(e) => bad_gateway_response(&e),
    };

    cors::apply_cors_headers(&mut response, &state.config.cors_origins, request_origin.as_deref());
    response
}

fn unauthenticated_response(status: StatusCode) -> Response {
    (
        status,
        Json(serde_json::json!({
            "error": "missing or invalid bearer credential",
            "code": "Unauthorized",
            "status": status.as_u16(),
            "success": false,
        })),
    )
        .into_response()
}

fn not_found_response(path: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({
            "error": format!("no route configured for path {path}"),
            "code": "NotFound",
            "status": 404,
            "success": false,
        })),
    )
        .into_response()
}

fn bad_gateway_response(err: &proxy::ProxyError) -> Response {
    let status = match err {
        proxy::ProxyError::Timeout => StatusCode::GATEWAY_TIMEOUT,
        proxy::ProxyError::Upstream(_) => StatusCode::BAD_GATEWAY,
    };
    (
        status,
        Json(serde_json::json!({
            "error": err.to_string(),
            "code": "Internal",
            "status": status.as_u16(),
            "success": false,
        })),
    )
        .into_response()
}
