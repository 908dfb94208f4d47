//! Reverse-proxy forwarding: builds an upstream request from an inbound one,
//! decorates it with forwarding/trace headers, and relays the response back.

use std::net::SocketAddr;
use std::time::Duration;

use axum::body::Body;
use axum::http::{HeaderMap, HeaderName, HeaderValue, Request, Response, StatusCode};
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("upstream request failed: {0}")]
    Upstream(#[from] reqwest::Error),
    #[error("upstream request timed out")]
    Timeout,
}

/// Forward `req` to `target_base_url`, preserving path/query/method/body and
/// adding `X-Forwarded-For`, `X-Forwarded-Host`, and a fresh `X-Request-ID`.
/// Bounded by `timeout`; a timeout or connection failure surfaces as `502`.
pub async fn forward(
    client: &reqwest::Client,
    target_base_url: &str,
    req: Request<Body>,
    client_addr: Option<SocketAddr>,
    timeout: Duration,
) -> Result<Response<Body>, ProxyError> {
    let (parts, body) = req.into_parts();
    let path_and_query = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let url = format!("{target_base_url}{path_and_query}");

    let body_bytes = axum::body::to_bytes(body, usize::MAX)
        .await
        .unwrap_or_default();

    let request_id = Uuid::now_v7().to_string();

    let mut headers = parts.headers.clone();
    headers.remove(axum::http::header::HOST);
    if let Some(addr) = client_addr {
        append_forwarded_for(&mut headers, &addr.ip().to_string());
    }
    if let Some(host) = parts.headers.get(axum::http::header::HOST) {
        headers.insert(
            HeaderName::from_static("x-forwarded-host"),
            host.clone(),
        );
    }
    headers.insert(
        HeaderName::from_static("x-request-id"),
        HeaderValue::from_str(&request_id).expect("uuid is valid header value"),
    );

    let upstream = client
        .request(parts.method, url)
        .headers(headers)
        .body(body_bytes)
        .timeout(timeout)
        .send()
        .await
        .map_err(|e| {
            if e.is_timeout() {
                ProxyError::Timeout
            } else {
                ProxyError::Upstream(e)
            }
        })?;

    let status = upstream.status();
    let resp_headers = upstream.headers().clone();
    let resp_bytes = upstream.bytes().await?;

    let mut builder = Response::builder().status(StatusCode::from_u16(status.as_u16()).unwrap_or(StatusCode::BAD_GATEWAY));
    for (name, value) in resp_headers.iter() {
        builder = builder.header(name, value);
    }
    builder = builder.header(HeaderName::from_static("x-request-id"), request_id);

    Ok(builder.body(Body::from(resp_bytes)).unwrap())
}

fn append_forwarded_for(headers: &mut HeaderMap, client_ip: &str) {
    let value = match headers.get(HeaderName::from_static("x-forwarded-for")) {
        Some(existing) if !existing.is_empty() => {
            format!("{}, {}", existing.to_str().unwrap_or(""), client_ip)
        }
        _ => client_ip.to_string(),
    };
    if let Ok(v) = HeaderValue::from_str(&value) {
        headers.insert(HeaderName::from_static("x-forwarded-for"), v);
    }
}
