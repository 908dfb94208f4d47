//! CORS handling for the allow-listed origin set.
//!
//! Preflight (`OPTIONS`) requests are answered locally and never proxied.
//! Non-preflight responses echo `Access-Control-Allow-Origin` only when the
//! request's `Origin` header matches an entry in the allow-list.

use axum::http::{HeaderMap, HeaderValue, Response, StatusCode};

pub fn origin_header<'a>(headers: &'a HeaderMap) -> Option<&'a str> {
    headers.get(axum::http::header::ORIGIN)?.to_str().ok()
}

pub fn allowed_origin<'a>(origins: &'a [String], request_origin: Option<&str>) -> Option<&'a str> {
    let origin = request_origin?;
    origins.iter().find(|o| o.as_str() == origin).map(|s| s.as_str())
}

/// Build the local response to a CORS preflight request.
pub fn preflight_response(origins: &[String], headers: &HeaderMap) -> Response<axum::body::Body> {
    let mut builder = Response::builder().status(StatusCode::NO_CONTENT);

    if let Some(origin) = allowed_origin(origins, origin_header(headers)) {
        builder = builder
            .header(axum::http::header::ACCESS_CONTROL_ALLOW_ORIGIN, origin)
            .header(
                axum::http::header::ACCESS_CONTROL_ALLOW_METHODS,
                "GET, POST, PUT, PATCH, DELETE, OPTIONS",
            )
            .header(
                axum::http::header::ACCESS_CONTROL_ALLOW_HEADERS,
                "authorization, content-type, x-request-id",
            )
            .header(axum::http::header::ACCESS_CONTROL_MAX_AGE, "600");
    }

    builder.body(axum::body::Body::empty()).unwrap()
}

/// Echo `Access-Control-Allow-Origin` onto an already-built response, if the
/// request's origin matches the allow-list.
pub fn apply_cors_headers(
    resp: &mut Response<axum::body::Body>,
    origins: &[String],
    request_origin: Option<&str>,
) {
    if let Some(origin) = allowed_origin(origins, request_origin) {
        if let Ok(value) = HeaderValue::from_str(origin) {
            resp.headers_mut()
                .insert(axum::http::header::ACCESS_CONTROL_ALLOW_ORIGIN, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_exact_allow_listed_origin() {
        let origins = vec!["https://app.example.com".to_string()];
        assert_eq!(
            allowed_origin(&origins, Some("https://app.example.com")),
            Some("https://app.example.com")
        );
        assert_eq!(allowed_origin(&origins, Some("https://evil.example.com")), None);
        assert_eq!(allowed_origin(&origins, None), None);
    }
}
