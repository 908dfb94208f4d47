//! Bearer-credential gate in front of every proxied request.
//!
//! The gateway validates the JWT itself (signature + expiry, via the same
//! `Hs256JwtValidator` downstream services use) so an invalid or missing
//! token never reaches a backend. Health and auth-onramp paths are exempt.

use axum::http::{HeaderMap, StatusCode};
use chrono::Utc;

use forgeerp_auth::JwtValidator;

use crate::config::{AUTH_EXEMPT_EXACT, AUTH_EXEMPT_PREFIX};

/// Returns `true` when `path` must be forwarded without a bearer credential.
pub fn is_auth_exempt(path: &str) -> bool {
    AUTH_EXEMPT_EXACT.contains(&path) || path.starts_with(AUTH_EXEMPT_PREFIX)
}

/// Validate the `Authorization: Bearer <token>` header against `jwt`.
///
/// A missing header, malformed scheme, or invalid/expired token all yield
/// `401` before anything is proxied.
pub fn check_bearer(headers: &HeaderMap, jwt: &dyn JwtValidator) -> Result<(), StatusCode> {
    let header = headers
        .get(axum::http::header::AUTHORIZATION)
        .ok_or(StatusCode::UNAUTHORIZED)?;
    let header = header.to_str().map_err(|_| StatusCode::UNAUTHORIZED)?;
    let token = header
        .strip_prefix("Bearer ")
        .ok_or(StatusCode::UNAUTHORIZED)?
        .trim();

    if token.is_empty() {
        return Err(StatusCode::UNAUTHORIZED);
    }

    jwt.validate(token, Utc::now())
        .map(|_| ())
        .map_err(|_| StatusCode::UNAUTHORIZED)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_and_auth_paths_are_exempt() {
        assert!(is_auth_exempt("/health"));
        assert!(is_auth_exempt("/ready"));
        assert!(is_auth_exempt("/live"));
        assert!(is_auth_exempt("/api/v1/auth/login"));
        assert!(!is_auth_exempt("/api/v1/invoices"));
        assert!(!is_auth_exempt("/invoices"));
    }

    #[test]
    fn missing_header_is_unauthorized() {
        let jwt = forgeerp_auth::Hs256JwtValidator::new(b"secret".to_vec());
        let headers = HeaderMap::new();
        assert_eq!(check_bearer(&headers, &jwt), Err(StatusCode::UNAUTHORIZED));
    }

    #[test]
    fn malformed_scheme_is_unauthorized() {
        let jwt = forgeerp_auth::Hs256JwtValidator::new(b"secret".to_vec());
        let mut headers = HeaderMap::new();
        headers.insert(axum::http::header::AUTHORIZATION, "Basic abc".parse().unwrap());
        assert_eq!(check_bearer(&headers, &jwt), Err(StatusCode::UNAUTHORIZED));
    }
}
