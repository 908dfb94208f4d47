use std::sync::Arc;

use axum::{
    extract::Extension,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;

use forgeerp_auth::{JwtValidator, UserId};
use forgeerp_infra::auth_service::AuthError;

use crate::app::{dto, errors};
use crate::app::services::AppServices;
use crate::context::{PrincipalContext, TenantContext};

/// Routes reachable before a bearer token exists.
pub fn router() -> Router {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/refresh", post(refresh))
        .route("/auth/logout", post(logout))
}

/// Routes that require an already-valid bearer token; nested under the
/// authenticated router so tenant/principal context is already populated.
pub fn protected_router() -> Router {
    Router::new()
        .route("/auth/change-password", post(change_password))
        .route("/auth/me", get(me))
}

pub async fn register(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::RegisterAuthRequest>,
) -> axum::response::Response {
    match services.auth_register(body.tenant_id, &body.email, &body.display_name, &body.password) {
        Ok(registered) => (StatusCode::CREATED, Json(registered)).into_response(),
        Err(e) => auth_error_to_response(e),
    }
}

pub async fn login(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::LoginRequest>,
) -> axum::response::Response {
    match services.auth_login(body.tenant_id, &body.email, &body.password) {
        Ok(tokens) => (StatusCode::OK, Json(tokens)).into_response(),
        Err(e) => auth_error_to_response(e),
    }
}

pub async fn refresh(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::RefreshRequest>,
) -> axum::response::Response {
    match services.auth_refresh(&body.refresh_token) {
        Ok(tokens) => (StatusCode::OK, Json(tokens)).into_response(),
        Err(e) => auth_error_to_response(e),
    }
}

pub async fn logout(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::RefreshRequest>,
) -> axum::response::Response {
    let claims = match services.jwt().validate(&body.refresh_token, Utc::now()) {
        Ok(c) => c,
        Err(_) => return errors::json_error(StatusCode::UNAUTHORIZED, "unauthorized", "invalid refresh token"),
    };

    match services.auth_logout(claims.tenant_id, claims.session_id) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => auth_error_to_response(e),
    }
}

pub async fn change_password(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<dto::ChangePasswordRequest>,
) -> axum::response::Response {
    let user_id = UserId::from_uuid(*principal.principal_id().as_uuid());
    match services.auth_change_password(tenant.tenant_id(), user_id, &body.current_password, &body.new_password) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => auth_error_to_response(e),
    }
}

pub async fn me(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> axum::response::Response {
    let user_id = UserId::from_uuid(*principal.principal_id().as_uuid());
    match services.users_get(tenant.tenant_id(), &user_id) {
        Some(profile) => (StatusCode::OK, Json(profile)).into_response(),
        None => errors::json_error(StatusCode::NOT_FOUND, "not_found", "user not found"),
    }
}

fn auth_error_to_response(e: AuthError) -> axum::response::Response {
    match e {
        AuthError::InvalidCredentials => {
            errors::json_error(StatusCode::UNAUTHORIZED, "unauthorized", e.to_string())
        }
        AuthError::AccountSuspended => errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string()),
        AuthError::RateLimited => {
            errors::json_error(StatusCode::TOO_MANY_REQUESTS, "rate_limited", e.to_string())
        }
        AuthError::EmailTaken => errors::json_error(StatusCode::CONFLICT, "conflict", e.to_string()),
        AuthError::Validation(_) => {
            errors::json_error(StatusCode::BAD_REQUEST, "invalid_argument", e.to_string())
        }
        AuthError::InvalidToken | AuthError::SessionNotFound => {
            errors::json_error(StatusCode::UNAUTHORIZED, "unauthorized", e.to_string())
        }
        AuthError::NotFound => errors::json_error(StatusCode::NOT_FOUND, "not_found", e.to_string()),
        AuthError::Internal(_) => {
            errors::json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal", e.to_string())
        }
    }
}
