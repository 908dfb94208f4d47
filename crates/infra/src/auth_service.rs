//! Authentication orchestration: register, login, refresh, logout, change
//! password, and profile lookup, built on top of the `User` aggregate.
//!
//! This lives in `forgeerp-infra` rather than `forgeerp-auth` because it
//! needs both the domain aggregate and infra concerns (event store, cache,
//! rate limiter) that `forgeerp-auth` deliberately stays free of.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;
use uuid::Uuid;

use forgeerp_auth::{
    hash_password, verify_password, ChangePassword, CreateUser, Hs256JwtValidator, JwtClaims,
    JwtValidator, PasswordError, PrincipalId, Role, TokenIssueError, TokenValidationError, User,
    UserCommand, UserId, UserStatus,
};
use forgeerp_core::{Aggregate, AggregateId, TenantId};
use forgeerp_events::{EventBus, EventEnvelope};

use crate::cache::{Cache, CacheError, RateLimiter};
use crate::command_dispatcher::{CommandDispatcher, DispatchError};
use crate::event_store::EventStore;
use crate::projections::users::{UserReadModel, UsersProjection};
use crate::read_model::TenantStore;

const AGGREGATE_TYPE: &str = "auth.user";

/// Tunables for the auth service. Defaults match production expectations;
/// callers may override for tests (e.g. a tighter rate-limit window).
#[derive(Debug, Clone)]
pub struct AuthServiceConfig {
    pub access_token_ttl: Duration,
    pub refresh_token_ttl: Duration,
    pub login_attempt_limit: u32,
    pub login_attempt_window: Duration,
    pub default_roles: Vec<Role>,
}

impl Default for AuthServiceConfig {
    fn default() -> Self {
        Self {
            access_token_ttl: Duration::from_secs(15 * 60),
            refresh_token_ttl: Duration::from_secs(7 * 24 * 60 * 60),
            login_attempt_limit: 5,
            login_attempt_window: Duration::from_secs(15 * 60),
            default_roles: vec![Role::new("user")],
        }
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("account is suspended")]
    AccountSuspended,
    #[error("too many login attempts, try again later")]
    RateLimited,
    #[error("email already registered")]
    EmailTaken,
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("invalid or expired token")]
    InvalidToken,
    #[error("session not found")]
    SessionNotFound,
    #[error("not found")]
    NotFound,
    #[error("internal auth error: {0}")]
    Internal(String),
}

impl From<PasswordError> for AuthError {
    fn from(e: PasswordError) -> Self {
        AuthError::Internal(e.to_string())
    }
}

impl From<TokenValidationError> for AuthError {
    fn from(_: TokenValidationError) -> Self {
        AuthError::InvalidToken
    }
}

impl From<TokenIssueError> for AuthError {
    fn from(e: TokenIssueError) -> Self {
        AuthError::Internal(e.to_string())
    }
}

impl From<CacheError> for AuthError {
    fn from(e: CacheError) -> Self {
        AuthError::Internal(e.to_string())
    }
}

impl From<DispatchError> for AuthError {
    fn from(e: DispatchError) -> Self {
        match e {
            DispatchError::Validation(m) => AuthError::Validation(m),
            DispatchError::InvariantViolation(m) => AuthError::Validation(m),
            DispatchError::Concurrency(m) => AuthError::Internal(format!("concurrency: {m}")),
            DispatchError::Unauthorized => AuthError::InvalidCredentials,
            DispatchError::NotFound => AuthError::NotFound,
            other => AuthError::Internal(format!("{other:?}")),
        }
    }
}

/// Result of a registration: enough to render a response without waiting on
/// the (eventually-consistent) projection to catch up.
#[derive(Debug, Clone, Serialize)]
pub struct RegisteredUser {
    pub user_id: UserId,
    pub tenant_id: TenantId,
    pub email: String,
    pub display_name: String,
    pub roles: Vec<String>,
}

/// An issued access/refresh token pair.
#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub session_id: Uuid,
    pub expires_in: u64,
}

/// Cached session record, stored under `session:<sessionId>`.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SessionRecord {
    tenant_id: TenantId,
    user_id: UserId,
    issued_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

fn session_key(session_id: Uuid) -> String {
    format!("session:{session_id}")
}

fn refresh_blacklist_key(session_id: Uuid) -> String {
    format!("refresh_blacklist:{session_id}")
}

fn login_rate_limit_key(tenant_id: TenantId, email: &str) -> String {
    format!("login:{tenant_id}:{email}")
}

/// Rehydrate a `User` aggregate directly from the event store.
///
/// The users read model deliberately omits `password_hash`, so login and
/// change-password need the aggregate itself rather than the projection.
fn fold_user<S: EventStore>(store: &S, tenant_id: TenantId, user_id: UserId) -> Result<User, AuthError> {
    let aggregate_id = AggregateId::from(user_id);
    let mut history = store
        .load_stream(tenant_id, aggregate_id)
        .map_err(|e| AuthError::Internal(e.to_string()))?;
    history.sort_by_key(|e| e.sequence_number);

    let mut user = User::empty(user_id);
    for stored in history {
        let event: forgeerp_auth::UserEvent = serde_json::from_value(stored.payload)
            .map_err(|e| AuthError::Internal(e.to_string()))?;
        user.apply(&event);
    }
    Ok(user)
}

/// Auth orchestration built on top of the `User` aggregate.
///
/// Generic over the same `EventStore`/`EventBus` pair as [`CommandDispatcher`]
/// so callers can wire it against either the in-memory or persistent backend
/// without this module picking a concrete one.
pub struct AuthService<S, B, U> {
    dispatcher: Arc<CommandDispatcher<S, B>>,
    store: S,
    users: Arc<UsersProjection<U>>,
    cache: Arc<dyn Cache>,
    rate_limiter: Arc<dyn RateLimiter>,
    jwt: Arc<Hs256JwtValidator>,
    config: AuthServiceConfig,
}

impl<S, B, U> AuthService<S, B, U>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
    U: TenantStore<UserId, UserReadModel>,
{
    pub fn new(
        dispatcher: Arc<CommandDispatcher<S, B>>,
        store: S,
        users: Arc<UsersProjection<U>>,
        cache: Arc<dyn Cache>,
        rate_limiter: Arc<dyn RateLimiter>,
        jwt: Arc<Hs256JwtValidator>,
        config: AuthServiceConfig,
    ) -> Self {
        Self {
            dispatcher,
            store,
            users,
            cache,
            rate_limiter,
            jwt,
            config,
        }
    }

    /// Register a new user for a tenant. Fails if the email is already taken
    /// within the tenant (email uniqueness is tenant-scoped, not global).
    pub fn register(
        &self,
        tenant_id: TenantId,
        email: &str,
        display_name: &str,
        password: &str,
    ) -> Result<RegisteredUser, AuthError> {
        let normalized_email = email.trim().to_lowercase();
        if normalized_email.is_empty() || !normalized_email.contains('@') {
            return Err(AuthError::Validation("invalid email format".to_string()));
        }
        if password.len() < 8 {
            return Err(AuthError::Validation("password must be at least 8 characters".to_string()));
        }
        if self.users.get_by_email(tenant_id, &normalized_email).is_some() {
            return Err(AuthError::EmailTaken);
        }

        let password_hash = hash_password(password)?;
        let user_id = UserId::new();
        let aggregate_id = AggregateId::from(user_id);
        let now = Utc::now();
        let display_name = display_name.trim().to_string();

        let cmd = UserCommand::Create(CreateUser {
            tenant_id,
            user_id,
            email: normalized_email.clone(),
            display_name: display_name.clone(),
            password_hash,
            initial_roles: self.config.default_roles.clone(),
            occurred_at: now,
        });

        self.dispatcher.dispatch::<User>(
            tenant_id,
            aggregate_id,
            AGGREGATE_TYPE,
            cmd,
            |_tenant_id, agg_id| User::empty(UserId::from_uuid(*agg_id.as_uuid())),
        )?;

        Ok(RegisteredUser {
            user_id,
            tenant_id,
            email: normalized_email,
            display_name,
            roles: self.config.default_roles.iter().map(|r| r.as_str().to_string()).collect(),
        })
    }

    /// Authenticate with email/password, subject to the per-tenant-per-email
    /// login rate limit (`login:<tenantId>:<email>`).
    pub fn login(&self, tenant_id: TenantId, email: &str, password: &str) -> Result<TokenPair, AuthError> {
        let normalized_email = email.trim().to_lowercase();

        let decision = self.rate_limiter.check(
            &login_rate_limit_key(tenant_id, &normalized_email),
            self.config.login_attempt_limit,
            self.config.login_attempt_window,
        )?;
        if !decision.is_allowed() {
            return Err(AuthError::RateLimited);
        }

        let model = self
            .users
            .get_by_email(tenant_id, &normalized_email)
            .ok_or(AuthError::InvalidCredentials)?;

        if model.status == UserStatus::Suspended.to_string() {
            return Err(AuthError::AccountSuspended);
        }

        let user = fold_user(&self.store, tenant_id, model.user_id)?;
        if !verify_password(password, &user.password_hash)? {
            return Err(AuthError::InvalidCredentials);
        }

        self.issue_session(tenant_id, model.user_id, user.roles.clone())
    }

    /// Rotate a refresh token into a brand new access/refresh pair. The old
    /// `session_id` is blacklisted under `refresh_blacklist:<sessionId>` and
    /// can never be redeemed again.
    pub fn refresh(&self, refresh_token: &str) -> Result<TokenPair, AuthError> {
        let now = Utc::now();
        let claims = self.jwt.validate(refresh_token, now)?;

        if self.cache.get(&refresh_blacklist_key(claims.session_id))?.is_some() {
            return Err(AuthError::InvalidToken);
        }

        let bytes = self
            .cache
            .get(&session_key(claims.session_id))?
            .ok_or(AuthError::SessionNotFound)?;
        let record: SessionRecord =
            serde_json::from_slice(&bytes).map_err(|e| AuthError::Internal(e.to_string()))?;

        if record.tenant_id != claims.tenant_id
            || record.user_id != UserId::from_uuid(*claims.sub.as_uuid())
        {
            return Err(AuthError::InvalidToken);
        }

        // Rotate before re-validating account status: a stolen-but-unused
        // refresh token must not remain redeemable just because the lookup
        // below fails.
        self.cache.set(
            &refresh_blacklist_key(claims.session_id),
            b"1".to_vec(),
            self.config.refresh_token_ttl,
        )?;
        self.cache.delete(&session_key(claims.session_id))?;

        let model = self
            .users
            .get(record.tenant_id, &record.user_id)
            .ok_or(AuthError::SessionNotFound)?;
        if model.status == UserStatus::Suspended.to_string() {
            return Err(AuthError::AccountSuspended);
        }

        let roles = model.roles.iter().cloned().map(Role::new).collect();
        self.issue_session(record.tenant_id, record.user_id, roles)
    }

    /// Invalidate a session: deletes its cache entry and blacklists its
    /// refresh token. Idempotent — calling it twice, or on an already-expired
    /// session, is not an error.
    pub fn logout(&self, tenant_id: TenantId, session_id: Uuid) -> Result<(), AuthError> {
        if let Some(bytes) = self.cache.get(&session_key(session_id))? {
            let record: SessionRecord =
                serde_json::from_slice(&bytes).map_err(|e| AuthError::Internal(e.to_string()))?;
            if record.tenant_id != tenant_id {
                return Err(AuthError::SessionNotFound);
            }
        }
        self.cache.delete(&session_key(session_id))?;
        self.cache
            .set(&refresh_blacklist_key(session_id), b"1".to_vec(), self.config.refresh_token_ttl)?;
        Ok(())
    }

    /// Change a user's password after verifying the current one.
    pub fn change_password(
        &self,
        tenant_id: TenantId,
        user_id: UserId,
        current_password: &str,
        new_password: &str,
    ) -> Result<(), AuthError> {
        if new_password.len() < 8 {
            return Err(AuthError::Validation("password must be at least 8 characters".to_string()));
        }

        let user = fold_user(&self.store, tenant_id, user_id)?;
        if user.tenant_id != Some(tenant_id) {
            return Err(AuthError::InvalidCredentials);
        }
        if !verify_password(current_password, &user.password_hash)? {
            return Err(AuthError::InvalidCredentials);
        }

        let new_hash = hash_password(new_password)?;
        let cmd = UserCommand::ChangePassword(ChangePassword {
            tenant_id,
            user_id,
            new_password_hash: new_hash,
            occurred_at: Utc::now(),
        });

        self.dispatcher.dispatch::<User>(
            tenant_id,
            AggregateId::from(user_id),
            AGGREGATE_TYPE,
            cmd,
            |_tenant_id, agg_id| User::empty(UserId::from_uuid(*agg_id.as_uuid())),
        )?;

        Ok(())
    }

    /// Read a user's own profile from the read model.
    pub fn get_profile(&self, tenant_id: TenantId, user_id: UserId) -> Result<UserReadModel, AuthError> {
        self.users.get(tenant_id, &user_id).ok_or(AuthError::NotFound)
    }

    fn issue_session(&self, tenant_id: TenantId, user_id: UserId, roles: Vec<Role>) -> Result<TokenPair, AuthError> {
        let session_id = Uuid::now_v7();
        let now = Utc::now();
        let sub = PrincipalId::from_uuid(*user_id.as_uuid());

        let access_expires_at = now + chrono::Duration::seconds(self.config.access_token_ttl.as_secs() as i64);
        let refresh_expires_at = now + chrono::Duration::seconds(self.config.refresh_token_ttl.as_secs() as i64);

        let access_claims = JwtClaims {
            sub,
            tenant_id,
            roles: roles.clone(),
            session_id,
            issued_at: now,
            expires_at: access_expires_at,
        };
        let refresh_claims = JwtClaims {
            sub,
            tenant_id,
            roles,
            session_id,
            issued_at: now,
            expires_at: refresh_expires_at,
        };

        let access_token = self.jwt.issue(&access_claims)?;
        let refresh_token = self.jwt.issue(&refresh_claims)?;

        let record = SessionRecord {
            tenant_id,
            user_id,
            issued_at: now,
            expires_at: refresh_expires_at,
        };
        let bytes = serde_json::to_vec(&record).map_err(|e| AuthError::Internal(e.to_string()))?;
        self.cache.set(&session_key(session_id), bytes, self.config.refresh_token_ttl)?;

        Ok(TokenPair {
            access_token,
            refresh_token,
            session_id,
            expires_in: self.config.access_token_ttl.as_secs(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{InMemoryCache, InMemoryRateLimiter};
    use crate::event_store::InMemoryEventStore;
    use crate::read_model::InMemoryTenantStore;
    use forgeerp_events::InMemoryEventBus;

    fn build_service() -> AuthService<
        Arc<InMemoryEventStore>,
        Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>,
        Arc<InMemoryTenantStore<UserId, UserReadModel>>,
    > {
        let store = Arc::new(InMemoryEventStore::new());
        let bus = Arc::new(InMemoryEventBus::new());
        let dispatcher = Arc::new(CommandDispatcher::new(store.clone(), bus.clone()));
        let users = Arc::new(UsersProjection::new(Arc::new(InMemoryTenantStore::new())));
        let cache: Arc<dyn Cache> = Arc::new(InMemoryCache::new());
        let rate_limiter: Arc<dyn RateLimiter> = Arc::new(InMemoryRateLimiter::new());
        let jwt = Arc::new(Hs256JwtValidator::new(b"test-secret".to_vec()));

        AuthService::new(dispatcher, store, users, cache, rate_limiter, jwt, AuthServiceConfig::default())
    }

    fn apply_to_projection<S, B, U>(service: &AuthService<S, B, U>, tenant_id: TenantId, user_id: UserId)
    where
        S: EventStore,
        B: EventBus<EventEnvelope<JsonValue>>,
        U: TenantStore<UserId, UserReadModel>,
    {
        let aggregate_id = AggregateId::from(user_id);
        for stored in service.store.load_stream(tenant_id, aggregate_id).unwrap() {
            let envelope = stored.to_envelope();
            service.users.apply_envelope(&envelope).unwrap();
        }
    }

    #[test]
    fn register_then_login_succeeds() {
        let service = build_service();
        let tenant_id = TenantId::new();

        let registered = service
            .register(tenant_id, "Alice@Example.com", "Alice", "correct-horse-battery")
            .unwrap();
        assert_eq!(registered.email, "alice@example.com");

        apply_to_projection(&service, tenant_id, registered.user_id);

        let tokens = service.login(tenant_id, "alice@example.com", "correct-horse-battery").unwrap();
        assert!(!tokens.access_token.is_empty());
        assert_ne!(tokens.access_token, tokens.refresh_token);
    }

    #[test]
    fn login_with_wrong_password_is_rejected() {
        let service = build_service();
        let tenant_id = TenantId::new();

        let registered = service.register(tenant_id, "bob@example.com", "Bob", "correct-horse-battery").unwrap();
        apply_to_projection(&service, tenant_id, registered.user_id);

        let result = service.login(tenant_id, "bob@example.com", "wrong-password");
        assert!(matches!(result, Err(AuthError::InvalidCredentials)));
    }

    #[test]
    fn duplicate_email_is_rejected() {
        let service = build_service();
        let tenant_id = TenantId::new();

        let registered = service.register(tenant_id, "carol@example.com", "Carol", "correct-horse-battery").unwrap();
        apply_to_projection(&service, tenant_id, registered.user_id);

        let result = service.register(tenant_id, "carol@example.com", "Carol Two", "another-password");
        assert!(matches!(result, Err(AuthError::EmailTaken)));
    }

    #[test]
    fn refresh_rotates_session_and_blacklists_old_one() {
        let service = build_service();
        let tenant_id = TenantId::new();

        let registered = service.register(tenant_id, "dave@example.com", "Dave", "correct-horse-battery").unwrap();
        apply_to_projection(&service, tenant_id, registered.user_id);

        let first = service.login(tenant_id, "dave@example.com", "correct-horse-battery").unwrap();
        let second = service.refresh(&first.refresh_token).unwrap();
        assert_ne!(first.session_id, second.session_id);

        // The old refresh token can never be redeemed again.
        let result = service.refresh(&first.refresh_token);
        assert!(matches!(result, Err(AuthError::InvalidToken)));
    }

    #[test]
    fn logout_invalidates_session_immediately() {
        let service = build_service();
        let tenant_id = TenantId::new();

        let registered = service.register(tenant_id, "erin@example.com", "Erin", "correct-horse-battery").unwrap();
        apply_to_projection(&service, tenant_id, registered.user_id);

        let tokens = service.login(tenant_id, "erin@example.com", "correct-horse-battery").unwrap();
        service.logout(tenant_id, tokens.session_id).unwrap();

        let result = service.refresh(&tokens.refresh_token);
        assert!(matches!(result, Err(AuthError::InvalidToken) | Err(AuthError::SessionNotFound)));
    }

    #[test]
    fn login_is_rate_limited_after_repeated_failures() {
        let service = build_service();
        let tenant_id = TenantId::new();

        let registered = service.register(tenant_id, "frank@example.com", "Frank", "correct-horse-battery").unwrap();
        apply_to_projection(&service, tenant_id, registered.user_id);

        for _ in 0..5 {
            let _ = service.login(tenant_id, "frank@example.com", "wrong-password");
        }

        let result = service.login(tenant_id, "frank@example.com", "correct-horse-battery");
        assert!(matches!(result, Err(AuthError::RateLimited)));
    }

    #[test]
    fn change_password_requires_current_password() {
        let service = build_service();
        let tenant_id = TenantId::new();

        let registered = service.register(tenant_id, "grace@example.com", "Grace", "correct-horse-battery").unwrap();
        apply_to_projection(&service, tenant_id, registered.user_id);

        let result = service.change_password(tenant_id, registered.user_id, "wrong-password", "new-password-123");
        assert!(matches!(result, Err(AuthError::InvalidCredentials)));

        service
            .change_password(tenant_id, registered.user_id, "correct-horse-battery", "new-password-123")
            .unwrap();
        apply_to_projection(&service, tenant_id, registered.user_id);

        let old_rejected = service.login(tenant_id, "grace@example.com", "correct-horse-battery");
        assert!(matches!(old_rejected, Err(AuthError::InvalidCredentials)));

        let new_accepted = service.login(tenant_id, "grace@example.com", "new-password-123");
        assert!(new_accepted.is_ok());
    }
}
