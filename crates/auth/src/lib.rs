//! Auth: users, roles, permissions, JWT.

pub mod admin;
pub mod authorize;
pub mod claims;
pub mod password;
pub mod permissions;
pub mod principal;
pub mod roles;
pub mod user;

pub use authorize::{authorize, AuthzError, Principal};
pub use claims::{
    validate_claims, Hs256JwtValidator, JwtClaims, JwtValidator, TokenIssueError,
    TokenValidationError,
};
pub use password::{hash_password, verify_password, PasswordError};
pub use permissions::Permission;
pub use principal::{PrincipalId, TenantMembership};
pub use roles::Role;
pub use user::{
    ActivateUser, AssignRole, ChangePassword, CreateUser, PasswordChanged, RevokeRole,
    RoleAssigned, RoleRevoked, SuspendUser, User, UserActivated, UserCommand, UserCreated,
    UserError, UserEvent, UserId, UserSuspended, UserStatus,
};
