//! Well-known permission identifiers for identity administration endpoints.
//!
//! Kept separate from the free-form per-domain `Permission::new(...)` literals
//! (see `crates/api/src/app/routes/*.rs`) because these guard user/role
//! management itself and are referenced from several route modules.

use std::sync::LazyLock;

use crate::Permission;

pub static USER_CREATE: LazyLock<Permission> = LazyLock::new(|| Permission::new("admin.users.create"));
pub static USER_LIST: LazyLock<Permission> = LazyLock::new(|| Permission::new("admin.users.list"));
pub static USER_READ: LazyLock<Permission> = LazyLock::new(|| Permission::new("admin.users.read"));
pub static USER_ASSIGN_ROLE: LazyLock<Permission> =
    LazyLock::new(|| Permission::new("admin.users.assign_role"));
pub static USER_REVOKE_ROLE: LazyLock<Permission> =
    LazyLock::new(|| Permission::new("admin.users.revoke_role"));
pub static USER_SUSPEND: LazyLock<Permission> = LazyLock::new(|| Permission::new("admin.users.suspend"));
pub static USER_ACTIVATE: LazyLock<Permission> = LazyLock::new(|| Permission::new("admin.users.activate"));
