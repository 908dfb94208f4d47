//! API gateway (C9): authenticated reverse proxy fronting the service fleet.
//!
//! Responsibilities: route-table dispatch by path prefix, bearer-credential
//! authentication ahead of every proxied request (exempt: `/health`,
//! `/ready`, `/live`, `/api/v1/auth/*`), allow-listed CORS, forwarding
//! header decoration (`X-Forwarded-For`, `X-Forwarded-Host`,
//! `X-Request-ID`), and `/ready` health aggregation across backends.
//!
//! This crate contains no business logic; it is a thin, authenticated
//! reverse proxy in front of the services that do.

pub mod app;
pub mod auth;
pub mod config;
pub mod cors;
pub mod health;
pub mod proxy;

pub use app::{build_router, GatewayState};
pub use config::GatewayConfig;
