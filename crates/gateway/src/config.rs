//! Environment-driven gateway configuration.
//!
//! Every backend target is overridable at process start by
//! `ERP_GATEWAY_<NAME>_URL`; a missing or empty value falls back to the
//! in-code default. The override table is authoritative whenever it is set
//! (§9 open question, resolved: env wins over hardcoded defaults).

use std::collections::BTreeMap;
use std::time::Duration;

/// The route prefixes the gateway fronts, in the order the distilled spec
/// lists them. Each one maps to an `ERP_GATEWAY_<UPPER>_URL` override.
pub const ROUTE_PREFIXES: &[&str] = &[
    "auth",
    "clients",
    "invoices",
    "payments",
    "products",
    "orders",
    "users",
    "inventory",
];

/// Paths exempt from bearer authentication, matched by exact path or prefix
/// (for `/api/v1/auth/`).
pub const AUTH_EXEMPT_EXACT: &[&str] = &["/health", "/ready", "/live"];
pub const AUTH_EXEMPT_PREFIX: &str = "/api/v1/auth/";

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// route prefix -> backend base URL (no trailing slash).
    pub targets: BTreeMap<String, String>,
    pub jwt_secret: Vec<u8>,
    pub cors_origins: Vec<String>,
    pub upstream_timeout: Duration,
    pub health_timeout: Duration,
    pub listen_addr: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("JWT_SECRET must be set in production (set ERP_GATEWAY_ALLOW_DEV_SECRET=1 to override locally)")]
    MissingJwtSecret,
}

impl GatewayConfig {
    /// Load configuration from the process environment. Every variable has a
    /// usable default for local development; `tracing::warn!` fires when a
    /// production-sensitive variable is defaulted rather than set explicitly.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut targets = BTreeMap::new();
        for prefix in ROUTE_PREFIXES {
            let var = format!("ERP_GATEWAY_{}_URL", prefix.to_uppercase());
            let url = match std::env::var(&var) {
                Ok(v) if !v.trim().is_empty() => v,
                _ => {
                    tracing::warn!(prefix, var, "gateway target not set; defaulting to http://localhost:8080");
                    "http://localhost:8080".to_string()
                }
            };
            targets.insert((*prefix).to_string(), url.trim_end_matches('/').to_string());
        }

        let jwt_secret = match std::env::var("JWT_SECRET") {
            Ok(s) if !s.trim().is_empty() => s.into_bytes(),
            _ => {
                if std::env::var("ERP_GATEWAY_ALLOW_DEV_SECRET").as_deref() == Ok("1") {
                    tracing::warn!("JWT_SECRET not set; using insecure dev default");
                    b"dev-secret".to_vec()
                } else {
                    return Err(ConfigError::MissingJwtSecret);
                }
            }
        };

        let cors_origins = std::env::var("ERP_GATEWAY_CORS_ORIGINS")
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();

        let upstream_timeout = Duration::from_millis(
            env_parse_u64("ERP_GATEWAY_UPSTREAM_TIMEOUT_MS").unwrap_or(30_000),
        );
        let health_timeout = Duration::from_millis(
            env_parse_u64("ERP_GATEWAY_HEALTH_TIMEOUT_MS").unwrap_or(5_000),
        );

        let listen_addr = std::env::var("ERP_GATEWAY_LISTEN_ADDR")
            .unwrap_or_else(|_| "0.0.0.0:8000".to_string());

        Ok(Self {
            targets,
            jwt_secret,
            cors_origins,
            upstream_timeout,
            health_timeout,
            listen_addr,
        })
    }

    /// Resolve the backend base URL for the first path segment of `path`
    /// (e.g. `/invoices/123` -> the `invoices` target), if any prefix matches.
    pub fn target_for_path<'a>(&'a self, path: &str) -> Option<(&'a str, &'a str)> {
        let trimmed = path.trim_start_matches('/');
        let first_segment = trimmed.split('/').next().unwrap_or("");
        self.targets
            .iter()
            .find(|(prefix, _)| prefix.as_str() == first_segment)
            .map(|(p, u)| (p.as_str(), u.as_str()))
    }
}

fn env_parse_u64(name: &str) -> Option<u64> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_for_path_matches_first_segment() {
        let mut targets = BTreeMap::new();
        targets.insert("invoices".to_string(), "http://invoices:9000".to_string());
        let cfg = GatewayConfig {
            targets,
            jwt_secret: b"x".to_vec(),
            cors_origins: vec![],
            upstream_timeout: Duration::from_secs(30),
            health_timeout: Duration::from_secs(5),
            listen_addr: "0.0.0.0:8000".to_string(),
        };

        let (prefix, url) = cfg.target_for_path("/invoices/123/payments").unwrap();
        assert_eq!(prefix, "invoices");
        assert_eq!(url, "http://invoices:9000");
        assert!(cfg.target_for_path("/unknown").is_none());
    }
}
