//! `/health`, `/ready`, `/live` — the gateway's own liveness plus aggregated
//! backend readiness.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct HealthBody {
    pub status: &'static str,
    pub timestamp: chrono::DateTime<Utc>,
    pub service: &'static str,
}

impl HealthBody {
    pub fn ok(service: &'static str) -> Self {
        Self {
            status: "ok",
            timestamp: Utc::now(),
            service,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct BackendStatus {
    pub healthy: bool,
    pub detail: String,
}

#[derive(Debug, Serialize)]
pub struct ReadyBody {
    pub status: &'static str,
    pub timestamp: chrono::DateTime<Utc>,
    pub service: &'static str,
    pub backends: BTreeMap<String, BackendStatus>,
}

/// Probe every configured backend's `/health` with `per_backend_timeout`,
/// treating a timeout or any 5xx as unhealthy. The overall response is
/// always `200`/degraded-but-reported — an unhealthy backend never fails
/// the aggregate `/ready` check, it only shows up in the per-backend map.
pub async fn aggregate_readiness(
    client: &reqwest::Client,
    targets: &BTreeMap<String, String>,
    per_backend_timeout: Duration,
) -> ReadyBody {
    // Probe each distinct backend URL once — several prefixes may share one
    // address in this workspace's monolithic deployment — then fan the
    // result out to every prefix backed by that address.
    let mut by_url: BTreeMap<String, BackendStatus> = BTreeMap::new();
    for base_url in targets.values() {
        if by_url.contains_key(base_url) {
            continue;
        }
        let status = probe_backend(client, base_url, per_backend_timeout).await;
        by_url.insert(base_url.clone(), status);
    }

    let mut backends = BTreeMap::new();
    for (prefix, base_url) in targets {
        let status = by_url.get(base_url).expect("probed above");
        backends.insert(
            prefix.clone(),
            BackendStatus {
                healthy: status.healthy,
                detail: status.detail.clone(),
            },
        );
    }

    ReadyBody {
        status: "ok",
        timestamp: Utc::now(),
        service: "forgeerp-gateway",
        backends,
    }
}

async fn probe_backend(client: &reqwest::Client, base_url: &str, timeout: Duration) -> BackendStatus {
    let url = format!("{base_url}/health");
    match client.get(&url).timeout(timeout).send().await {
        Ok(resp) if resp.status().is_success() => BackendStatus {
            healthy: true,
            detail: "ok".to_string(),
        },
        Ok(resp) => BackendStatus {
            healthy: false,
            detail: format!("status {}", resp.status()),
        },
        Err(e) if e.is_timeout() => BackendStatus {
            healthy: false,
            detail: "timeout".to_string(),
        },
        Err(e) => BackendStatus {
            healthy: false,
            detail: e.to_string(),
        },
    }
}
