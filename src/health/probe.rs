//! Single-shot connectivity probing.
//!
//! # Responsibilities
//! - Send one `GET <base_url><health_path>` with a hard timeout
//! - Classify the response as reachable or not
//!
//! # Design Decisions
//! - No retries; retry policy belongs to the caller
//! - Timeout, refusal and malformed payloads all collapse to `reachable = false`

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;
use std::time::{Duration, Instant};
use tokio::time;

use crate::config::ProbeConfig;
use crate::observability::metrics;

/// Outcome of a single probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeResult {
    pub reachable: bool,
    pub elapsed: Duration,
}

impl ProbeResult {
    pub fn reachable(elapsed: Duration) -> Self {
        Self {
            reachable: true,
            elapsed,
        }
    }

    pub fn unreachable(elapsed: Duration) -> Self {
        Self {
            reachable: false,
            elapsed,
        }
    }
}

/// Reachability check against a candidate base URL.
#[async_trait]
pub trait Probe: Send + Sync {
    async fn probe(&self, base_url: &str) -> ProbeResult;
}

/// Probe that hits the backend health endpoint over HTTP.
#[derive(Debug, Clone)]
pub struct HttpProbe {
    client: reqwest::Client,
    config: ProbeConfig,
}

impl HttpProbe {
    pub fn new(config: ProbeConfig) -> Self {
        let client = reqwest::Client::builder()
            .no_proxy()
            .pool_max_idle_per_host(0)
            .build()
            .unwrap_or_default();

        Self { client, config }
    }

    fn health_url(&self, base_url: &str) -> String {
        format!("{}{}", base_url.trim_end_matches('/'), self.config.health_path)
    }
}

#[async_trait]
impl Probe for HttpProbe {
    async fn probe(&self, base_url: &str) -> ProbeResult {
        let start = Instant::now();
        let url = self.health_url(base_url);
        let timeout = self.config.timeout();

        let exchange = async {
            let response = self
                .client
                .get(&url)
                .header("user-agent", "resilient-client-probe")
                .send()
                .await?;
            let status = response.status();
            let body = response.text().await?;
            Ok::<_, reqwest::Error>((status, body))
        };

        // The deadline covers reading the body too.
        let reachable = match time::timeout(timeout, exchange).await {
            Ok(Ok((status, body))) => {
                let healthy = is_healthy(status, &body, self.config.require_success_indicator);
                if !healthy {
                    tracing::debug!(url = %url, status = %status, "Probe failed: unhealthy response");
                }
                healthy
            }
            Ok(Err(e)) => {
                tracing::debug!(url = %url, error = %e, "Probe failed: connection error");
                false
            }
            Err(_) => {
                tracing::debug!(url = %url, timeout_ms = timeout.as_millis() as u64, "Probe failed: timeout");
                false
            }
        };

        metrics::record_probe(reachable);

        if reachable {
            ProbeResult::reachable(start.elapsed())
        } else {
            ProbeResult::unreachable(start.elapsed())
        }
    }
}

/// Decide whether a health response counts as reachable.
///
/// HTTP 200 is enough unless the body explicitly reports failure (or
/// `require_indicator` is set). Other 2xx codes need a positive indicator.
pub fn is_healthy(status: StatusCode, body: &str, require_indicator: bool) -> bool {
    if !status.is_success() {
        return false;
    }

    let indicator = serde_json::from_str::<Value>(body)
        .ok()
        .as_ref()
        .and_then(success_indicator);

    match indicator {
        Some(ok) => ok,
        None => status == StatusCode::OK && !require_indicator,
    }
}

/// `Some(true/false)` when the payload states its health, `None` otherwise.
fn success_indicator(payload: &Value) -> Option<bool> {
    if let Some(success) = payload.get("success").and_then(Value::as_bool) {
        return Some(success);
    }
    if let Some(ok) = payload.get("ok").and_then(Value::as_bool) {
        return Some(ok);
    }
    payload
        .get("status")
        .and_then(Value::as_str)
        .map(|s| matches!(s.to_ascii_lowercase().as_str(), "ok" | "healthy" | "up"))
}
