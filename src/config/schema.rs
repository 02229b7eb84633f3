//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the client.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration for the resilient client.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ClientConfig {
    /// Backend discovery settings.
    pub discovery: DiscoveryConfig,

    /// Connectivity probe settings.
    pub probe: ProbeConfig,

    /// Request pipeline timeouts and endpoints.
    pub requests: RequestConfig,

    /// Authentication behaviour.
    pub auth: AuthConfig,

    /// Durable storage used by the CLI.
    pub storage: StorageConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Backend discovery configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Base URL returned when nothing else is reachable.
    pub fallback_url: String,

    /// API path prefix appended to every scanned host (e.g. "/api").
    pub api_path: String,

    /// Ports tried for each scanned host.
    pub ports: Vec<u16>,

    /// Last-octet host suffixes tried on the local /24.
    pub host_suffixes: Vec<u8>,

    /// Number of candidates probed concurrently per batch.
    pub batch_size: usize,

    /// Pause between scan batches in milliseconds.
    pub batch_pause_ms: u64,

    /// Prefix used when the device address cannot be determined.
    pub default_prefix: String,

    /// Fixed prefix that bypasses device address discovery.
    pub network_prefix: Option<String>,

    /// Maximum number of remembered working URLs.
    pub cache_capacity: usize,
}

impl DiscoveryConfig {
    pub fn batch_pause(&self) -> Duration {
        Duration::from_millis(self.batch_pause_ms)
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        let mut host_suffixes: Vec<u8> = (1..=10).collect();
        host_suffixes.extend(100..=110);

        Self {
            fallback_url: "http://localhost:3000/api".to_string(),
            api_path: "/api".to_string(),
            ports: vec![3000, 8080, 5000],
            host_suffixes,
            batch_size: 5,
            batch_pause_ms: 100,
            default_prefix: "192.168.1".to_string(),
            network_prefix: None,
            cache_capacity: 10,
        }
    }
}

/// Connectivity probe configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// Health path appended to the candidate base URL.
    pub health_path: String,

    /// Hard per-probe timeout in milliseconds.
    pub timeout_ms: u64,

    /// Require a positive success indicator even on HTTP 200.
    pub require_success_indicator: bool,
}

impl ProbeConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            health_path: "/health".to_string(),
            timeout_ms: 3000,
            require_success_indicator: false,
        }
    }
}

/// Request pipeline configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RequestConfig {
    /// Overall timeout for regular requests in seconds.
    pub timeout_secs: u64,

    /// Overall timeout for upload requests in seconds.
    pub upload_timeout_secs: u64,

    /// Path of the token refresh endpoint, relative to the base URL.
    pub refresh_path: String,

    /// User-Agent header sent with every request.
    pub user_agent: String,
}

impl RequestConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn upload_timeout(&self) -> Duration {
        Duration::from_secs(self.upload_timeout_secs)
    }
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 15,
            upload_timeout_secs: 60,
            refresh_path: "/auth/refresh".to_string(),
            user_agent: concat!("resilient-client/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// Authentication configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Bearer token sent for OAuth sessions that have no access token.
    /// Unset means such sessions go out unauthenticated.
    pub oauth_placeholder_token: Option<String>,
}

/// Storage configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path of the JSON key-value file.
    pub path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: "client-store.json".to_string(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Record metrics through the `metrics` facade.
    pub metrics_enabled: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: true,
        }
    }
}
