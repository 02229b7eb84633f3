//! Candidate base URLs.

use std::time::{SystemTime, UNIX_EPOCH};
use url::Url;

/// A base URL that discovery has considered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerCandidate {
    /// Normalized origin + path prefix, no trailing slash.
    pub base_url: String,
    /// Seconds since epoch of the last successful probe.
    pub last_success_at: Option<u64>,
}

impl ServerCandidate {
    /// A candidate that has just answered a probe.
    pub fn confirmed(base_url: String) -> Self {
        Self {
            base_url,
            last_success_at: Some(now_secs()),
        }
    }

    /// A candidate handed out without confirmation (the static fallback).
    pub fn unconfirmed(base_url: String) -> Self {
        Self {
            base_url,
            last_success_at: None,
        }
    }

    pub fn is_confirmed(&self) -> bool {
        self.last_success_at.is_some()
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Normalize a base URL to `scheme://host[:port]/path` without trailing slash.
///
/// Default ports, query strings and fragments are dropped. Returns `None`
/// for anything that is not an absolute http(s) URL.
pub fn normalize_base_url(raw: &str) -> Option<String> {
    let url = Url::parse(raw.trim()).ok()?;
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }
    let host = url.host_str()?;

    let mut normalized = format!("{}://{}", url.scheme(), host);
    if let Some(port) = url.port() {
        normalized.push_str(&format!(":{}", port));
    }
    normalized.push_str(url.path().trim_end_matches('/'));
    Some(normalized)
}
