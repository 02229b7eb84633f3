//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, batch size > 0, host suffixes)
//! - Check that URLs and prefixes are well-formed
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ClientConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use url::Url;

use crate::config::schema::ClientConfig;

/// A single semantic problem found in a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Check a configuration for semantic errors.
pub fn validate_config(config: &ClientConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    let discovery = &config.discovery;

    match Url::parse(&discovery.fallback_url) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => {}
        Ok(url) => errors.push(ValidationError::new(
            "discovery.fallback_url",
            format!("unsupported scheme '{}'", url.scheme()),
        )),
        Err(e) => errors.push(ValidationError::new(
            "discovery.fallback_url",
            format!("invalid URL: {}", e),
        )),
    }

    if discovery.batch_size == 0 {
        errors.push(ValidationError::new("discovery.batch_size", "must be greater than 0"));
    }
    if discovery.ports.is_empty() {
        errors.push(ValidationError::new("discovery.ports", "at least one port is required"));
    }
    if discovery.ports.contains(&0) {
        errors.push(ValidationError::new("discovery.ports", "port 0 is not a valid target"));
    }
    if discovery.host_suffixes.is_empty() {
        errors.push(ValidationError::new(
            "discovery.host_suffixes",
            "at least one host suffix is required",
        ));
    }
    if discovery.host_suffixes.iter().any(|s| *s == 0 || *s == 255) {
        errors.push(ValidationError::new(
            "discovery.host_suffixes",
            "suffixes must be within 1..=254",
        ));
    }
    if discovery.cache_capacity == 0 {
        errors.push(ValidationError::new("discovery.cache_capacity", "must be greater than 0"));
    }
    if !is_prefix(&discovery.default_prefix) {
        errors.push(ValidationError::new(
            "discovery.default_prefix",
            format!("'{}' is not three dotted octets", discovery.default_prefix),
        ));
    }
    if let Some(prefix) = &discovery.network_prefix {
        if !is_prefix(prefix) {
            errors.push(ValidationError::new(
                "discovery.network_prefix",
                format!("'{}' is not three dotted octets", prefix),
            ));
        }
    }

    if config.probe.timeout_ms == 0 {
        errors.push(ValidationError::new("probe.timeout_ms", "must be greater than 0"));
    }
    if !config.probe.health_path.starts_with('/') {
        errors.push(ValidationError::new("probe.health_path", "must start with '/'"));
    }

    if config.requests.timeout_secs == 0 {
        errors.push(ValidationError::new("requests.timeout_secs", "must be greater than 0"));
    }
    if config.requests.upload_timeout_secs < config.requests.timeout_secs {
        errors.push(ValidationError::new(
            "requests.upload_timeout_secs",
            "must not be shorter than requests.timeout_secs",
        ));
    }
    if !config.requests.refresh_path.starts_with('/') {
        errors.push(ValidationError::new("requests.refresh_path", "must start with '/'"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn is_prefix(prefix: &str) -> bool {
    let octets: Vec<&str> = prefix.split('.').collect();
    octets.len() == 3 && octets.iter().all(|o| o.parse::<u8>().is_ok())
}
