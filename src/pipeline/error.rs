//! Error taxonomy surfaced to callers.

use serde_json::{json, Value};
use thiserror::Error;

/// Classification of a failed request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// No response was received (timeout, refusal, DNS, broken stream).
    Network,
    /// The session could not be authenticated or renewed.
    AuthSessionExpired,
    /// Any other non-success HTTP status.
    Http(u16),
}

impl ErrorKind {
    /// Stable string code, e.g. `NETWORK_ERROR` or `HTTP_404`.
    pub fn code(&self) -> String {
        match self {
            ErrorKind::Network => "NETWORK_ERROR".to_string(),
            ErrorKind::AuthSessionExpired => "AUTH_SESSION_EXPIRED".to_string(),
            ErrorKind::Http(status) => format!("HTTP_{}", status),
        }
    }
}

/// Structured error returned by the request pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ApiError {
    pub kind: ErrorKind,
    pub status: Option<u16>,
    pub message: String,
}

impl ApiError {
    pub fn network(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Network,
            status: None,
            message: message.into(),
        }
    }

    pub fn session_expired() -> Self {
        Self {
            kind: ErrorKind::AuthSessionExpired,
            status: Some(401),
            message: "Your session has expired. Please sign in again.".to_string(),
        }
    }

    /// Build an error for a non-success status, preferring the server's message.
    pub fn from_status(status: u16, body: &str) -> Self {
        let message = server_message(body).unwrap_or_else(|| generic_message(status).to_string());
        Self {
            kind: ErrorKind::Http(status),
            status: Some(status),
            message,
        }
    }

    pub fn code(&self) -> String {
        self.kind.code()
    }

    /// Only network failures are worth retrying by the caller.
    pub fn is_retryable(&self) -> bool {
        self.kind == ErrorKind::Network
    }

    pub fn to_json(&self) -> Value {
        json!({
            "kind": self.code(),
            "status": self.status,
            "message": self.message,
        })
    }
}

/// Pull a human-readable message out of an error body.
fn server_message(body: &str) -> Option<String> {
    let payload: Value = serde_json::from_str(body).ok()?;
    let candidates = [
        payload.get("message"),
        payload.get("error").filter(|e| e.is_string()),
        payload.get("error").and_then(|e| e.get("message")),
    ];
    let message = candidates
        .into_iter()
        .flatten()
        .filter_map(Value::as_str)
        .map(str::trim)
        .find(|m| !m.is_empty())
        .map(str::to_string);
    message
}

fn generic_message(status: u16) -> &'static str {
    match status {
        400 => "The request was invalid.",
        403 => "You do not have permission to perform this action.",
        404 => "The requested resource was not found.",
        408 => "The server timed out waiting for the request.",
        409 => "The request conflicts with the current state.",
        413 => "The request payload is too large.",
        422 => "The request could not be processed.",
        429 => "Too many requests. Please try again later.",
        500 => "The server encountered an internal error.",
        502 | 503 | 504 => "The server is temporarily unavailable.",
        400..=499 => "The request failed.",
        _ => "The server returned an unexpected error.",
    }
}
