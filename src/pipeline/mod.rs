//! Request pipeline subsystem.
//!
//! # Data Flow
//! ```text
//! RequestSpec
//!     → discovery.discover() (base URL, never fails)
//!     → session store (access token, point-in-time read)
//!     → HTTP call
//!         2xx            → body
//!         401, fresh ctx → refresh via /auth/refresh → resend once
//!         401, retried   → session cleared, AUTH_SESSION_EXPIRED
//!         refresh fails  → session cleared, AUTH_SESSION_EXPIRED (+ redetect if no response)
//!         no response    → force_redetect() in background, NETWORK_ERROR
//!         other status   → HTTP_<status>
//! ```
//!
//! # Design Decisions
//! - Callers only ever see `ApiError`, never a transport error
//! - Each request owns its retry state (context.rs)

pub mod client;
pub mod context;
pub mod error;

pub use client::RequestPipeline;
pub use context::{PendingRequestContext, RequestKind, RequestSpec};
pub use error::{ApiError, ErrorKind};
