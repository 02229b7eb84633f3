//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events via `tracing`)
//!     → metrics.rs (counters and histograms via the `metrics` facade)
//!
//! Consumers:
//!     → Log output (stderr through tracing-subscriber)
//!     → Whatever metrics recorder the embedding application installs
//! ```
//!
//! # Design Decisions
//! - Structured fields (base_url, request_id, status) on every event
//! - Without an installed recorder the metric macros are no-ops
//! - The library never installs a recorder itself

pub mod logging;
pub mod metrics;
