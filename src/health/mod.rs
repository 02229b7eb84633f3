//! Health checking subsystem.
//!
//! # Data Flow
//! ```text
//! Discovery needs a verdict on a candidate base URL:
//!     → probe.rs (one bounded GET <base_url>/health)
//!     → ProbeResult { reachable }
//! ```
//!
//! # Design Decisions
//! - The probe is a trait so discovery can run against any implementation
//! - A probe never retries and never errors; it only answers yes/no

pub mod probe;

pub use probe::{HttpProbe, Probe, ProbeResult};
