//! Backend discovery subsystem.
//!
//! # Data Flow
//! ```text
//! discover()
//!     → current URL set? re-probe it (health::probe) → reachable: done
//!     → full discovery (one in flight, shared by all callers):
//!         1. cache.rs   replay remembered URLs, most recent first
//!         2. scan.rs    local /24 × ports, probed in batches
//!         3. fallback   static URL from config
//!     → winner promoted in cache.rs and persisted to the store
//!     → current URL swapped atomically
//! ```
//!
//! # Design Decisions
//! - One service per process, passed to pipelines by `Arc`
//! - Discovery degrades instead of failing
//! - Candidate URLs are normalized before they are compared or stored

pub mod cache;
pub mod candidate;
pub mod scan;
pub mod service;

pub use cache::WorkingUrlCache;
pub use candidate::{normalize_base_url, ServerCandidate};
pub use service::{DiscoverySource, ServerDiscoveryService};
