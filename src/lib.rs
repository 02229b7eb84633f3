//! Resilient backend client.
//!
//! Finds a reachable API server (remembered URLs, local network scan, static
//! fallback) and sends every request through a pipeline that manages bearer
//! tokens, refreshes once on 401, and re-discovers the server when it stops
//! answering.

pub mod config;
pub mod discovery;
pub mod health;
pub mod observability;
pub mod pipeline;
pub mod session;
pub mod store;

pub use config::ClientConfig;
pub use discovery::ServerDiscoveryService;
pub use pipeline::{ApiError, ErrorKind, RequestPipeline, RequestSpec};
pub use session::{AuthSession, LoginMethod, SessionManager};
pub use store::TokenStore;
