//! Durable key-value storage for session and discovery state.
//!
//! # Responsibilities
//! - Define the `TokenStore` seam the rest of the crate persists through
//! - Name the keys the client owns
//! - Provide an in-memory store and a JSON-file store
//!
//! # Design Decisions
//! - Values are plain strings; structured values are JSON-encoded by callers
//! - `set_many`/`remove_many` apply as one unit so a session is never half-written
//! - Reads are point-in-time; no lock is held across calls

use async_trait::async_trait;
use thiserror::Error;

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

/// Keys owned by the client.
pub mod keys {
    pub const ACCESS_TOKEN: &str = "accessToken";
    pub const REFRESH_TOKEN: &str = "refreshToken";
    pub const USER: &str = "user";
    pub const USER_ROLE: &str = "userRole";
    pub const LOGIN_METHOD: &str = "loginMethod";
    pub const WORKING_URLS: &str = "workingServerUrls";

    /// Every key that makes up an authenticated session.
    pub const SESSION: [&str; 5] = [ACCESS_TOKEN, REFRESH_TOKEN, USER, USER_ROLE, LOGIN_METHOD];
}

/// Errors raised by a storage backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Opaque durable key-value store.
#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    async fn set(&self, key: &str, value: &str) -> StoreResult<()>;

    async fn set_many(&self, entries: &[(&str, String)]) -> StoreResult<()>;

    async fn remove_many(&self, keys: &[&str]) -> StoreResult<()>;
}
