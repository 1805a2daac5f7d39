//! The key-value store the proxy caches into.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

/// Result of a backend read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    Hit(Bytes),
    Miss,
}

/// Result of a backend delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Removal {
    Deleted,
    NotFound,
}

/// A failure as the backend itself reports it.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct BackendFailure {
    pub message: String,
}

impl BackendFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// A key-value store with per-entry TTL.
///
/// Expiry is the backend's job: an entry written with `ttl` must stop being
/// returned by [`get`](Self::get) once `ttl` has elapsed. Implementations
/// must be safe to share across tasks without external locking.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// A short name for logs and error messages, e.g. `"memory"`.
    fn name(&self) -> &'static str;

    async fn get(&self, key: &str) -> Result<Lookup, BackendFailure>;

    /// Writes `value` under `key`, replacing any previous entry and
    /// restarting its TTL.
    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<(), BackendFailure>;

    async fn delete(&self, key: &str) -> Result<Removal, BackendFailure>;
}
