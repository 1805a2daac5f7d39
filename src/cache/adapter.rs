//! Uniform view over a [`CacheBackend`].

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;

use super::backend::{BackendFailure, CacheBackend, Lookup, Removal};
use crate::error::{CacheBackendError, CacheOp};

/// What a cache read produced.
///
/// `BackendError` is deliberately a value rather than an `Err`: the read
/// path treats it like a miss but still wants to see it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Hit(Bytes),
    Miss,
    BackendError(CacheBackendError),
}

/// Translates backend results into [`FetchOutcome`] and backend failures
/// into [`CacheBackendError`]. Holds no state of its own and performs exactly
/// one backend call per operation.
#[derive(Clone)]
pub struct CacheAdapter {
    backend: Arc<dyn CacheBackend>,
}

impl CacheAdapter {
    pub fn new(backend: Arc<dyn CacheBackend>) -> Self {
        Self { backend }
    }

    pub async fn get(&self, key: &str) -> FetchOutcome {
        match self.backend.get(key).await {
            Ok(Lookup::Hit(body)) => FetchOutcome::Hit(body),
            Ok(Lookup::Miss) => FetchOutcome::Miss,
            Err(failure) => FetchOutcome::BackendError(self.error(CacheOp::Get, key, failure)),
        }
    }

    pub async fn set(&self, key: &str, body: Bytes, ttl: Duration) -> Result<(), CacheBackendError> {
        self.backend
            .set(key, body, ttl)
            .await
            .map_err(|failure| self.error(CacheOp::Set, key, failure))
    }

    /// Removes `key`. An absent key counts as success.
    pub async fn delete(&self, key: &str) -> Result<(), CacheBackendError> {
        match self.backend.delete(key).await {
            Ok(Removal::Deleted | Removal::NotFound) => Ok(()),
            Err(failure) => Err(self.error(CacheOp::Delete, key, failure)),
        }
    }

    fn error(&self, op: CacheOp, key: &str, failure: BackendFailure) -> CacheBackendError {
        CacheBackendError {
            backend: self.backend.name(),
            op,
            key: key.to_owned(),
            message: failure.message,
        }
    }
}
