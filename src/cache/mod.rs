//! Caching layer — key derivation, the backend seam, and the adapter the
//! engine reads and writes through.
//!
//! - [`CacheBackend`] — a key-value store with per-entry TTL.
//! - [`MemoryBackend`] — the in-process implementation.
//! - [`CacheAdapter`] — turns backend results into [`FetchOutcome`] and
//!   [`CacheBackendError`](crate::error::CacheBackendError).
//! - [`ResourceKey`] — derives the `fresh: ` / `stale: ` key pair.
//! - [`TtlPair`] — the two lifetimes every populate writes with.

use std::time::Duration;

use thiserror::Error;

pub mod adapter;
pub mod backend;
pub mod keys;
pub mod memory;

pub use adapter::{CacheAdapter, FetchOutcome};
pub use backend::{BackendFailure, CacheBackend, Lookup, Removal};
pub use keys::ResourceKey;
pub use memory::MemoryBackend;

/// Rejected TTL combinations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TtlError {
    #[error("fresh TTL must be greater than zero")]
    ZeroFresh,

    #[error("stale TTL ({stale:?}) must be longer than fresh TTL ({fresh:?})")]
    StaleNotLonger { fresh: Duration, stale: Duration },
}

/// Lifetimes of the fresh and stale entries. `stale > fresh > 0` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TtlPair {
    fresh: Duration,
    stale: Duration,
}

impl TtlPair {
    pub fn new(fresh: Duration, stale: Duration) -> Result<Self, TtlError> {
        if fresh.is_zero() {
            return Err(TtlError::ZeroFresh);
        }
        if stale <= fresh {
            return Err(TtlError::StaleNotLonger { fresh, stale });
        }
        Ok(Self { fresh, stale })
    }

    pub fn fresh(&self) -> Duration {
        self.fresh
    }

    pub fn stale(&self) -> Duration {
        self.stale
    }
}

impl Default for TtlPair {
    /// One minute fresh, one hour stale.
    fn default() -> Self {
        Self {
            fresh: Duration::from_secs(60),
            stale: Duration::from_secs(3600),
        }
    }
}
