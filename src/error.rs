//! Error taxonomy of the caching core.
//!
//! Two failure families exist: the cache service failed, or the origin
//! failed. Whether either reaches a client is decided by the call site, not
//! by the type: reads recover from cache failures, detached populates log and
//! drop everything, and only the synchronous true-miss and invalidate paths
//! hand an error back.

use std::fmt;

use thiserror::Error;

/// The cache operation that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheOp {
    Get,
    Set,
    Delete,
}

impl fmt::Display for CacheOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Get => "get",
            Self::Set => "set",
            Self::Delete => "delete",
        })
    }
}

/// Any failure reported by the cache service (network, auth, quota, ...).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("cache backend `{backend}` failed to {op} `{key}`: {message}")]
pub struct CacheBackendError {
    pub backend: &'static str,
    pub op: CacheOp,
    pub key: String,
    pub message: String,
}

/// The origin could not be reached, or answered with a non-success status on
/// a path that only accepts cacheable bodies.
#[derive(Debug, Error)]
pub enum OriginFetchError {
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("origin answered {status} for {url}")]
    Status { url: String, status: u16 },
}

impl OriginFetchError {
    pub fn url(&self) -> &str {
        match self {
            Self::Transport { url, .. } | Self::Status { url, .. } => url,
        }
    }
}
