//! Proxy configuration.
//!
//! Loaded from an optional JSON file; every field has a default, so an empty
//! object (or no file at all) yields a working configuration pointed at
//! `https://example.com/posts/`.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::cache::{TtlError, TtlPair};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid TTLs: {0}")]
    Ttl(#[from] TtlError),

    #[error("origin_host must not be empty")]
    EmptyHost,

    #[error("origin_scheme must be http or https, got {0:?}")]
    Scheme(String),

    #[error("cached_path must start with '/', got {0:?}")]
    CachedPath(String),
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct ProxyConfig {
    /// Address the proxy listens on.
    pub listen: String,
    pub origin_scheme: String,
    /// Host (and optional port) of the upstream.
    pub origin_host: String,
    /// The one resource served through the cache. Everything below it is
    /// passed straight through.
    pub cached_path: String,
    /// `Content-Type` sent with cached bodies.
    pub content_type: String,
    pub fresh_ttl_secs: u64,
    pub stale_ttl_secs: u64,
    /// Maximum number of entries in the in-memory backend.
    pub cache_capacity: u64,
    pub origin_timeout_secs: u64,
    /// How long shutdown waits for in-flight background refreshes.
    pub drain_timeout_secs: u64,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:8080".into(),
            origin_scheme: "https".into(),
            origin_host: "example.com".into(),
            cached_path: "/posts/".into(),
            content_type: "text/html; charset=utf-8".into(),
            fresh_ttl_secs: 60,
            stale_ttl_secs: 3600,
            cache_capacity: 10_000,
            origin_timeout_secs: 30,
            drain_timeout_secs: 10,
        }
    }
}

impl ProxyConfig {
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        serde_json::from_slice(&raw).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.ttl_pair()?;
        if self.origin_host.trim().is_empty() {
            return Err(ConfigError::EmptyHost);
        }
        if !matches!(self.origin_scheme.as_str(), "http" | "https") {
            return Err(ConfigError::Scheme(self.origin_scheme.clone()));
        }
        if !self.cached_path.starts_with('/') {
            return Err(ConfigError::CachedPath(self.cached_path.clone()));
        }
        Ok(())
    }

    pub fn ttl_pair(&self) -> Result<TtlPair, TtlError> {
        TtlPair::new(
            Duration::from_secs(self.fresh_ttl_secs),
            Duration::from_secs(self.stale_ttl_secs),
        )
    }

    /// Absolute upstream URL for a request target (`/path?query`).
    pub fn origin_url(&self, target: &str) -> String {
        format!("{}://{}{target}", self.origin_scheme, self.origin_host)
    }

    pub fn origin_timeout(&self) -> Duration {
        Duration::from_secs(self.origin_timeout_secs)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_secs(self.drain_timeout_secs)
    }
}
