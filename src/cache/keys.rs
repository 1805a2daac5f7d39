//! Cache key derivation.
//!
//! Every resource is stored under two keys over its canonical origin URL.
//! The prefixes are part of the on-wire contract with existing deployments
//! and must not change.

use std::fmt;

const FRESH_PREFIX: &str = "fresh: ";
const STALE_PREFIX: &str = "stale: ";

/// Canonical origin URL of a cached resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceKey(String);

impl ResourceKey {
    pub fn new(origin_url: impl Into<String>) -> Self {
        Self(origin_url.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Key of the short-lived, authoritative entry.
    pub fn fresh(&self) -> String {
        format!("{FRESH_PREFIX}{}", self.0)
    }

    /// Key of the long-lived fallback entry.
    pub fn stale(&self) -> String {
        format!("{STALE_PREFIX}{}", self.0)
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ResourceKey {
    fn from(url: &str) -> Self {
        Self::new(url)
    }
}
