//! Upstream origin access.
//!
//! [`OriginClient`] is the seam the engine and the pass-through path fetch
//! through; [`HttpOrigin`] is the reqwest-backed implementation used in
//! production.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::debug;

use crate::error::OriginFetchError;
use crate::http::{Headers, StatusCode};

/// A complete response from the origin.
#[derive(Debug, Clone)]
pub struct OriginResponse {
    pub status: StatusCode,
    pub headers: Headers,
    pub body: Bytes,
}

/// Performs a `GET` against the upstream.
///
/// Any response the origin sends, whatever its status, is `Ok`; `Err` means
/// no response was obtained. Timeouts are the implementation's concern.
#[async_trait]
pub trait OriginClient: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<OriginResponse, OriginFetchError>;
}

/// [`OriginClient`] over a shared [`reqwest::Client`].
#[derive(Clone)]
pub struct HttpOrigin {
    client: reqwest::Client,
}

impl HttpOrigin {
    /// Builds a client whose every request is bounded by `timeout`.
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("swr-proxy/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl OriginClient for HttpOrigin {
    async fn fetch(&self, url: &str) -> Result<OriginResponse, OriginFetchError> {
        let transport = |e: reqwest::Error| OriginFetchError::Transport {
            url: url.to_owned(),
            source: Box::new(e),
        };

        let response = self.client.get(url).send().await.map_err(transport)?;

        let code = response.status().as_u16();
        let status = StatusCode::from_u16(code).ok_or_else(|| OriginFetchError::Status {
            url: url.to_owned(),
            status: code,
        })?;

        let mut headers = Headers::with_capacity(response.headers().len());
        for (name, value) in response.headers() {
            if let Ok(value) = value.to_str() {
                headers.insert(name.as_str(), value);
            }
        }

        let body = response.bytes().await.map_err(transport)?;

        debug!(url, status = code, bytes = body.len(), "origin responded");

        Ok(OriginResponse {
            status,
            headers,
            body,
        })
    }
}
