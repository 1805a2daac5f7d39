//! # swr-proxy
//!
//! A stale-while-revalidate caching reverse proxy on a from-scratch async
//! HTTP/1.1 server.
//!
//! Reads of the cached resource are answered from the fresh cache entry when
//! there is one, from the stale entry (while a background task refreshes it)
//! when there is not, and from the origin only when both are gone.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use swr_proxy::background::Background;
//! use swr_proxy::cache::{CacheAdapter, MemoryBackend, TtlPair};
//! use swr_proxy::config::ProxyConfig;
//! use swr_proxy::engine::Engine;
//! use swr_proxy::middleware::{LoggerMiddleware, Pipeline};
//! use swr_proxy::origin::HttpOrigin;
//! use swr_proxy::proxy::ProxyHandler;
//! use swr_proxy::server::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ProxyConfig::default();
//!     let origin = Arc::new(HttpOrigin::new(Duration::from_secs(30))?);
//!     let engine = Engine::new(
//!         CacheAdapter::new(Arc::new(MemoryBackend::new(10_000))),
//!         origin.clone(),
//!         Arc::new(Background::new()),
//!         TtlPair::default(),
//!     );
//!     let handler = Arc::new(ProxyHandler::new(engine, origin, config.clone()));
//!     let pipeline = Pipeline::new(handler.routes()).with(Arc::new(LoggerMiddleware));
//!
//!     let server = Server::bind(&config.listen).await?;
//!     server
//!         .run(move |req| {
//!             let pipeline = pipeline.clone();
//!             async move { pipeline.handle(req).await }
//!         })
//!         .await?;
//!     Ok(())
//! }
//! ```

// ── Caching core ──────────────────────────────────────────────────────────────
pub mod cache;
pub mod engine;
pub mod error;
pub mod origin;

// ── Serving ───────────────────────────────────────────────────────────────────
pub mod background;
pub mod config;
pub mod context;
pub mod http;
pub mod middleware;
pub mod proxy;
pub mod router;
pub mod server;

#[cfg(test)]
mod testing;

// ── Convenience re-exports ────────────────────────────────────────────────────
pub use engine::{Engine, Served, Source};
pub use error::{CacheBackendError, OriginFetchError};
pub use http::{Headers, Method, Request, Response, StatusCode};
pub use server::{Server, ServerError};
