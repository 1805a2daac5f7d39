//! Maps HTTP requests onto the engine.
//!
//! For a cached path of `/posts/`:
//!
//! - `GET /posts/` → [`Engine::fetch`], body with `X-Cache: HIT | STALE | MISS`
//! - `DELETE /posts/` → [`Engine::invalidate`]
//! - `GET /posts/<anything>` → relayed to the origin untouched, no cache
//!
//! Anything outside the cached path is not routed.

use std::sync::Arc;

use tracing::{error, warn};

use crate::config::ProxyConfig;
use crate::context::Context;
use crate::engine::Engine;
use crate::origin::OriginClient;
use crate::router::Router;
use crate::{Response, StatusCode};

/// Request-facing side of the proxy.
///
/// Holds the engine for the cached resource and the origin client for the
/// pass-through path; both are injected already built.
pub struct ProxyHandler {
    engine: Engine,
    origin: Arc<dyn OriginClient>,
    config: ProxyConfig,
}

impl ProxyHandler {
    pub fn new(engine: Engine, origin: Arc<dyn OriginClient>, config: ProxyConfig) -> Self {
        Self {
            engine,
            origin,
            config,
        }
    }

    /// Canonical upstream URL of the cached resource. `/posts` and `/posts/`
    /// share it, so they share cache entries too.
    pub fn cached_url(&self) -> String {
        self.config.origin_url(&self.config.cached_path)
    }

    /// `GET` on the cached resource.
    pub async fn handle_get(&self) -> Response {
        match self.engine.fetch(&self.cached_url()).await {
            Ok(served) => Response::new(StatusCode::OK)
                .header("Content-Type", self.config.content_type.as_str())
                .header("X-Cache", served.source.as_header())
                .body_bytes(served.body),
            Err(e) => {
                error!(error = %e, "no cached copy and origin fetch failed");
                Response::new(StatusCode::BAD_GATEWAY).body("Bad Gateway")
            }
        }
    }

    /// `DELETE` on the cached resource.
    pub async fn handle_delete(&self) -> Response {
        match self.engine.invalidate(&self.cached_url()).await {
            Ok(()) => Response::new(StatusCode::NO_CONTENT),
            Err(e) => {
                error!(error = %e, "invalidation failed");
                Response::new(StatusCode::SERVICE_UNAVAILABLE).body("Cache unavailable")
            }
        }
    }

    /// Relays `target` (path plus query) to the origin and returns the
    /// origin's status, end-to-end headers, and body as they came.
    pub async fn pass_through(&self, target: &str) -> Response {
        let url = self.config.origin_url(target);
        match self.origin.fetch(&url).await {
            Ok(upstream) => {
                let mut headers = upstream.headers;
                headers.strip_hop_by_hop();
                Response::new(upstream.status)
                    .headers(headers)
                    .body_bytes(upstream.body)
            }
            Err(e) => {
                warn!(url, error = %e, "pass-through fetch failed");
                Response::new(StatusCode::BAD_GATEWAY).body("Bad Gateway")
            }
        }
    }

    /// Registers the cached-resource and pass-through routes.
    pub fn routes(self: Arc<Self>) -> Router {
        let mut router = Router::new();
        let cached = self.config.cached_path.clone();
        let below = format!("{}/*", cached.trim_end_matches('/'));

        let handler = Arc::clone(&self);
        router.get(&cached, move |_ctx: Context| {
            let handler = Arc::clone(&handler);
            async move { handler.handle_get().await }
        });

        let handler = Arc::clone(&self);
        router.delete(&cached, move |_ctx: Context| {
            let handler = Arc::clone(&handler);
            async move { handler.handle_delete().await }
        });

        let handler = self;
        router.get(&below, move |ctx: Context| {
            let handler = Arc::clone(&handler);
            async move { handler.pass_through(&ctx.request().target()).await }
        });

        router
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;
    use crate::background::Spawner;
    use crate::cache::{CacheAdapter, CacheBackend, TtlPair};
    use crate::error::CacheOp;
    use crate::http::Request;
    use crate::testing::{ManualSpawner, RecordingBackend, StubOrigin};

    const FRESH: &str = "fresh: https://example.com/posts/";
    const STALE: &str = "stale: https://example.com/posts/";

    struct Harness {
        backend: Arc<RecordingBackend>,
        origin: Arc<StubOrigin>,
        spawner: Arc<ManualSpawner>,
        router: Router,
    }

    fn harness(origin: StubOrigin) -> Harness {
        let backend = Arc::new(RecordingBackend::default());
        let origin = Arc::new(origin);
        let spawner = Arc::new(ManualSpawner::default());
        let engine = Engine::new(
            CacheAdapter::new(backend.clone() as Arc<dyn CacheBackend>),
            origin.clone(),
            spawner.clone() as Arc<dyn Spawner>,
            TtlPair::default(),
        );
        let handler = Arc::new(ProxyHandler::new(
            engine,
            origin.clone(),
            ProxyConfig::default(),
        ));
        Harness {
            backend,
            origin,
            spawner,
            router: handler.routes(),
        }
    }

    async fn send(router: &Router, method: &str, target: &str) -> Response {
        let raw = format!("{method} {target} HTTP/1.1\r\nHost: proxy\r\n\r\n");
        let (request, _) = Request::parse(raw.as_bytes()).unwrap();
        router.dispatch(Context::new(request)).await
    }

    #[tokio::test]
    async fn miss_then_hit() {
        let h = harness(StubOrigin::serving(b"<ul>posts</ul>"));

        let first = send(&h.router, "GET", "/posts/").await;
        assert_eq!(first.status(), StatusCode::OK);
        assert_eq!(first.header_value("x-cache"), Some("MISS"));
        assert_eq!(
            first.header_value("content-type"),
            Some("text/html; charset=utf-8")
        );
        assert_eq!(first.body_ref(), &Bytes::from_static(b"<ul>posts</ul>"));

        h.spawner.run_all().await;

        let second = send(&h.router, "GET", "/posts").await;
        assert_eq!(second.header_value("x-cache"), Some("HIT"));
        assert_eq!(second.body_ref(), &Bytes::from_static(b"<ul>posts</ul>"));
        assert_eq!(h.origin.calls(), 1);
    }

    #[tokio::test]
    async fn stale_is_served_while_origin_is_down() {
        let h = harness(StubOrigin::down());
        h.backend.insert(STALE, b"yesterday");

        let response = send(&h.router, "GET", "/posts/").await;
        h.spawner.run_all().await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.header_value("x-cache"), Some("STALE"));
        assert_eq!(response.body_ref(), &Bytes::from_static(b"yesterday"));
    }

    #[tokio::test]
    async fn true_miss_with_origin_down_is_502() {
        let h = harness(StubOrigin::down());
        let response = send(&h.router, "GET", "/posts/").await;
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(h.spawner.pending(), 0);
    }

    #[tokio::test]
    async fn delete_invalidates() {
        let h = harness(StubOrigin::serving(b"x"));
        h.backend.insert(FRESH, b"a");
        h.backend.insert(STALE, b"b");

        let response = send(&h.router, "DELETE", "/posts/").await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(h.backend.entry(FRESH), None);
        assert_eq!(h.backend.entry(STALE), None);

        let again = send(&h.router, "DELETE", "/posts/").await;
        assert_eq!(again.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn delete_reports_backend_failure() {
        let h = harness(StubOrigin::serving(b"x"));
        h.backend.fail(CacheOp::Delete);

        let response = send(&h.router, "DELETE", "/posts/").await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn sub_resources_bypass_the_cache() {
        let h = harness(StubOrigin::serving(b"{\"id\":1}"));

        let response = send(&h.router, "GET", "/posts/1?expand=comments").await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.header_value("x-cache"), None);
        assert_eq!(response.header_value("content-type"), Some("application/json"));
        assert_eq!(response.header_value("transfer-encoding"), None);
        assert_eq!(response.body_ref(), &Bytes::from_static(b"{\"id\":1}"));
        assert_eq!(
            h.origin.urls(),
            vec!["https://example.com/posts/1?expand=comments".to_owned()]
        );
        assert!(h.backend.ops().is_empty());
        assert_eq!(h.spawner.pending(), 0);
    }

    #[tokio::test]
    async fn pass_through_relays_origin_status() {
        let h = harness(StubOrigin::status(404));
        let response = send(&h.router, "GET", "/posts/missing").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(response.body_ref(), &Bytes::from_static(b"upstream says no"));
    }

    #[tokio::test]
    async fn doubled_slash_still_reaches_cached_resource() {
        let h = harness(StubOrigin::serving(b"unused"));
        h.backend.insert(FRESH, b"cached");

        let response = send(&h.router, "GET", "/posts//").await;

        assert_eq!(response.header_value("x-cache"), Some("HIT"));
        assert_eq!(response.body_ref(), &Bytes::from_static(b"cached"));
        assert_eq!(h.origin.calls(), 0);
    }

    #[tokio::test]
    async fn outside_prefix_is_not_routed() {
        let h = harness(StubOrigin::serving(b"x"));
        let response = send(&h.router, "GET", "/admin").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(h.origin.calls(), 0);
    }

    #[tokio::test]
    async fn cache_outage_degrades_to_origin() {
        let h = harness(StubOrigin::serving(b"v2"));
        h.backend.insert(FRESH, b"v1");
        h.backend.fail(CacheOp::Get);

        let response = send(&h.router, "GET", "/posts/").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.header_value("x-cache"), Some("MISS"));
        assert_eq!(response.body_ref(), &Bytes::from_static(b"v2"));

        h.origin.go_down();
        let response = send(&h.router, "GET", "/posts/").await;
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }
}
