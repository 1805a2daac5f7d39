//! The stale-while-revalidate engine.
//!
//! A read walks a fixed cascade: the fresh entry, then the stale entry, then
//! the origin. Only the last step makes the client wait on the upstream, and
//! any step that returns data leaves the cache refresh to a detached task.
//!
//! | fresh | stale | origin | client gets        | background        |
//! |-------|-------|--------|--------------------|-------------------|
//! | hit   | –     | –      | fresh body         | nothing           |
//! | miss  | hit   | –      | stale body         | populate (refetch)|
//! | miss  | miss  | ok     | origin body        | populate (reuse)  |
//! | miss  | miss  | error  | `OriginFetchError` | nothing           |
//!
//! A cache backend failure on read counts as a miss.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, info, warn};

use crate::background::Spawner;
use crate::cache::{CacheAdapter, FetchOutcome, ResourceKey, TtlPair};
use crate::error::{CacheBackendError, OriginFetchError};
use crate::origin::OriginClient;

/// Where a served body came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Fresh,
    Stale,
    Origin,
}

impl Source {
    /// Value of the `X-Cache` response header.
    pub fn as_header(self) -> &'static str {
        match self {
            Self::Fresh => "HIT",
            Self::Stale => "STALE",
            Self::Origin => "MISS",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Fresh => "fresh",
            Self::Stale => "stale",
            Self::Origin => "origin",
        })
    }
}

/// A body handed back by [`Engine::fetch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Served {
    pub body: Bytes,
    pub source: Source,
}

/// Read, populate, and invalidate over a cache and an origin.
///
/// Cloning is cheap; clones share the same collaborators. Detached tasks
/// carry their own clone so they never borrow from the request that
/// started them.
#[derive(Clone)]
pub struct Engine {
    cache: CacheAdapter,
    origin: Arc<dyn OriginClient>,
    spawner: Arc<dyn Spawner>,
    ttl: TtlPair,
}

impl Engine {
    pub fn new(
        cache: CacheAdapter,
        origin: Arc<dyn OriginClient>,
        spawner: Arc<dyn Spawner>,
        ttl: TtlPair,
    ) -> Self {
        Self {
            cache,
            origin,
            spawner,
            ttl,
        }
    }

    /// Serves `origin_url` from the freshest source available.
    ///
    /// # Errors
    ///
    /// Only on a true miss whose origin fetch fails. Every other outcome
    /// returns a body, and nothing scheduled in the background can turn it
    /// into an error afterwards.
    pub async fn fetch(&self, origin_url: &str) -> Result<Served, OriginFetchError> {
        let key = ResourceKey::new(origin_url);

        if let Some(body) = self.lookup(&key.fresh()).await {
            debug!(url = origin_url, "fresh hit");
            return Ok(Served {
                body,
                source: Source::Fresh,
            });
        }

        if let Some(body) = self.lookup(&key.stale()).await {
            debug!(url = origin_url, "stale hit, refreshing in background");
            self.schedule_populate(origin_url, None);
            return Ok(Served {
                body,
                source: Source::Stale,
            });
        }

        info!(url = origin_url, "cache miss, fetching from origin");
        let body = self.fetch_origin(origin_url).await?;
        self.schedule_populate(origin_url, Some(body.clone()));

        Ok(Served {
            body,
            source: Source::Origin,
        })
    }

    /// Writes the stale entry, then the fresh entry, both holding `body`.
    ///
    /// Without a `body` the origin is fetched first. Runs detached, so every
    /// failure is logged here and goes no further.
    pub async fn populate(&self, origin_url: &str, body: Option<Bytes>) {
        let body = match body {
            Some(body) => body,
            None => match self.fetch_origin(origin_url).await {
                Ok(body) => body,
                Err(e) => {
                    warn!(url = origin_url, error = %e, "refresh aborted: origin fetch failed");
                    return;
                }
            },
        };

        let key = ResourceKey::new(origin_url);

        // Stale first: losing the fresh write costs a refresh, losing the
        // stale one costs a blocking origin fetch.
        if let Err(e) = self.cache.set(&key.stale(), body.clone(), self.ttl.stale()).await {
            warn!(url = origin_url, error = %e, "failed to write stale entry");
        }
        if let Err(e) = self.cache.set(&key.fresh(), body, self.ttl.fresh()).await {
            warn!(url = origin_url, error = %e, "failed to write fresh entry");
        }

        debug!(url = origin_url, "populated");
    }

    /// Deletes both entries of `origin_url`.
    ///
    /// Both deletes are always attempted. Entries that do not exist are not
    /// an error, so invalidating twice succeeds twice.
    ///
    /// # Errors
    ///
    /// The first genuine backend failure, fresh key before stale key.
    pub async fn invalidate(&self, origin_url: &str) -> Result<(), CacheBackendError> {
        let key = ResourceKey::new(origin_url);
        let (fresh_key, stale_key) = (key.fresh(), key.stale());

        let (fresh, stale) = tokio::join!(
            self.cache.delete(&fresh_key),
            self.cache.delete(&stale_key)
        );

        for result in [&fresh, &stale] {
            if let Err(e) = result {
                warn!(url = origin_url, error = %e, "invalidation failed");
            }
        }

        fresh.and(stale)?;
        info!(url = origin_url, "invalidated");
        Ok(())
    }

    async fn lookup(&self, key: &str) -> Option<Bytes> {
        match self.cache.get(key).await {
            FetchOutcome::Hit(body) => Some(body),
            FetchOutcome::Miss => None,
            FetchOutcome::BackendError(e) => {
                warn!(key, error = %e, "cache read failed, treating as miss");
                None
            }
        }
    }

    async fn fetch_origin(&self, origin_url: &str) -> Result<Bytes, OriginFetchError> {
        let response = self.origin.fetch(origin_url).await?;
        if !response.status.is_success() {
            return Err(OriginFetchError::Status {
                url: origin_url.to_owned(),
                status: response.status.as_u16(),
            });
        }
        Ok(response.body)
    }

    fn schedule_populate(&self, origin_url: &str, body: Option<Bytes>) {
        let engine = self.clone();
        let url = origin_url.to_owned();
        self.spawner.spawn(
            "populate",
            Box::pin(async move { engine.populate(&url, body).await }),
        );
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::cache::CacheBackend;
    use crate::error::CacheOp;
    use crate::testing::{ManualSpawner, Op, RecordingBackend, StubOrigin};

    const URL: &str = "https://example.com/posts/";
    const FRESH: &str = "fresh: https://example.com/posts/";
    const STALE: &str = "stale: https://example.com/posts/";

    struct Harness {
        backend: Arc<RecordingBackend>,
        origin: Arc<StubOrigin>,
        spawner: Arc<ManualSpawner>,
        engine: Engine,
    }

    fn harness(origin: StubOrigin) -> Harness {
        let backend = Arc::new(RecordingBackend::default());
        let origin = Arc::new(origin);
        let spawner = Arc::new(ManualSpawner::default());
        let engine = Engine::new(
            CacheAdapter::new(backend.clone() as Arc<dyn CacheBackend>),
            origin.clone(),
            spawner.clone(),
            TtlPair::default(),
        );
        Harness {
            backend,
            origin,
            spawner,
            engine,
        }
    }

    #[tokio::test]
    async fn fresh_hit_wins_and_schedules_nothing() {
        let h = harness(StubOrigin::serving(b"origin"));
        h.backend.insert(FRESH, b"fresh body");
        h.backend.insert(STALE, b"stale body");

        let served = h.engine.fetch(URL).await.unwrap();

        assert_eq!(served.body, Bytes::from_static(b"fresh body"));
        assert_eq!(served.source, Source::Fresh);
        assert_eq!(h.spawner.pending(), 0);
        assert_eq!(h.origin.calls(), 0);
        assert_eq!(h.backend.ops(), vec![Op::Get(FRESH.into())]);
    }

    #[tokio::test]
    async fn stale_hit_returns_stale_and_schedules_one_refresh() {
        let h = harness(StubOrigin::serving(b"new body"));
        h.backend.insert(STALE, b"old body");

        let served = h.engine.fetch(URL).await.unwrap();

        assert_eq!(served.body, Bytes::from_static(b"old body"));
        assert_eq!(served.source, Source::Stale);
        assert_eq!(h.spawner.names(), vec!["populate"]);
        // Nothing touched the origin before the client got its answer.
        assert_eq!(h.origin.calls(), 0);

        h.spawner.run_all().await;

        assert_eq!(h.origin.calls(), 1);
        assert_eq!(h.backend.entry(FRESH), Some(Bytes::from_static(b"new body")));
        assert_eq!(h.backend.entry(STALE), Some(Bytes::from_static(b"new body")));
    }

    #[tokio::test]
    async fn failed_refresh_after_stale_hit_keeps_old_entry() {
        let h = harness(StubOrigin::down());
        h.backend.insert(STALE, b"old body");

        let served = h.engine.fetch(URL).await.unwrap();
        h.spawner.run_all().await;

        assert_eq!(served.body, Bytes::from_static(b"old body"));
        assert_eq!(h.backend.entry(STALE), Some(Bytes::from_static(b"old body")));
        assert!(h.backend.writes().is_empty());
    }

    #[tokio::test]
    async fn error_status_on_refresh_keeps_old_entry() {
        let h = harness(StubOrigin::status(500));
        h.backend.insert(STALE, b"old body");

        let served = h.engine.fetch(URL).await.unwrap();
        h.spawner.run_all().await;

        assert_eq!(served.source, Source::Stale);
        assert_eq!(h.origin.calls(), 1);
        assert!(h.backend.writes().is_empty());
        assert_eq!(h.backend.entry(STALE), Some(Bytes::from_static(b"old body")));
        assert_eq!(h.backend.entry(FRESH), None);
    }

    #[tokio::test]
    async fn true_miss_fetches_once_and_populates_without_refetch() {
        let h = harness(StubOrigin::serving(b"origin body"));

        let served = h.engine.fetch(URL).await.unwrap();

        assert_eq!(served.body, Bytes::from_static(b"origin body"));
        assert_eq!(served.source, Source::Origin);
        assert_eq!(h.origin.calls(), 1);
        assert_eq!(h.origin.urls(), vec![URL.to_owned()]);
        assert_eq!(h.spawner.pending(), 1);

        h.spawner.run_all().await;

        assert_eq!(h.origin.calls(), 1);
        assert_eq!(h.backend.entry(FRESH), Some(Bytes::from_static(b"origin body")));
        assert_eq!(h.backend.entry(STALE), Some(Bytes::from_static(b"origin body")));
    }

    #[tokio::test]
    async fn true_miss_with_origin_down_fails_and_schedules_nothing() {
        let h = harness(StubOrigin::down());

        let err = h.engine.fetch(URL).await.unwrap_err();

        assert!(matches!(err, OriginFetchError::Transport { .. }));
        assert_eq!(err.url(), URL);
        assert_eq!(h.spawner.pending(), 0);
    }

    #[tokio::test]
    async fn true_miss_with_error_status_is_not_cached() {
        let h = harness(StubOrigin::status(500));

        let err = h.engine.fetch(URL).await.unwrap_err();

        assert!(matches!(err, OriginFetchError::Status { status: 500, .. }));
        assert_eq!(h.spawner.pending(), 0);
        assert!(h.backend.writes().is_empty());
    }

    #[tokio::test]
    async fn cascade_order_is_fresh_then_stale() {
        let h = harness(StubOrigin::serving(b"x"));

        h.engine.fetch(URL).await.unwrap();

        assert_eq!(
            h.backend.ops(),
            vec![Op::Get(FRESH.into()), Op::Get(STALE.into())]
        );
    }

    #[tokio::test]
    async fn backend_read_errors_fall_through_to_origin() {
        let h = harness(StubOrigin::serving(b"origin body"));
        h.backend.insert(FRESH, b"unreachable");
        h.backend.fail(CacheOp::Get);

        let served = h.engine.fetch(URL).await.unwrap();

        assert_eq!(served.source, Source::Origin);
        assert_eq!(served.body, Bytes::from_static(b"origin body"));
    }

    #[tokio::test]
    async fn fresh_read_error_falls_through_to_stale_hit() {
        let h = harness(StubOrigin::serving(b"new body"));
        h.backend.insert(FRESH, b"unreachable");
        h.backend.insert(STALE, b"old body");
        h.backend.fail_key(CacheOp::Get, FRESH);

        let served = h.engine.fetch(URL).await.unwrap();

        assert_eq!(served.source, Source::Stale);
        assert_eq!(served.body, Bytes::from_static(b"old body"));
        assert_eq!(h.origin.calls(), 0);
        assert_eq!(h.spawner.names(), vec!["populate"]);
    }

    #[tokio::test]
    async fn populate_writes_stale_before_fresh_with_their_ttls() {
        let h = harness(StubOrigin::serving(b"unused"));

        h.engine
            .populate(URL, Some(Bytes::from_static(b"body")))
            .await;

        assert_eq!(
            h.backend.writes(),
            vec![
                Op::Set(STALE.into(), Duration::from_secs(3600)),
                Op::Set(FRESH.into(), Duration::from_secs(60)),
            ]
        );
        assert_eq!(h.origin.calls(), 0);
    }

    #[tokio::test]
    async fn populate_swallows_write_failures() {
        let h = harness(StubOrigin::serving(b"unused"));
        h.backend.fail(CacheOp::Set);

        h.engine
            .populate(URL, Some(Bytes::from_static(b"body")))
            .await;

        // Both writes were still attempted.
        assert_eq!(h.backend.writes().len(), 2);
        assert_eq!(h.backend.entry(FRESH), None);
    }

    #[tokio::test]
    async fn populate_then_fetch_skips_origin() {
        let h = harness(StubOrigin::serving(b"unused"));

        h.engine
            .populate(URL, Some(Bytes::from_static(b"B")))
            .await;
        let served = h.engine.fetch(URL).await.unwrap();

        assert_eq!(served.body, Bytes::from_static(b"B"));
        assert_eq!(served.source, Source::Fresh);
        assert_eq!(h.origin.calls(), 0);
    }

    #[tokio::test]
    async fn invalidate_removes_both_entries() {
        let h = harness(StubOrigin::serving(b"x"));
        h.backend.insert(FRESH, b"a");
        h.backend.insert(STALE, b"b");

        h.engine.invalidate(URL).await.unwrap();

        assert_eq!(h.backend.entry(FRESH), None);
        assert_eq!(h.backend.entry(STALE), None);
    }

    #[tokio::test]
    async fn invalidate_is_idempotent() {
        let h = harness(StubOrigin::serving(b"x"));

        h.engine.invalidate(URL).await.unwrap();
        h.engine.invalidate(URL).await.unwrap();

        let deletes = h
            .backend
            .ops()
            .into_iter()
            .filter(|op| matches!(op, Op::Delete(_)))
            .count();
        assert_eq!(deletes, 4);
    }

    #[tokio::test]
    async fn invalidate_surfaces_backend_failure() {
        let h = harness(StubOrigin::serving(b"x"));
        h.backend.fail(CacheOp::Delete);

        let err = h.engine.invalidate(URL).await.unwrap_err();

        assert_eq!(err.op, CacheOp::Delete);
        assert_eq!(err.key, FRESH);
        // The stale delete was attempted regardless.
        assert!(h.backend.ops().contains(&Op::Delete(STALE.into())));
    }

    #[tokio::test]
    async fn invalidate_reports_stale_failure_after_deleting_fresh() {
        let h = harness(StubOrigin::serving(b"x"));
        h.backend.insert(FRESH, b"a");
        h.backend.insert(STALE, b"b");
        h.backend.fail_key(CacheOp::Delete, STALE);

        let err = h.engine.invalidate(URL).await.unwrap_err();

        assert_eq!(err.key, STALE);
        assert_eq!(h.backend.entry(FRESH), None);
        assert_eq!(h.backend.entry(STALE), Some(Bytes::from_static(b"b")));
    }

    #[tokio::test]
    async fn example_com_walkthrough() {
        let h = harness(StubOrigin::serving(b"<ul>posts</ul>"));

        let first = h.engine.fetch(URL).await.unwrap();
        h.spawner.run_all().await;

        assert_eq!(first.source, Source::Origin);
        assert_eq!(h.origin.urls(), vec!["https://example.com/posts/".to_owned()]);
        assert_eq!(h.backend.entry(STALE), Some(first.body.clone()));
        assert_eq!(h.backend.entry(FRESH), Some(first.body.clone()));

        let second = h.engine.fetch(URL).await.unwrap();

        assert_eq!(second.source, Source::Fresh);
        assert_eq!(second.body, first.body);
        assert_eq!(h.origin.calls(), 1);
    }
}
