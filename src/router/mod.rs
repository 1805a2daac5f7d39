//! Request routing — map URL patterns and HTTP methods to handler functions.
//!
//! Two pattern styles are supported:
//!
//! | Pattern     | Example match                     |
//! |-------------|-----------------------------------|
//! | `/posts`    | `/posts`, `/posts/`, `/posts//`   |
//! | `/posts/*`  | `/posts/2024/feed.xml`            |
//!
//! Patterns and incoming paths are normalized before comparison: repeated
//! slashes collapse and a trailing slash is dropped. A wildcard only matches
//! at a segment boundary, so `/posts/*` never matches `/postscript`.
//!
//! Routes are matched in registration order; the first route whose method and
//! pattern both match wins. A path that matches some route under a different
//! method gets `405 Method Not Allowed`, anything else `404 Not Found`.

use std::pin::Pin;
use std::sync::Arc;

use crate::context::Context;
use crate::{Method, Response, StatusCode};

/// Type-erased async handler.
pub type Handler =
    Arc<dyn Fn(Context) -> Pin<Box<dyn Future<Output = Response> + Send>> + Send + Sync + 'static>;

/// Conversion trait for async handler functions.
///
/// Any `Fn(Context) -> impl Future<Output = Response> + Send` that is also
/// `Send + Sync + 'static` implements this automatically.
pub trait IntoHandler: Send + Sync + 'static {
    fn call(&self, ctx: Context) -> Pin<Box<dyn Future<Output = Response> + Send>>;
}

impl<T, F> IntoHandler for T
where
    T: Fn(Context) -> F + Send + Sync + 'static,
    F: Future<Output = Response> + Send + 'static,
{
    fn call(&self, ctx: Context) -> Pin<Box<dyn Future<Output = Response> + Send>> {
        Box::pin((self)(ctx))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Pattern {
    Exact(String),
    // Prefix without the trailing `/*`.
    Wildcard(String),
}

/// Collapses repeated slashes and drops a trailing one, so `/posts//` and
/// `//posts` both become `/posts`.
fn normalize(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    for segment in path.split('/').filter(|s| !s.is_empty()) {
        out.push('/');
        out.push_str(segment);
    }
    if out.is_empty() {
        out.push('/');
    }
    out
}

impl Pattern {
    /// A `/*` suffix makes a wildcard, anything else is an exact match.
    fn parse(pattern: &str) -> Self {
        match pattern.strip_suffix("/*") {
            Some(prefix) => Pattern::Wildcard(normalize(prefix)),
            None => Pattern::Exact(normalize(pattern)),
        }
    }

    fn matches(&self, path: &str) -> bool {
        let path = normalize(path);
        match self {
            Pattern::Exact(p) => *p == path,
            Pattern::Wildcard(prefix) if prefix == "/" => true,
            Pattern::Wildcard(prefix) => path
                .strip_prefix(prefix.as_str())
                .is_some_and(|rest| rest.is_empty() || rest.starts_with('/')),
        }
    }
}

struct Route {
    method: Method,
    pattern: Pattern,
    handler: Handler,
}

/// HTTP request router.
///
/// # Examples
///
/// ```rust,no_run
/// use swr_proxy::{Response, StatusCode, context::Context, router::Router};
///
/// let mut router = Router::new();
/// router.get("/posts/", |_ctx| async { Response::new(StatusCode::OK) });
/// router.get("/posts/*", |ctx: Context| async move {
///     let path = ctx.request().path().to_owned();
///     Response::new(StatusCode::OK).body(path)
/// });
/// ```
#[derive(Default)]
pub struct Router {
    routes: Vec<Route>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a `GET` handler for `path`.
    pub fn get(&mut self, path: &str, handler: impl IntoHandler) {
        self.route(Method::Get, path, handler);
    }

    /// Registers a `DELETE` handler for `path`.
    pub fn delete(&mut self, path: &str, handler: impl IntoHandler) {
        self.route(Method::Delete, path, handler);
    }

    /// Registers a handler for an arbitrary method.
    pub fn route(&mut self, method: Method, path: &str, handler: impl IntoHandler) {
        let handler: Handler = Arc::new(move |ctx| handler.call(ctx));
        self.routes.push(Route {
            method,
            pattern: Pattern::parse(path),
            handler,
        });
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Runs the first route matching the request in `ctx`.
    pub async fn dispatch(&self, ctx: Context) -> Response {
        let mut allowed: Vec<&str> = Vec::new();

        for route in &self.routes {
            if !route.pattern.matches(ctx.request().path()) {
                continue;
            }
            if &route.method == ctx.request().method() {
                return (route.handler)(ctx).await;
            }
            if !allowed.contains(&route.method.as_str()) {
                allowed.push(route.method.as_str());
            }
        }

        if allowed.is_empty() {
            Response::new(StatusCode::NOT_FOUND).body("Not Found")
        } else {
            Response::new(StatusCode::METHOD_NOT_ALLOWED)
                .header("Allow", allowed.join(", "))
                .body("Method Not Allowed")
        }
    }
}
