//! Middleware pipeline — composable before/after request handler logic.
//!
//! Each middleware wraps the next layer and the chain ends at the
//! [`Router`]. Middleware can inspect the request, short-circuit with its
//! own response, or decorate the response coming back up.
//!
//! ## Core types
//!
//! - [`Middleware`] — trait implemented by all middleware.
//! - [`Next`] — cursor into the remaining chain; call [`Next::run`] to advance.
//! - [`Pipeline`] — the ordered stack plus the router it ends in.
//! - [`LoggerMiddleware`] — one structured log line per request.

use std::{future::Future, pin::Pin, sync::Arc};

use tokio::time::Instant;

use crate::{Request, Response, context::Context, router::Router};

/// A type-erased, reference-counted middleware function.
pub type MiddlewareHandler = Arc<
    dyn Fn(Context, Next) -> Pin<Box<dyn Future<Output = Response> + Send>> + Send + Sync + 'static,
>;

/// Converts a [`Middleware`] implementation into a [`MiddlewareHandler`].
pub fn from_middleware<M>(middleware: Arc<M>) -> MiddlewareHandler
where
    M: Middleware + 'static,
{
    Arc::new(move |ctx: Context, next: Next| middleware.handle(ctx, next))
}

/// A cursor into the remaining middleware chain for a single request.
///
/// `Next` is consumed by [`run`](Self::run), so each middleware can forward
/// at most once. Once the middleware are exhausted the router handles the
/// request.
pub struct Next {
    middlewares: Arc<[MiddlewareHandler]>,
    router: Arc<Router>,
    index: usize,
}

impl Next {
    /// Invokes the next middleware, or the router once none are left.
    pub async fn run(mut self, ctx: Context) -> Response {
        match self.middlewares.get(self.index).cloned() {
            Some(handler) => {
                self.index += 1;
                handler(ctx, self).await
            }
            None => self.router.dispatch(ctx).await,
        }
    }
}

/// The core trait for all middleware.
///
/// Implementations are shared across Tokio tasks, so they must be
/// `Send + Sync` and return `Send` futures.
pub trait Middleware: Send + Sync {
    fn handle(&self, ctx: Context, next: Next) -> Pin<Box<dyn Future<Output = Response> + Send>>;
}

/// An ordered middleware stack in front of a router.
///
/// # Examples
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use swr_proxy::middleware::{LoggerMiddleware, Pipeline};
/// use swr_proxy::router::Router;
///
/// let pipeline = Pipeline::new(Router::new()).with(Arc::new(LoggerMiddleware));
/// ```
#[derive(Clone)]
pub struct Pipeline {
    middlewares: Arc<[MiddlewareHandler]>,
    router: Arc<Router>,
}

impl Pipeline {
    pub fn new(router: Router) -> Self {
        Self {
            middlewares: Arc::from(Vec::new()),
            router: Arc::new(router),
        }
    }

    /// Appends a middleware; the first one added runs outermost.
    #[must_use]
    pub fn with<M>(self, middleware: Arc<M>) -> Self
    where
        M: Middleware + 'static,
    {
        let mut stack: Vec<MiddlewareHandler> = self.middlewares.iter().cloned().collect();
        stack.push(from_middleware(middleware));
        Self {
            middlewares: stack.into(),
            router: self.router,
        }
    }

    /// Runs `request` through the stack and the router.
    pub async fn handle(&self, request: Request) -> Response {
        let next = Next {
            middlewares: Arc::clone(&self.middlewares),
            router: Arc::clone(&self.router),
            index: 0,
        };
        next.run(Context::new(request)).await
    }
}

/// Logs method, path, status, cache outcome, and latency of every request.
pub struct LoggerMiddleware;

impl Middleware for LoggerMiddleware {
    fn handle(&self, ctx: Context, next: Next) -> Pin<Box<dyn Future<Output = Response> + Send>> {
        Box::pin(async move {
            let start = Instant::now();
            let method = ctx.request().method().as_str().to_string();
            let path = ctx.request().path().to_string();

            let response = next.run(ctx).await;

            tracing::info!(
                %method,
                %path,
                status = response.status().as_u16(),
                cache = response.header_value("x-cache").unwrap_or("-"),
                elapsed = ?start.elapsed(),
                "request served"
            );

            response
        })
    }
}
