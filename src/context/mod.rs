//! Per-request context handed to route handlers and middleware.

use crate::Request;

/// The request as it travels through the middleware pipeline to a route.
#[derive(Debug)]
pub struct Context {
    request: Request,
}

impl Context {
    pub fn new(request: Request) -> Self {
        Self { request }
    }

    pub fn request(&self) -> &Request {
        &self.request
    }
}
