//! Reusable middleware bundles.
//!
//! A [`Router`] is not a path matcher: it is an ordered, named bag of
//! middleware that many endpoints attach at once with
//! [`Endpoint::router`](crate::Endpoint::router). Path matching happens in
//! [`App`](crate::App).
//!
//! ```rust,no_run
//! # use mesh::{ApiError, Router, middleware};
//! # use serde_json::json;
//! # let auth = middleware::from_fn(|_ctx| async { Ok::<_, ApiError>(json!({"userId": "u1"})) });
//! # let audit = middleware::from_fn(|_ctx| async { Ok::<_, ApiError>(json!({})) });
//! let authenticated = Router::named("authenticated").with(auth).with(audit);
//! ```

use std::sync::Arc;

use crate::middleware::{Middleware, SharedMiddleware};

#[derive(Clone, Default)]
pub struct Router {
    name: Option<String>,
    middlewares: Vec<SharedMiddleware>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self { name: Some(name.into()), middlewares: Vec::new() }
    }

    /// Appends one middleware. Returns `self` for chaining.
    pub fn with(self, middleware: impl Middleware) -> Self {
        self.with_shared(Arc::new(middleware))
    }

    pub fn with_shared(mut self, middleware: SharedMiddleware) -> Self {
        self.middlewares.push(middleware);
        self
    }

    /// Appends several middleware, keeping their order.
    pub fn with_all(mut self, middlewares: impl IntoIterator<Item = SharedMiddleware>) -> Self {
        self.middlewares.extend(middlewares);
        self
    }

    /// Appends every middleware of `other` after this router's own.
    pub fn merge(self, other: &Router) -> Self {
        self.with_all(other.middlewares.iter().cloned())
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn middlewares(&self) -> &[SharedMiddleware] {
        &self.middlewares
    }

    pub fn len(&self) -> usize {
        self.middlewares.len()
    }

    pub fn is_empty(&self) -> bool {
        self.middlewares.is_empty()
    }
}
