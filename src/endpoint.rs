//! Endpoint construction.
//!
//! An [`Endpoint`] binds a [`Contract`], an ordered middleware list, and a
//! handler. Composition is pure: nothing runs and nothing can fail until a
//! request arrives. [`Endpoint::build`] freezes the result into a
//! [`BuiltEndpoint`] that an [`App`](crate::App) mounts.
//!
//! ```rust
//! use mesh::{ApiError, Context, Contract, Endpoint, Router, middleware};
//! use serde_json::{Value, json};
//!
//! let auth = middleware::from_fn(|_ctx| async { Ok::<_, ApiError>(json!({"userId": "u1"})) });
//! let authenticated = Router::named("authenticated").with(auth);
//!
//! async fn me(ctx: Context) -> Result<Value, ApiError> {
//!     Ok(json!({ "id": ctx.get("userId")? }))
//! }
//!
//! let endpoint = Endpoint::new(Contract::get("/me"), me)
//!     .router(&authenticated)
//!     .build();
//! assert_eq!(endpoint.middlewares().len(), 1);
//! ```

use std::sync::Arc;

use crate::contract::Contract;
use crate::handler::{BoxedHandler, Handler, Resource, ResourceHandler};
use crate::middleware::{Middleware, SharedMiddleware};
use crate::router::Router;

/// An endpoint under construction.
pub struct Endpoint {
    contract: Contract,
    middlewares: Vec<SharedMiddleware>,
    handler: BoxedHandler,
}

impl Endpoint {
    pub fn new(contract: Contract, handler: impl Handler) -> Self {
        Self { contract, middlewares: Vec::new(), handler: handler.into_boxed_handler() }
    }

    /// An endpoint whose contract, leading middleware, and handler all come
    /// from `resource`.
    pub fn from_resource<R: Resource>(resource: R) -> Self {
        let contract = resource.contract();
        let middlewares = resource.middlewares();
        Self {
            contract,
            middlewares,
            handler: Arc::new(ResourceHandler(Arc::new(resource))),
        }
    }

    /// Appends one middleware; the handler's context gains its output.
    pub fn with(self, middleware: impl Middleware) -> Self {
        self.with_shared(Arc::new(middleware))
    }

    pub fn with_shared(mut self, middleware: SharedMiddleware) -> Self {
        self.middlewares.push(middleware);
        self
    }

    /// Appends several middleware in the order given.
    pub fn with_all(mut self, middlewares: impl IntoIterator<Item = SharedMiddleware>) -> Self {
        self.middlewares.extend(middlewares);
        self
    }

    /// Appends every middleware of `router`, in the router's order. Same as
    /// calling [`with_shared`](Self::with_shared) once per router middleware.
    pub fn router(self, router: &Router) -> Self {
        self.with_all(router.middlewares().iter().cloned())
    }

    pub fn build(self) -> BuiltEndpoint {
        BuiltEndpoint {
            contract: Arc::new(self.contract),
            middlewares: self.middlewares.into(),
            handler: self.handler,
        }
    }
}

/// A finished endpoint: contract, middleware, handler. Immutable and cheap to
/// clone.
#[derive(Clone)]
pub struct BuiltEndpoint {
    contract: Arc<Contract>,
    middlewares: Arc<[SharedMiddleware]>,
    handler: BoxedHandler,
}

impl BuiltEndpoint {
    pub fn contract(&self) -> &Arc<Contract> { &self.contract }
    pub fn middlewares(&self) -> &[SharedMiddleware] { &self.middlewares }
    pub(crate) fn handler(&self) -> &BoxedHandler { &self.handler }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api_error::ApiError;
    use crate::context::Context;
    use crate::middleware::{from_fn, shared};
    use serde_json::Value;

    async fn noop(_ctx: Context) -> Result<(), ApiError> {
        Ok(())
    }

    fn unit(name: &'static str) -> SharedMiddleware {
        shared(from_fn(|_ctx| async { Ok::<_, ApiError>(Value::Null) }).named(name))
    }

    fn names(endpoint: &BuiltEndpoint) -> Vec<&str> {
        endpoint.middlewares().iter().map(|m| m.name()).collect()
    }

    #[test]
    fn router_equals_one_with_per_middleware() {
        let (a, b, c) = (unit("a"), unit("b"), unit("c"));
        let router = Router::new().with_all([b.clone(), c.clone()]);

        let via_router = Endpoint::new(Contract::get("/"), noop)
            .with_shared(a.clone())
            .router(&router)
            .build();
        let via_with = Endpoint::new(Contract::get("/"), noop)
            .with_shared(a)
            .with_shared(b)
            .with_shared(c)
            .build();

        assert_eq!(names(&via_router), names(&via_with));
        assert!(
            via_router
                .middlewares()
                .iter()
                .zip(via_with.middlewares())
                .all(|(x, y)| Arc::ptr_eq(x, y))
        );
    }

    #[test]
    fn list_order_is_preserved() {
        let endpoint = Endpoint::new(Contract::get("/"), noop)
            .with_all([unit("x"), unit("y")])
            .with(from_fn(|_ctx| async { Ok::<_, ApiError>(Value::Null) }).named("z"))
            .build();
        assert_eq!(names(&endpoint), ["x", "y", "z"]);
    }
}
