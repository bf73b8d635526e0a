//! Handler trait and type erasure.
//!
//! # How async handlers are stored
//!
//! An [`App`](crate::App) holds endpoints whose handlers all have different
//! concrete types, so each one is hidden behind a common trait object:
//!
//! ```text
//! async fn get_user(ctx: Context) -> Result<Json<User>, ApiError>   ← user writes this
//!        ↓ Endpoint::new(contract, get_user)
//! get_user.into_boxed_handler()                 ← Handler blanket impl
//!        ↓
//! Arc::new(FnHandler(get_user))                 ← stored as BoxedHandler
//!        ↓
//! handler.call(ctx)  at request time            ← one vtable dispatch
//!        ↓
//! Box::pin(async { get_user(ctx).await?.into_reply() })
//! ```
//!
//! Endpoints that are easier to write as a type (with their own fields and
//! contract) implement [`Resource`] instead.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;

use crate::api_error::ApiError;
use crate::context::Context;
use crate::contract::Contract;
use crate::middleware::SharedMiddleware;
use crate::response::{IntoReply, Reply};

// ── Internal types ────────────────────────────────────────────────────────────

/// A heap-allocated, type-erased handler future.
pub(crate) type BoxFuture = Pin<Box<dyn Future<Output = Result<Reply, ApiError>> + Send + 'static>>;

/// Internal dispatch interface.
///
/// `#[doc(hidden)] pub` rather than `pub(crate)` because it appears in the
/// return type of the public `Handler` trait's `into_boxed_handler` method.
#[doc(hidden)]
pub trait ErasedHandler {
    fn call(&self, ctx: Context) -> BoxFuture;
}

/// A type-erased handler shared across concurrent requests.
#[doc(hidden)]
pub type BoxedHandler = Arc<dyn ErasedHandler + Send + Sync + 'static>;

// ── Public Handler trait ──────────────────────────────────────────────────────

/// Implemented for every valid handler function.
///
/// You never implement this yourself. It is satisfied by any function or
/// closure with the shape:
///
/// ```text
/// async fn name(ctx: Context) -> Result<impl IntoReply, ApiError>
/// ```
pub trait Handler: private::Sealed + Send + Sync + 'static {
    #[doc(hidden)]
    fn into_boxed_handler(self) -> BoxedHandler;
}

mod private {
    pub trait Sealed {}
}

impl<F, Fut, R> private::Sealed for F
where
    F: Fn(Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, ApiError>> + Send + 'static,
    R: IntoReply + Send + 'static,
{
}

impl<F, Fut, R> Handler for F
where
    F: Fn(Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, ApiError>> + Send + 'static,
    R: IntoReply + Send + 'static,
{
    fn into_boxed_handler(self) -> BoxedHandler {
        Arc::new(FnHandler(self))
    }
}

/// Bridges a concrete handler function to [`ErasedHandler`].
struct FnHandler<F>(F);

impl<F, Fut, R> ErasedHandler for FnHandler<F>
where
    F: Fn(Context) -> Fut + Send + Sync,
    Fut: Future<Output = Result<R, ApiError>> + Send + 'static,
    R: IntoReply + Send + 'static,
{
    fn call(&self, ctx: Context) -> BoxFuture {
        let fut = (self.0)(ctx);
        Box::pin(async move { fut.await?.into_reply() })
    }
}

// ── Resources ─────────────────────────────────────────────────────────────────

/// An endpoint written as a type.
///
/// ```rust
/// use mesh::{ApiError, Context, Contract, Endpoint, Reply, Resource, async_trait};
/// use serde_json::json;
///
/// struct Health;
///
/// #[async_trait]
/// impl Resource for Health {
///     fn contract(&self) -> Contract {
///         Contract::get("/healthz")
///     }
///
///     async fn handle(&self, _ctx: Context) -> Result<Reply, ApiError> {
///         Ok(Reply::new(json!("ok")))
///     }
/// }
///
/// let endpoint = Endpoint::from_resource(Health).build();
/// assert_eq!(endpoint.contract().path(), "/healthz");
/// ```
#[async_trait]
pub trait Resource: Send + Sync + 'static {
    fn contract(&self) -> Contract;

    /// Middleware the resource always runs, before any added on its endpoint.
    fn middlewares(&self) -> Vec<SharedMiddleware> {
        Vec::new()
    }

    async fn handle(&self, ctx: Context) -> Result<Reply, ApiError>;
}

pub(crate) struct ResourceHandler<R>(pub(crate) Arc<R>);

impl<R: Resource> ErasedHandler for ResourceHandler<R> {
    fn call(&self, ctx: Context) -> BoxFuture {
        let resource = Arc::clone(&self.0);
        Box::pin(async move { resource.handle(ctx).await })
    }
}
