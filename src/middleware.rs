//! Middleware units and their composition.
//!
//! A middleware reads the [`Context`] and either contributes more data to it
//! or fails with an [`ApiError`]. Endpoints run their middleware strictly in
//! declaration order: each unit is awaited before the next starts and sees
//! everything its predecessors contributed. Outputs are shallow-merged, so a
//! key written twice keeps the later value.
//!
//! ```text
//! ctx ─▶ auth ─▶ {userId}            ─┐
//!        geo  ─▶ {region}             ├─▶ handler(ctx with userId, region)
//!        ...                          ─┘
//! ```
//!
//! The quickest way to write one is [`from_fn`]:
//!
//! ```rust
//! use mesh::{ApiError, middleware};
//! use serde_json::json;
//!
//! let auth = middleware::from_fn(|ctx| {
//!     let token = ctx.header("authorization").map(str::to_owned);
//!     async move {
//!         let token = token.ok_or_else(|| ApiError::unauthorized("missing token"))?;
//!         Ok::<_, ApiError>(json!({ "userId": token.trim_start_matches("Bearer ") }))
//!     }
//! })
//! .named("auth");
//! ```
//!
//! The closure gets `&Context` and returns a `'static` future, so copy what it
//! needs out of the context before the `async` block.

use std::borrow::Cow;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::api_error::ApiError;
use crate::context::Context;
use crate::error::Error;
use crate::schema::Schema;

/// Data a middleware contributes to the context.
pub type Extension = Map<String, Value>;

/// A middleware shared between every endpoint and router that uses it.
pub type SharedMiddleware = Arc<dyn Middleware>;

/// One step of an endpoint's middleware chain.
///
/// Implement it directly for middleware that carries configuration, or use
/// [`from_fn`] / [`with_options`] for closures.
#[async_trait]
pub trait Middleware: Send + Sync + 'static {
    /// Label used in logs and in [`Context::contributed_by`].
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    async fn call(&self, ctx: &Context) -> Result<Extension, ApiError>;
}

/// Wraps a middleware for [`Router::with_all`](crate::Router::with_all) and
/// [`Endpoint::with_all`](crate::Endpoint::with_all).
pub fn shared(middleware: impl Middleware) -> SharedMiddleware {
    Arc::new(middleware)
}

/// Turns a serializable output into an [`Extension`].
///
/// Objects merge field by field, `null` contributes nothing, anything else is
/// a bug in the middleware.
pub fn into_extension(output: impl Serialize) -> Result<Extension, ApiError> {
    match serde_json::to_value(output)? {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Map::new()),
        other => Err(ApiError::internal(format!(
            "middleware output must be an object, got `{other}`"
        ))),
    }
}

// ── Closure middleware ────────────────────────────────────────────────────────

/// Middleware built from a closure. See [`from_fn`].
pub struct FnMiddleware<F> {
    f: F,
    name: Cow<'static, str>,
}

/// Builds a middleware from `Fn(&Context) -> impl Future<Output = Result<T, ApiError>>`
/// where `T` serializes to an object (or `null`).
pub fn from_fn<F, Fut, T>(f: F) -> FnMiddleware<F>
where
    F: Fn(&Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, ApiError>> + Send + 'static,
    T: Serialize + Send,
{
    FnMiddleware { f, name: Cow::Borrowed("fn") }
}

impl<F> FnMiddleware<F> {
    pub fn named(mut self, name: impl Into<Cow<'static, str>>) -> Self {
        self.name = name.into();
        self
    }
}

#[async_trait]
impl<F, Fut, T> Middleware for FnMiddleware<F>
where
    F: Fn(&Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, ApiError>> + Send + 'static,
    T: Serialize + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn call(&self, ctx: &Context) -> Result<Extension, ApiError> {
        let output = (self.f)(ctx).await?;
        into_extension(output)
    }
}

// ── Configured middleware ─────────────────────────────────────────────────────

/// Middleware built from a closure plus an options value. See [`with_options`].
pub struct OptionsMiddleware<F> {
    f: F,
    options: Value,
    name: Cow<'static, str>,
}

/// Builds a middleware whose closure also receives `options`.
///
/// When `schema` is given the options are validated once, here, so a
/// misconfigured unit never reaches a request.
///
/// ```rust
/// use mesh::{ApiError, Schema, middleware};
/// use serde_json::json;
///
/// let schema = Schema::new(json!({
///     "type": "object",
///     "properties": { "region": { "type": "string" } },
///     "required": ["region"]
/// })).unwrap();
///
/// let geo = middleware::with_options(json!({"region": "eu"}), Some(&schema), |_ctx, options| {
///     let region = options["region"].clone();
///     async move { Ok::<_, ApiError>(json!({ "region": region })) }
/// });
/// assert!(geo.is_ok());
/// ```
pub fn with_options<F, Fut, T>(
    options: Value,
    schema: Option<&Schema>,
    f: F,
) -> Result<OptionsMiddleware<F>, Error>
where
    F: Fn(&Context, &Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, ApiError>> + Send + 'static,
    T: Serialize + Send,
{
    if let Some(schema) = schema {
        schema
            .validate(&options)
            .map_err(|failure| Error::InvalidOptions(failure.to_string()))?;
    }
    Ok(OptionsMiddleware { f, options, name: Cow::Borrowed("options") })
}

impl<F> OptionsMiddleware<F> {
    pub fn named(mut self, name: impl Into<Cow<'static, str>>) -> Self {
        self.name = name.into();
        self
    }

    pub fn options(&self) -> &Value {
        &self.options
    }
}

#[async_trait]
impl<F, Fut, T> Middleware for OptionsMiddleware<F>
where
    F: Fn(&Context, &Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, ApiError>> + Send + 'static,
    T: Serialize + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn call(&self, ctx: &Context) -> Result<Extension, ApiError> {
        let output = (self.f)(ctx, &self.options).await?;
        into_extension(output)
    }
}

// ── Composition ───────────────────────────────────────────────────────────────

/// Runs `chain` in order against `ctx`, merging each output before the next
/// unit starts. Stops at the first failure.
pub async fn run_chain(chain: &[SharedMiddleware], ctx: &mut Context) -> Result<(), ApiError> {
    for (index, middleware) in chain.iter().enumerate() {
        match middleware.call(ctx).await {
            Ok(extension) => {
                debug!(
                    middleware = middleware.name(),
                    position = index + 1,
                    keys = extension.len(),
                    "middleware contributed"
                );
                ctx.merge(middleware.name(), extension);
            }
            Err(e) => {
                warn!(
                    middleware = middleware.name(),
                    position = index + 1,
                    code = %e.code(),
                    skipped = chain.len() - index - 1,
                    "middleware failed: {}",
                    e.message()
                );
                return Err(e);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use http::Method;
    use serde_json::json;

    use crate::contract::Contract;
    use crate::context::RequestInput;
    use crate::error_code::ErrorCode;
    use crate::services::Container;

    fn context() -> Context {
        let mut input = RequestInput::new(Method::GET, "/");
        input.headers.insert("authorization".into(), json!("Bearer abc"));
        Context::new(Arc::new(Contract::get("/")), input, Arc::new(Container::new()))
    }

    fn yields(value: Value) -> SharedMiddleware {
        shared(from_fn(move |_ctx| {
            let value = value.clone();
            async move { Ok::<_, ApiError>(value) }
        }))
    }

    fn counting(calls: &Arc<AtomicUsize>) -> SharedMiddleware {
        let calls = Arc::clone(calls);
        shared(from_fn(move |_ctx| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, ApiError>(Value::Null) }
        }))
    }

    #[tokio::test]
    async fn later_outputs_override_earlier() {
        let chain = vec![
            yields(json!({"userId": "abc"})),
            yields(json!({"userId": "xyz", "region": "eu"})),
        ];
        let mut ctx = context();
        run_chain(&chain, &mut ctx).await.unwrap();
        assert_eq!(Value::Object(ctx.data().clone()), json!({"userId": "xyz", "region": "eu"}));
    }

    #[tokio::test]
    async fn each_unit_sees_its_predecessors() {
        let chain = vec![
            yields(json!({"userId": "abc"})),
            shared(from_fn(|ctx: &Context| {
                let seen = ctx.get("userId").cloned();
                async move {
                    let seen = seen?;
                    Ok::<_, ApiError>(json!({ "seen": seen }))
                }
            })),
        ];
        let mut ctx = context();
        run_chain(&chain, &mut ctx).await.unwrap();
        assert_eq!(ctx.get("seen").unwrap(), "abc");
    }

    #[tokio::test]
    async fn failure_stops_the_chain() {
        let calls = Arc::new(AtomicUsize::new(0));
        let chain = vec![
            counting(&calls),
            shared(from_fn(|_ctx| async { Err::<Value, _>(ApiError::forbidden("nope")) })),
            counting(&calls),
        ];
        let mut ctx = context();
        let err = run_chain(&chain, &mut ctx).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::Forbidden);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn non_object_output_is_internal() {
        let chain = vec![yields(json!([1, 2]))];
        let err = run_chain(&chain, &mut context()).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::InternalServerError);
    }

    #[tokio::test]
    async fn typed_outputs_merge_by_field() {
        #[derive(Serialize)]
        struct Principal {
            user: String,
        }

        let auth = from_fn(|ctx: &Context| {
            let header = ctx.header("authorization").unwrap_or_default().to_owned();
            async move {
                Ok::<_, ApiError>(Principal { user: header.trim_start_matches("Bearer ").to_owned() })
            }
        })
        .named("auth");
        assert_eq!(auth.name(), "auth");

        let mut ctx = context();
        run_chain(&[shared(auth)], &mut ctx).await.unwrap();
        assert_eq!(ctx.get("user").unwrap(), "abc");
        assert_eq!(ctx.contributed_by("user"), Some("auth"));
    }

    #[tokio::test]
    async fn options_are_validated_up_front() {
        let schema = Schema::new(json!({
            "type": "object",
            "properties": { "limit": { "type": "integer" } },
            "required": ["limit"]
        }))
        .unwrap();

        let rejected = with_options(json!({"limit": "ten"}), Some(&schema), |_ctx, _options| async {
            Ok::<_, ApiError>(Value::Null)
        });
        assert!(matches!(rejected, Err(Error::InvalidOptions(_))));

        let limiter = with_options(json!({"limit": 10}), Some(&schema), |_ctx, options| {
            let limit = options["limit"].clone();
            async move { Ok::<_, ApiError>(json!({ "limit": limit })) }
        })
        .unwrap()
        .named("limiter");

        let mut ctx = context();
        run_chain(&[shared(limiter)], &mut ctx).await.unwrap();
        assert_eq!(ctx.get("limit").unwrap(), 10);
    }
}
