//! # mesh
//!
//! Contract-first HTTP endpoints for Rust services.
//!
//! ## The idea
//!
//! Every endpoint says up front what it accepts and what it may answer. That
//! statement, the [`Contract`], is checked on every request: input that does
//! not match is rejected before any of your code runs, and a reply that does
//! not match is never sent.
//!
//! Between the two sits a chain of [`Middleware`]. Each one reads the
//! request [`Context`] and contributes a little more to it (the caller's id,
//! their region, a tenant) or stops the request with an [`ApiError`]. The
//! handler sees everything the chain produced, merged in order.
//!
//! What mesh leaves to others:
//!
//! - **Transport**: hyper speaks HTTP/1.1 and HTTP/2
//! - **Validation**: JSON Schema via `jsonschema`, schemas via `schemars`
//! - **TLS, rate limits, timeouts**: the proxy in front of you
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use mesh::{
//!     ApiError, App, Context, Contract, Endpoint, ErrorCode, Router, Schema, Server,
//!     StatusCode, err, json, middleware, services,
//! };
//! use serde_json::{Value, json};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), mesh::Error> {
//!     let settings = mesh::Settings::load(None)?;
//!     mesh::telemetry::init(&settings.logger);
//!
//!     let user = Schema::new(json!({
//!         "type": "object",
//!         "properties": { "id": { "type": "string" }, "owner": { "type": "string" } },
//!         "required": ["id", "owner"]
//!     }))?;
//!
//!     let contract = Contract::get("/users/{id}")
//!         .response(StatusCode::OK, json(user))
//!         .errors(err([ErrorCode::NotFound, ErrorCode::Unauthorized]));
//!
//!     let auth = middleware::from_fn(|ctx| {
//!         let token = ctx.header("authorization").map(str::to_owned);
//!         async move {
//!             let token = token.ok_or_else(|| ApiError::unauthorized("missing token"))?;
//!             Ok::<_, ApiError>(json!({ "userId": token }))
//!         }
//!     });
//!     let authenticated = Router::named("authenticated").with(auth);
//!
//!     let app = App::new(services::initialize(&settings))
//!         .mount(Endpoint::new(contract, get_user).router(&authenticated).build())?;
//!
//!     Server::from_settings(&settings.server)?.serve(app).await
//! }
//!
//! async fn get_user(ctx: Context) -> Result<Value, ApiError> {
//!     let id = ctx.param("id").ok_or_else(|| ctx.error(ErrorCode::NotFound, "no id"))?;
//!     Ok(json!({ "id": id, "owner": ctx.get("userId")? }))
//! }
//! ```

mod api_error;
mod app;
mod context;
mod contract;
mod endpoint;
mod error;
mod error_code;
mod handler;
mod response;
mod router;
mod schema;
mod security;
mod server;

pub mod config;
pub mod middleware;
pub mod services;
pub mod telemetry;

pub use api_error::ApiError;
pub use app::App;
pub use config::Settings;
pub use context::{Context, RequestInput, UploadedFile};
pub use contract::{
    APPLICATION_JSON, APPLICATION_XML, Contract, InputSchemas, ResponseSpec, TEXT_PLAIN,
    UndeclaredStatus, json, response, text, xml,
};
pub use endpoint::{BuiltEndpoint, Endpoint};
pub use error::Error;
pub use error_code::{ErrorCode, ErrorCodes, UnknownErrorCode, err};
pub use handler::{Handler, Resource};
pub use middleware::{Extension, Middleware, SharedMiddleware};
pub use response::{ContentType, HttpResponse, IntoReply, Json, Reply, decode, encode};
pub use router::Router;
pub use schema::{Schema, ValidationFailure};
pub use security::{ApiKeyLocation, SecurityScheme, api_key_auth, basic_auth, bearer_auth};
pub use server::Server;

pub use async_trait::async_trait;
pub use http::{Method, StatusCode};
