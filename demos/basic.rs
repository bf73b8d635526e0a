//! Minimal mesh example: a small user API behind bearer authentication.
//!
//! Run with:
//!   RUST_LOG=debug cargo run --example basic
//!
//! Try:
//!   curl -H 'authorization: Bearer alice' http://localhost:3000/users/42
//!   curl -H 'authorization: Bearer alice' http://localhost:3000/users/7
//!   curl -H 'authorization: Bearer alice' -H 'accept: text/plain' http://localhost:3000/users/42
//!   curl -X POST http://localhost:3000/users \
//!        -H 'authorization: Bearer alice' \
//!        -H 'content-type: application/json' \
//!        -d '{"name":"bob"}'
//!   curl http://localhost:3000/users/42          # 401
//!   curl http://localhost:3000/openapi.json

use std::sync::Arc;

use mesh::telemetry::Logger;
use mesh::{
    ApiError, App, Context, Contract, Endpoint, ErrorCode, Reply, Resource, Router, Schema,
    Server, Settings, StatusCode, async_trait, bearer_auth, err, json, middleware, text,
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

#[derive(Serialize, Deserialize, schemars::JsonSchema)]
struct User {
    id: String,
    name: String,
}

#[derive(Deserialize, schemars::JsonSchema)]
struct NewUser {
    name: String,
}

#[tokio::main]
async fn main() -> Result<(), mesh::Error> {
    let settings = Settings::load(None)?;
    mesh::telemetry::init(&settings.logger);

    let auth = middleware::from_fn(|ctx| {
        let header = ctx.header("authorization").map(str::to_owned);
        async move {
            let token = header
                .as_deref()
                .and_then(|h| h.strip_prefix("Bearer "))
                .ok_or_else(|| ApiError::unauthorized("missing bearer token"))?;
            Ok::<_, ApiError>(json!({ "userId": token }))
        }
    })
    .named("auth");

    let region = middleware::with_options(
        json!({ "region": "eu-west" }),
        Some(&Schema::new(json!({
            "type": "object",
            "properties": { "region": { "type": "string" } },
            "required": ["region"]
        }))?),
        |_ctx, options| {
            let region = options["region"].clone();
            async move { Ok::<_, ApiError>(json!({ "region": region })) }
        },
    )?
    .named("region");

    let authenticated = Router::named("authenticated").with(auth).with(region);

    let get_user = Contract::get("/users/{id}")
        .summary("Fetch one user")
        .response(
            StatusCode::OK,
            json(Schema::of::<User>()?).or(text(Schema::new(json!({ "type": "string" }))?)),
        )
        .errors(err([ErrorCode::NotFound, ErrorCode::Unauthorized]))
        .security("bearer", bearer_auth());

    let services = mesh::services::initialize(&settings)
        .add("users", || vec![("42".to_owned(), "alice".to_owned())]);

    let app = App::new(services)
        .mount(Endpoint::new(get_user, fetch_user).router(&authenticated).build())?
        .mount(Endpoint::from_resource(CreateUser::new()?).router(&authenticated).build())?;

    let doc = Arc::new(app.describe(&settings.server.name, env!("CARGO_PKG_VERSION")));
    let app = app.mount(Endpoint::new(Contract::get("/openapi.json"), move |_ctx: Context| {
        let doc = Arc::clone(&doc);
        async move { Ok::<_, ApiError>((*doc).clone()) }
    })
    .build())?;

    Server::from_settings(&settings.server)?.serve(app).await
}

// GET /users/{id}
async fn fetch_user(ctx: Context) -> Result<Reply, ApiError> {
    let id = ctx.param("id").unwrap_or_default().to_owned();
    let users = ctx.service::<Vec<(String, String)>>("users")?;
    let (_, name) = users
        .iter()
        .find(|(known, _)| *known == id)
        .ok_or_else(|| ctx.error(ErrorCode::NotFound, format!("no user {id}")))?;

    ctx.service::<Logger>("logger")?
        .info(&format!("user {id} read by {}", ctx.get("userId")?));

    let wants_text = ctx.header("accept").is_some_and(|a| a.starts_with("text/plain"));
    if wants_text {
        return Ok(Reply::new(Value::String(name.clone())).content_type("text/plain"));
    }
    Ok(Reply::new(serde_json::to_value(User { id, name: name.clone() })?))
}

// POST /users
struct CreateUser {
    body: Schema,
    user: Schema,
}

impl CreateUser {
    fn new() -> Result<Self, mesh::Error> {
        Ok(Self { body: Schema::of::<NewUser>()?, user: Schema::of::<User>()? })
    }
}

#[async_trait]
impl Resource for CreateUser {
    fn contract(&self) -> Contract {
        Contract::post("/users")
            .summary("Create a user")
            .body(self.body.clone())
            .response(StatusCode::CREATED, json(self.user.clone()))
            .errors(err([ErrorCode::BadRequest, ErrorCode::Unauthorized]))
            .security("bearer", bearer_auth())
    }

    async fn handle(&self, ctx: Context) -> Result<Reply, ApiError> {
        let input: NewUser = ctx.body_as()?;
        let user = User { id: "99".into(), name: input.name };
        Ok(Reply::new(serde_json::to_value(user)?)
            .status(StatusCode::CREATED)
            .header("location", "/users/99"))
    }
}
