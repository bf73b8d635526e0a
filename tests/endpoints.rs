//! End-to-end behaviour of mounted endpoints, driven through `App::handle`.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use bytes::Bytes;
use http_body_util::BodyExt;
use mesh::middleware::{self, SharedMiddleware, run_chain, shared};
use mesh::services::Container;
use mesh::{
    ApiError, App, Context, Contract, Endpoint, ErrorCode, HttpResponse, Method, Reply,
    RequestInput, Router, Schema, StatusCode, decode, encode, err, json, text, xml,
};
use proptest::prelude::*;
use serde_json::{Map, Value, json};

// ── Helpers ───────────────────────────────────────────────────────────────────

fn yields(name: &'static str, value: Value) -> SharedMiddleware {
    shared(
        middleware::from_fn(move |_ctx| {
            let value = value.clone();
            async move { Ok::<_, ApiError>(value) }
        })
        .named(name),
    )
}

fn counting(calls: &Arc<AtomicUsize>) -> SharedMiddleware {
    let calls = Arc::clone(calls);
    shared(middleware::from_fn(move |_ctx| {
        calls.fetch_add(1, Ordering::SeqCst);
        async { Ok::<_, ApiError>(Value::Null) }
    }))
}

fn failing(code: ErrorCode) -> SharedMiddleware {
    shared(middleware::from_fn(move |_ctx| async move {
        Err::<Value, _>(ApiError::new(code, "rejected"))
    }))
}

async fn data(ctx: Context) -> Result<Value, ApiError> {
    Ok(Value::Object(ctx.data().clone()))
}

async fn body_json(response: HttpResponse) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn get(uri: &str) -> http::Request<Bytes> {
    http::Request::get(uri).body(Bytes::new()).unwrap()
}

fn mount(endpoint: Endpoint) -> App {
    App::new(Container::new()).mount(endpoint.build()).unwrap()
}

// ── Middleware merging ────────────────────────────────────────────────────────

#[tokio::test]
async fn handler_sees_merged_middleware_output() {
    let app = mount(
        Endpoint::new(Contract::get("/me"), data)
            .with_shared(yields("auth", json!({"userId": "abc"})))
            .with_shared(yields("geo", json!({"userId": "xyz", "region": "eu"}))),
    );

    let response = app.handle(get("/me")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!({"userId": "xyz", "region": "eu"}));
}

#[tokio::test]
async fn failing_middleware_skips_the_rest() {
    let later = Arc::new(AtomicUsize::new(0));
    let handled = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&handled);

    let contract = Contract::get("/admin").errors(err([ErrorCode::Forbidden]));
    let app = mount(
        Endpoint::new(contract, move |_ctx: Context| {
            seen.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, ApiError>(()) }
        })
        .with_shared(yields("auth", json!({"userId": "abc"})))
        .with_shared(failing(ErrorCode::Forbidden))
        .with_shared(counting(&later)),
    );

    let response = app.handle(get("/admin")).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_json(response).await["code"], "FORBIDDEN");
    assert_eq!(later.load(Ordering::SeqCst), 0);
    assert_eq!(handled.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn router_behaves_like_individual_middleware() {
    let auth = yields("auth", json!({"userId": "abc"}));
    let geo = yields("geo", json!({"region": "eu"}));
    let router = Router::named("authenticated").with_all([auth.clone(), geo.clone()]);

    let via_router = mount(Endpoint::new(Contract::get("/a"), data).router(&router));
    let via_with = mount(Endpoint::new(Contract::get("/a"), data).with_shared(auth).with_shared(geo));

    let a = body_json(via_router.handle(get("/a")).await).await;
    let b = body_json(via_with.handle(get("/a")).await).await;
    assert_eq!(a, b);
}

proptest! {
    #[test]
    fn last_writer_wins_for_every_key(
        outputs in prop::collection::vec(
            prop::collection::btree_map("[a-d]", any::<u8>(), 0..4),
            0..6,
        )
    ) {
        let chain: Vec<SharedMiddleware> = outputs
            .iter()
            .map(|output| {
                let value = serde_json::to_value(output).unwrap();
                yields("unit", value)
            })
            .collect();

        let mut expected = Map::new();
        for output in &outputs {
            for (key, value) in output {
                expected.insert(key.clone(), json!(value));
            }
        }

        let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let merged = runtime.block_on(async {
            let input = RequestInput::new(Method::GET, "/");
            let mut ctx = Context::new(Arc::new(Contract::get("/")), input, Arc::new(Container::new()));
            run_chain(&chain, &mut ctx).await.unwrap();
            ctx.data().clone()
        });
        prop_assert_eq!(merged, expected);
    }
}

// ── Errors and validation ─────────────────────────────────────────────────────

#[tokio::test]
async fn declared_not_found_is_404_with_code() {
    let contract = Contract::get("/users/{id}").errors(err([ErrorCode::NotFound]));
    let app = mount(Endpoint::new(contract, |ctx: Context| async move {
        Err::<Value, _>(ctx.error(ErrorCode::NotFound, "no such user"))
    }));

    let response = app.handle(get("/users/7")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_json(response).await;
    assert_eq!(body["code"], "NOT_FOUND");
    assert_eq!(body["message"], "no such user");
}

#[tokio::test]
async fn invalid_body_never_reaches_middleware() {
    let calls = Arc::new(AtomicUsize::new(0));
    let schema = Schema::new(json!({
        "type": "object",
        "properties": { "name": { "type": "string" } },
        "required": ["name"]
    }))
    .unwrap();
    let app = mount(Endpoint::new(Contract::post("/users").body(schema), data).with_shared(counting(&calls)));

    let req = http::Request::post("/users")
        .header("content-type", "application/json")
        .body(Bytes::from_static(br#"{"name": 3}"#))
        .unwrap();
    let response = app.handle(req).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["details"][0]["location"], "body");
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn malformed_json_is_bad_request() {
    let app = mount(Endpoint::new(Contract::post("/users"), data));
    let req = http::Request::post("/users")
        .header("content-type", "application/json")
        .body(Bytes::from_static(b"{"))
        .unwrap();
    assert_eq!(app.handle(req).await.status(), StatusCode::BAD_REQUEST);
}

// ── Content types ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn accept_header_selects_the_declared_content_type() {
    let string = Schema::new(json!({ "type": "string" })).unwrap();
    let contract = Contract::get("/greeting")
        .response(StatusCode::OK, text(string.clone()).or(xml(string.clone())).or(json(string)));
    let app = mount(Endpoint::new(contract, |_ctx: Context| async {
        Ok::<_, ApiError>("<hello/>")
    }));

    let req = http::Request::get("/greeting")
        .header("accept", "application/xml")
        .body(Bytes::new())
        .unwrap();
    let response = app.handle(req).await;
    assert_eq!(response.headers()["content-type"], "application/xml");
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&bytes[..], b"<hello/>");

    let response = app.handle(get("/greeting")).await;
    assert_eq!(response.headers()["content-type"], "text/plain");
}

#[test]
fn every_response_helper_survives_the_wire() {
    let user = Schema::new(json!({
        "type": "object",
        "properties": { "id": { "type": "string" }, "tags": { "type": "array" } },
        "required": ["id"]
    }))
    .unwrap();
    let document = Schema::new(json!({ "type": "string", "pattern": "^<user" })).unwrap();

    let cases = [
        (json(user), json!({"id": "42", "tags": ["a", "b"]})),
        (xml(document.clone()), json!("<user id=\"42\"/>")),
        (text(document), json!("<user> is plain text here")),
    ];
    for (spec, body) in cases {
        let (media_type, schema) = spec.negotiate(None).unwrap();
        schema.validate(&body).unwrap();

        let bytes = encode(&body, media_type).unwrap();
        let decoded = decode(&bytes, media_type).unwrap();
        assert_eq!(decoded, body, "{media_type}");
        schema.validate(&decoded).unwrap();
    }
}

#[tokio::test]
async fn textual_replies_must_be_strings() {
    let integer = Schema::new(json!({ "type": "integer" })).unwrap();
    let app = mount(Endpoint::new(
        Contract::get("/count").response(StatusCode::OK, text(integer.clone())),
        |_ctx: Context| async { Ok::<_, ApiError>(json!(5)) },
    ))
    .mount(
        Endpoint::new(
            Contract::get("/count.xml").response(StatusCode::OK, xml(integer)),
            |_ctx: Context| async { Ok::<_, ApiError>(json!(5)) },
        )
        .build(),
    )
    .unwrap();

    for uri in ["/count", "/count.xml"] {
        let response = app.handle(get(uri)).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR, "{uri}");
    }
}

#[tokio::test]
async fn reply_content_type_parameters_are_ignored_when_matching() {
    let schema = Schema::new(json!({ "type": "object" })).unwrap();
    let app = mount(Endpoint::new(
        Contract::get("/user").response(StatusCode::OK, json(schema)),
        |_ctx: Context| async {
            Ok::<_, ApiError>(Reply::new(json!({"id": "1"})).content_type("application/json; charset=utf-8"))
        },
    ));

    let response = app.handle(get("/user")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "application/json; charset=utf-8");
}

#[tokio::test]
async fn accept_ranges_and_zero_quality_are_honoured() {
    let string = Schema::new(json!({ "type": "string" })).unwrap();
    let contract = Contract::get("/greeting")
        .response(StatusCode::OK, json(string.clone()).or(xml(string.clone())).or(text(string)));
    let app = mount(Endpoint::new(contract, |_ctx: Context| async { Ok::<_, ApiError>("hi") }));

    let with_accept = |accept: &'static str| {
        http::Request::get("/greeting").header("accept", accept).body(Bytes::new()).unwrap()
    };
    let response = app.handle(with_accept("text/*")).await;
    assert_eq!(response.headers()["content-type"], "text/plain");

    let response = app.handle(with_accept("application/json;q=0, application/*;q=0.8")).await;
    assert_eq!(response.headers()["content-type"], "application/xml");
}

// ── Request parsing ───────────────────────────────────────────────────────────

#[tokio::test]
async fn path_params_are_percent_decoded() {
    let app = mount(Endpoint::new(Contract::get("/users/{id}"), |ctx: Context| async move {
        Ok::<_, ApiError>(json!({ "id": ctx.param("id") }))
    }));

    let body = body_json(app.handle(get("/users/a%20b%2Fc")).await).await;
    assert_eq!(body["id"], "a b/c");
}

#[tokio::test]
async fn multipart_files_and_fields_reach_the_handler() {
    let fields = Schema::new(json!({
        "type": "object",
        "properties": { "title": { "type": "string" } },
        "required": ["title"]
    }))
    .unwrap();
    let app = mount(Endpoint::new(Contract::post("/uploads").body(fields), |ctx: Context| async move {
        let files: Vec<Value> = ctx
            .files()
            .iter()
            .map(|file| {
                json!({
                    "field": file.field,
                    "filename": file.filename,
                    "contentType": file.content_type,
                    "size": file.bytes.len(),
                })
            })
            .collect();
        let first = ctx.file("avatar").map(|file| file.bytes.to_vec());
        Ok::<_, ApiError>(json!({ "body": ctx.body(), "files": files, "avatar": first }))
    }));

    let mut payload = Vec::new();
    payload.extend_from_slice(
        b"--XBOUNDARY\r\n\
          Content-Disposition: form-data; name=\"title\"\r\n\r\n\
          holiday\r\n\
          --XBOUNDARY\r\n\
          Content-Disposition: form-data; name=\"avatar\"; filename=\"me.png\"\r\n\
          Content-Type: image/png\r\n\r\n",
    );
    payload.extend_from_slice(&[0x89, 0xff, 0x00, 0x01]);
    payload.extend_from_slice(b"\r\n--XBOUNDARY--\r\n");

    let req = http::Request::post("/uploads")
        .header("content-type", "multipart/form-data; boundary=XBOUNDARY")
        .body(Bytes::from(payload))
        .unwrap();
    let response = app.handle(req).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["body"], json!({"title": "holiday"}));
    assert_eq!(
        body["files"],
        json!([{ "field": "avatar", "filename": "me.png", "contentType": "image/png", "size": 4 }])
    );
    assert_eq!(body["avatar"], json!([0x89, 0xff, 0x00, 0x01]));
}

#[tokio::test]
async fn multipart_fields_are_validated_like_any_body() {
    let fields = Schema::new(json!({ "type": "object", "required": ["title"] })).unwrap();
    let app = mount(Endpoint::new(Contract::post("/uploads").body(fields), data));

    let req = http::Request::post("/uploads")
        .header("content-type", "multipart/form-data; boundary=XBOUNDARY")
        .body(Bytes::from_static(
            b"--XBOUNDARY\r\nContent-Disposition: form-data; name=\"other\"\r\n\r\nx\r\n--XBOUNDARY--\r\n",
        ))
        .unwrap();
    let response = app.handle(req).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["details"][0]["location"], "body");
}

#[tokio::test]
async fn explicit_status_and_headers_are_sent() {
    let schema = Schema::new(json!({"type": "object"})).unwrap();
    let contract = Contract::post("/users").response(StatusCode::CREATED, json(schema));
    let app = mount(Endpoint::new(contract, |_ctx: Context| async {
        Ok::<_, ApiError>(
            Reply::new(json!({"id": "99"}))
                .status(StatusCode::CREATED)
                .header("location", "/users/99"),
        )
    }));

    let response = app.handle(http::Request::post("/users").body(Bytes::new()).unwrap()).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(response.headers()["location"], "/users/99");
}
