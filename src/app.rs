//! The application: route table plus request dispatch.
//!
//! [`App::handle`] is the whole request path, independent of the transport:
//!
//! 1. match method + path (one radix tree per method, via [`matchit`])
//! 2. parse params, query, headers, and body into a [`RequestInput`]
//! 3. validate each input location against the contract (`BAD_REQUEST`)
//! 4. run the middleware chain in order, merging outputs into the context
//! 5. call the handler
//! 6. check the reply against the declared success response and encode it
//!
//! Any failure along the way becomes a JSON error response. A code the
//! contract did not declare is reported as `INTERNAL_SERVER_ERROR`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use http::header::{ACCEPT, CONTENT_TYPE};
use http::request::Parts;
use http::{Method, StatusCode};
use matchit::Router as MatchitRouter;
use percent_encoding::percent_decode_str;
use serde_json::{Map, Value, json};
use tracing::{Instrument, error, info, info_span, warn};

use crate::api_error::ApiError;
use crate::context::{Context, RequestInput, UploadedFile};
use crate::contract::{APPLICATION_JSON, Contract};
use crate::endpoint::BuiltEndpoint;
use crate::error::Error;
use crate::middleware::run_chain;
use crate::response::{self, ContentType, HttpResponse, Reply};
use crate::schema::Schema;
use crate::services::Container;

const FORM_URLENCODED: &str = "application/x-www-form-urlencoded";
const MULTIPART_FORM_DATA: &str = "multipart/form-data";

pub struct App {
    routes: HashMap<Method, MatchitRouter<usize>>,
    endpoints: Vec<BuiltEndpoint>,
    services: Arc<Container>,
}

impl App {
    pub fn new(services: Container) -> Self {
        Self { routes: HashMap::new(), endpoints: Vec::new(), services: Arc::new(services) }
    }

    /// Registers `endpoint` under its contract's method and path.
    ///
    /// Fails if the path is malformed or already taken for that method.
    pub fn mount(mut self, endpoint: BuiltEndpoint) -> Result<Self, Error> {
        let method = endpoint.contract().method().clone();
        let path = endpoint.contract().path().to_owned();
        self.routes
            .entry(method.clone())
            .or_default()
            .insert(path.clone(), self.endpoints.len())
            .map_err(|e| Error::InvalidRoute { method: method.clone(), path: path.clone(), reason: e.to_string() })?;
        info!(%method, %path, middlewares = endpoint.middlewares().len(), "endpoint mounted");
        self.endpoints.push(endpoint);
        Ok(self)
    }

    pub fn endpoints(&self) -> &[BuiltEndpoint] {
        &self.endpoints
    }

    pub fn services(&self) -> &Arc<Container> {
        &self.services
    }

    fn lookup(&self, method: &Method, path: &str) -> Option<(&BuiltEndpoint, Map<String, Value>)> {
        let tree = self.routes.get(method)?;
        let matched = tree.at(path).ok()?;
        let endpoint = self.endpoints.get(*matched.value)?;
        let params = matched
            .params
            .iter()
            .map(|(k, v)| {
                let decoded = percent_decode_str(v).decode_utf8_lossy();
                (k.to_owned(), Value::String(decoded.into_owned()))
            })
            .collect();
        Some((endpoint, params))
    }

    /// Produces the response for one request. Never fails: every error is
    /// rendered as an error response.
    pub async fn handle(&self, req: http::Request<Bytes>) -> HttpResponse {
        let started = Instant::now();
        let span = info_span!("request", method = %req.method(), path = %req.uri().path());
        async move {
            let response = match self.dispatch(req).await {
                Ok(response) => response,
                Err(err) => response::error_response(&err),
            };
            info!(
                status = response.status().as_u16(),
                latency_us = started.elapsed().as_micros() as u64,
                "request completed"
            );
            response
        }
        .instrument(span)
        .await
    }

    async fn dispatch(&self, req: http::Request<Bytes>) -> Result<HttpResponse, ApiError> {
        let (parts, body) = req.into_parts();
        let Some((endpoint, params)) = self.lookup(&parts.method, parts.uri.path()) else {
            return Err(ApiError::not_found(format!(
                "no route for {} {}",
                parts.method,
                parts.uri.path()
            )));
        };
        let contract = endpoint.contract();

        let input = parse_input(&parts, body, params).await?;
        validate_input(contract, &input)?;

        let accept = parts.headers.get(ACCEPT).and_then(|v| v.to_str().ok()).map(str::to_owned);
        let mut ctx = Context::new(Arc::clone(contract), input, Arc::clone(&self.services));
        let outcome = match run_chain(endpoint.middlewares(), &mut ctx).await {
            Ok(()) => endpoint.handler().call(ctx).await,
            Err(e) => Err(e),
        };

        let reply = outcome.map_err(|e| permitted(contract, e))?;
        render(contract, reply, accept.as_deref())
    }

    /// An OpenAPI-style document covering every mounted endpoint.
    pub fn describe(&self, title: &str, version: &str) -> Value {
        let mut paths = Map::new();
        let mut schemes = Map::new();
        for endpoint in &self.endpoints {
            let contract = endpoint.contract();
            let item = paths
                .entry(contract.path().to_owned())
                .or_insert_with(|| Value::Object(Map::new()));
            if let Some(item) = item.as_object_mut() {
                item.insert(contract.method().as_str().to_ascii_lowercase(), contract.describe());
            }
            if let Some((name, scheme)) = contract.security_scheme() {
                schemes.insert(name.to_owned(), scheme.describe());
            }
        }
        json!({
            "openapi": "3.1.0",
            "info": { "title": title, "version": version },
            "paths": paths,
            "components": { "securitySchemes": schemes },
        })
    }
}

// ── Input ─────────────────────────────────────────────────────────────────────

async fn parse_input(parts: &Parts, body: Bytes, params: Map<String, Value>) -> Result<RequestInput, ApiError> {
    let mut input = RequestInput::new(parts.method.clone(), parts.uri.path());
    input.params = params;
    input.query = parts.uri.query().map(|q| parse_form(q.as_bytes())).unwrap_or_default();

    for (name, value) in &parts.headers {
        let value = String::from_utf8_lossy(value.as_bytes()).into_owned();
        match input.headers.get_mut(name.as_str()) {
            Some(Value::String(existing)) => {
                existing.push_str(", ");
                existing.push_str(&value);
            }
            _ => {
                input.headers.insert(name.as_str().to_owned(), Value::String(value));
            }
        }
    }

    let media_type = parts.headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok());
    match media_type {
        Some(mt) if !body.is_empty() && has_essence(mt, MULTIPART_FORM_DATA) => {
            let (fields, files) = parse_multipart(mt, body).await?;
            input.body = Value::Object(fields);
            input.files = files;
        }
        _ => input.body = parse_body(&body, media_type)?,
    }
    Ok(input)
}

fn has_essence(media_type: &str, expected: &str) -> bool {
    media_type
        .split(';')
        .next()
        .is_some_and(|essence| essence.trim().eq_ignore_ascii_case(expected))
}

fn parse_body(body: &Bytes, media_type: Option<&str>) -> Result<Value, ApiError> {
    match media_type {
        _ if body.is_empty() => Ok(Value::Null),
        Some(mt) if has_essence(mt, FORM_URLENCODED) => Ok(Value::Object(parse_form(body))),
        Some(mt) => response::decode(body, mt),
        // No content type: JSON if it parses, text otherwise.
        None => response::decode(body, APPLICATION_JSON)
            .or_else(|_| response::decode(body, "text/plain")),
    }
}

/// Splits a `multipart/form-data` body into its text fields (repeated names
/// become arrays) and its file parts.
async fn parse_multipart(
    media_type: &str,
    body: Bytes,
) -> Result<(Map<String, Value>, Vec<UploadedFile>), ApiError> {
    let boundary = multer::parse_boundary(media_type).map_err(malformed_multipart)?;
    let stream = futures::stream::once(async move { Ok::<_, std::io::Error>(body) });
    let mut multipart = multer::Multipart::new(stream, boundary);

    let mut fields = Map::new();
    let mut files = Vec::new();
    while let Some(field) = multipart.next_field().await.map_err(malformed_multipart)? {
        let name = field.name().unwrap_or_default().to_owned();
        match field.file_name().map(str::to_owned) {
            Some(filename) => {
                let content_type = field.content_type().map(ToString::to_string);
                let bytes = field.bytes().await.map_err(malformed_multipart)?;
                files.push(UploadedFile { field: name, filename, content_type, bytes });
            }
            None => {
                let text = field.text().await.map_err(malformed_multipart)?;
                insert_repeated(&mut fields, name, Value::String(text));
            }
        }
    }
    Ok((fields, files))
}

fn malformed_multipart(err: multer::Error) -> ApiError {
    ApiError::bad_request(format!("malformed multipart body: {err}"))
}

/// Parses `a=1&b=2&a=3` into `{"a": ["1", "3"], "b": "2"}`.
fn parse_form(raw: &[u8]) -> Map<String, Value> {
    let mut map = Map::new();
    for (key, value) in url::form_urlencoded::parse(raw) {
        insert_repeated(&mut map, key.into_owned(), Value::String(value.into_owned()));
    }
    map
}

fn insert_repeated(map: &mut Map<String, Value>, key: String, value: Value) {
    match map.get_mut(&key) {
        Some(Value::Array(values)) => values.push(value),
        Some(existing) => {
            let first = existing.take();
            *existing = Value::Array(vec![first, value]);
        }
        None => {
            map.insert(key, value);
        }
    }
}

fn validate_input(contract: &Contract, input: &RequestInput) -> Result<(), ApiError> {
    let input_schemas = contract.input();
    let locations: [(&str, Option<&Schema>, Value); 4] = [
        ("params", input_schemas.params.as_ref(), Value::Object(input.params.clone())),
        ("query", input_schemas.query.as_ref(), Value::Object(input.query.clone())),
        ("headers", input_schemas.headers.as_ref(), Value::Object(input.headers.clone())),
        ("body", input_schemas.body.as_ref(), input.body.clone()),
    ];

    let failures: Vec<Value> = locations
        .iter()
        .filter_map(|(location, schema, value)| {
            let failure = (*schema)?.validate(value).err()?;
            Some(json!({ "location": location, "errors": failure.errors() }))
        })
        .collect();

    if failures.is_empty() {
        Ok(())
    } else {
        Err(ApiError::bad_request("request does not match the contract").with_details(Value::Array(failures)))
    }
}

// ── Output ────────────────────────────────────────────────────────────────────

/// Downgrades codes the contract does not declare.
fn permitted(contract: &Contract, err: ApiError) -> ApiError {
    if contract.declared_errors().permits(err.code()) {
        return err;
    }
    warn!(code = %err.code(), message = err.message(), "undeclared error code raised, reporting internal error");
    ApiError::internal(format!("undeclared error code `{}`", err.code()))
}

fn contract_violation(reason: impl std::fmt::Display) -> ApiError {
    error!(%reason, "reply violates its contract");
    ApiError::internal("response does not match the contract")
}

fn render(contract: &Contract, reply: Reply, accept: Option<&str>) -> Result<HttpResponse, ApiError> {
    let (status, spec) = contract.success(reply.get_status()).map_err(contract_violation)?;

    let (media_type, schema) = match (spec, reply.get_content_type()) {
        (Some(spec), Some(wanted)) => {
            let schema = spec
                .schema_for(wanted)
                .ok_or_else(|| contract_violation(format!("content type `{wanted}` is not declared for {status}")))?;
            (wanted, Some(schema))
        }
        (Some(spec), None) => match spec.negotiate(accept) {
            Some((media_type, schema)) => (media_type, Some(schema)),
            None => (APPLICATION_JSON, None),
        },
        (None, wanted) => (wanted.unwrap_or(APPLICATION_JSON), None),
    };

    // Text and XML bodies go on the wire as the string itself.
    if ContentType::of(media_type) != ContentType::Json
        && !matches!(reply.body(), Value::String(_) | Value::Null)
    {
        return Err(contract_violation(format!("`{media_type}` reply is not a string")));
    }
    if let Some(schema) = schema {
        schema.validate(reply.body()).map_err(contract_violation)?;
    }

    if status == StatusCode::NO_CONTENT || status == StatusCode::NOT_MODIFIED {
        return Ok(response::build(status, None, reply.headers(), Bytes::new()));
    }
    let body = response::encode(reply.body(), media_type)?;
    Ok(response::build(status, Some(media_type), reply.headers(), body))
}
