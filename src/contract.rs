//! Endpoint contracts.
//!
//! A [`Contract`] states, for one endpoint, what it accepts and what it may
//! answer: the method and path, a schema per input location, the success
//! responses keyed by status and content type, the error codes it may raise,
//! and an optional security scheme.
//!
//! ```rust
//! use mesh::{Contract, ErrorCode, Method, Schema, StatusCode, err, json};
//! use serde_json::json;
//!
//! # fn main() -> Result<(), mesh::Error> {
//! let user = Schema::new(json!({
//!     "type": "object",
//!     "properties": { "id": { "type": "string" }, "name": { "type": "string" } },
//!     "required": ["id", "name"]
//! }))?;
//!
//! let contract = Contract::new(Method::GET, "/users/{id}")
//!     .summary("Fetch one user")
//!     .response(StatusCode::OK, json(user).description("The user"))
//!     .errors(err([ErrorCode::NotFound]));
//! # Ok(())
//! # }
//! ```

use std::collections::BTreeMap;

use http::{Method, StatusCode};
use serde_json::{Map, Value, json};

use crate::error_code::ErrorCodes;
use crate::schema::Schema;
use crate::security::SecurityScheme;

pub const APPLICATION_JSON: &str = "application/json";
pub const APPLICATION_XML: &str = "application/xml";
pub const TEXT_PLAIN: &str = "text/plain";

// ── Responses ─────────────────────────────────────────────────────────────────

/// One declared response: a schema per content type plus a description.
///
/// Content types keep their declaration order; the first one is the default
/// when the client does not ask for another.
#[derive(Clone, Debug)]
pub struct ResponseSpec {
    content: Vec<(String, Schema)>,
    description: Option<String>,
}

impl ResponseSpec {
    pub fn description(mut self, text: impl Into<String>) -> Self {
        self.description = Some(text.into());
        self
    }

    /// Adds the content types of `other`. A content type declared twice keeps
    /// the later schema.
    pub fn or(mut self, other: ResponseSpec) -> Self {
        for (content_type, schema) in other.content {
            match self.content.iter_mut().find(|(ct, _)| *ct == content_type) {
                Some(slot) => slot.1 = schema,
                None => self.content.push((content_type, schema)),
            }
        }
        if self.description.is_none() {
            self.description = other.description;
        }
        self
    }

    pub fn content_types(&self) -> impl Iterator<Item = &str> {
        self.content.iter().map(|(ct, _)| ct.as_str())
    }

    /// The schema declared for `content_type`. Parameters such as `charset`
    /// are ignored.
    pub fn schema_for(&self, content_type: &str) -> Option<&Schema> {
        let wanted = essence(content_type);
        self.content
            .iter()
            .find(|(ct, _)| essence(ct).eq_ignore_ascii_case(wanted))
            .map(|(_, schema)| schema)
    }

    pub fn get_description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Picks the content type to answer with.
    ///
    /// `Accept` ranges are tried by descending `q`, ties in the client's
    /// order. `type/*` and `*/*` match the first declared type they cover.
    /// A `q=0` range rules out every type it covers. With no usable range
    /// the first declared type is used.
    pub fn negotiate(&self, accept: Option<&str>) -> Option<(&str, &Schema)> {
        let (mut wanted, refused): (Vec<(&str, f32)>, Vec<(&str, f32)>) = accept
            .into_iter()
            .flat_map(|header| header.split(','))
            .filter_map(media_range)
            .partition(|(_, q)| *q > 0.0);
        wanted.sort_by(|a, b| b.1.total_cmp(&a.1));

        let acceptable = |ct: &str| !refused.iter().any(|(range, _)| covers(range, ct));
        for (range, _) in wanted {
            if let Some((ct, schema)) = self
                .content
                .iter()
                .find(|(ct, _)| covers(range, ct) && acceptable(ct))
            {
                return Some((ct.as_str(), schema));
            }
        }
        self.content.first().map(|(ct, schema)| (ct.as_str(), schema))
    }

    fn describe(&self) -> Value {
        let content: Map<String, Value> = self
            .content
            .iter()
            .map(|(ct, schema)| (ct.clone(), json!({ "schema": schema.describe() })))
            .collect();
        json!({
            "description": self.description.clone().unwrap_or_default(),
            "content": content,
        })
    }
}

/// The media type without parameters: `text/plain; charset=utf-8` → `text/plain`.
fn essence(media_type: &str) -> &str {
    media_type.split(';').next().unwrap_or("").trim()
}

/// Splits one `Accept` entry into its range and quality. Unparsable `q`
/// values count as 1.
fn media_range(entry: &str) -> Option<(&str, f32)> {
    let mut parts = entry.split(';');
    let range = parts.next()?.trim();
    if range.is_empty() {
        return None;
    }
    let q = parts
        .filter_map(|param| param.split_once('='))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("q"))
        .and_then(|(_, value)| value.trim().parse::<f32>().ok())
        .unwrap_or(1.0);
    Some((range, q))
}

fn covers(range: &str, content_type: &str) -> bool {
    let content_type = essence(content_type);
    match range.split_once('/') {
        Some(("*", "*")) => true,
        Some((kind, "*")) => content_type
            .split_once('/')
            .is_some_and(|(declared, _)| declared.eq_ignore_ascii_case(kind)),
        _ => range.eq_ignore_ascii_case(content_type),
    }
}

/// A response of arbitrary content type.
pub fn response(content_type: impl Into<String>, schema: Schema) -> ResponseSpec {
    ResponseSpec { content: vec![(content_type.into(), schema)], description: None }
}

/// An `application/json` response.
pub fn json(schema: Schema) -> ResponseSpec {
    response(APPLICATION_JSON, schema)
}

/// An `application/xml` response.
///
/// Replies must be JSON strings holding the document; anything else is a
/// contract violation when the response is written.
pub fn xml(schema: Schema) -> ResponseSpec {
    response(APPLICATION_XML, schema)
}

/// A `text/plain` response. Replies must be JSON strings, as for [`xml`].
pub fn text(schema: Schema) -> ResponseSpec {
    response(TEXT_PLAIN, schema)
}

// ── Contract ──────────────────────────────────────────────────────────────────

/// Input schemas, one per request location. `None` accepts anything.
#[derive(Clone, Debug, Default)]
pub struct InputSchemas {
    pub params: Option<Schema>,
    pub query: Option<Schema>,
    pub headers: Option<Schema>,
    pub body: Option<Schema>,
}

/// The declarative description of one endpoint.
#[derive(Clone, Debug)]
pub struct Contract {
    method: Method,
    path: String,
    summary: Option<String>,
    input: InputSchemas,
    responses: BTreeMap<StatusCode, ResponseSpec>,
    errors: ErrorCodes,
    security: Option<(String, SecurityScheme)>,
}

impl Contract {
    /// `path` uses `{name}` segments for path parameters.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            summary: None,
            input: InputSchemas::default(),
            responses: BTreeMap::new(),
            errors: ErrorCodes::default(),
            security: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self { Self::new(Method::GET, path) }
    pub fn post(path: impl Into<String>) -> Self { Self::new(Method::POST, path) }
    pub fn put(path: impl Into<String>) -> Self { Self::new(Method::PUT, path) }
    pub fn patch(path: impl Into<String>) -> Self { Self::new(Method::PATCH, path) }
    pub fn delete(path: impl Into<String>) -> Self { Self::new(Method::DELETE, path) }

    pub fn summary(mut self, text: impl Into<String>) -> Self {
        self.summary = Some(text.into());
        self
    }

    pub fn params(mut self, schema: Schema) -> Self {
        self.input.params = Some(schema);
        self
    }

    pub fn query(mut self, schema: Schema) -> Self {
        self.input.query = Some(schema);
        self
    }

    /// Header names are matched lower-cased.
    pub fn headers(mut self, schema: Schema) -> Self {
        self.input.headers = Some(schema);
        self
    }

    pub fn body(mut self, schema: Schema) -> Self {
        self.input.body = Some(schema);
        self
    }

    /// Declares a success response. Declaring a status twice merges the
    /// content types.
    pub fn response(mut self, status: StatusCode, spec: ResponseSpec) -> Self {
        let spec = match self.responses.remove(&status) {
            Some(existing) => existing.or(spec),
            None => spec,
        };
        self.responses.insert(status, spec);
        self
    }

    pub fn errors(mut self, codes: ErrorCodes) -> Self {
        self.errors = codes;
        self
    }

    /// Documents the scheme callers authenticate with, under `name`.
    pub fn security(mut self, name: impl Into<String>, scheme: SecurityScheme) -> Self {
        self.security = Some((name.into(), scheme));
        self
    }

    pub fn method(&self) -> &Method { &self.method }
    pub fn path(&self) -> &str { &self.path }
    pub fn input(&self) -> &InputSchemas { &self.input }
    pub fn declared_errors(&self) -> &ErrorCodes { &self.errors }

    pub fn responses(&self) -> impl Iterator<Item = (StatusCode, &ResponseSpec)> {
        self.responses.iter().map(|(status, spec)| (*status, spec))
    }

    pub fn security_scheme(&self) -> Option<(&str, &SecurityScheme)> {
        self.security.as_ref().map(|(name, scheme)| (name.as_str(), scheme))
    }

    /// Resolves the response a handler reply maps to.
    ///
    /// With an explicit status, that status must be declared (unless the
    /// contract declares no responses at all). Without one, the lowest
    /// declared 2xx status is used, or `200` with no schema.
    pub fn success(
        &self,
        status: Option<StatusCode>,
    ) -> Result<(StatusCode, Option<&ResponseSpec>), UndeclaredStatus> {
        match status {
            Some(status) if self.responses.is_empty() => Ok((status, None)),
            Some(status) => self
                .responses
                .get(&status)
                .map(|spec| (status, Some(spec)))
                .ok_or(UndeclaredStatus(status)),
            None => Ok(self
                .responses
                .iter()
                .find(|(status, _)| status.is_success())
                .map(|(status, spec)| (*status, Some(spec)))
                .unwrap_or((StatusCode::OK, None))),
        }
    }

    /// An OpenAPI-style operation object built from the schemas' metadata.
    pub fn describe(&self) -> Value {
        let mut operation = Map::new();
        if let Some(summary) = &self.summary {
            operation.insert("summary".to_owned(), json!(summary));
        }

        let parameters: Vec<Value> = [
            ("path", &self.input.params),
            ("query", &self.input.query),
            ("header", &self.input.headers),
        ]
        .into_iter()
        .filter_map(|(location, schema)| schema.as_ref().map(|s| (location, s)))
        .flat_map(|(location, schema)| parameters(location, schema))
        .collect();
        if !parameters.is_empty() {
            operation.insert("parameters".to_owned(), Value::Array(parameters));
        }

        if let Some(body) = &self.input.body {
            operation.insert(
                "requestBody".to_owned(),
                json!({
                    "required": true,
                    "content": { APPLICATION_JSON: { "schema": body.describe() } },
                }),
            );
        }

        let mut responses: Map<String, Value> = self
            .responses
            .iter()
            .map(|(status, spec)| (status.as_u16().to_string(), spec.describe()))
            .collect();
        for code in self.errors.iter() {
            responses
                .entry(code.status().as_u16().to_string())
                .or_insert_with(|| json!({ "description": code.as_str() }));
        }
        operation.insert("responses".to_owned(), Value::Object(responses));

        if let Some((name, _)) = &self.security {
            operation.insert("security".to_owned(), json!([{ name.as_str(): [] }]));
        }

        Value::Object(operation)
    }
}

/// A reply named a status its contract does not declare.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
#[error("status {0} is not declared by the contract")]
pub struct UndeclaredStatus(pub StatusCode);

/// Expands an object schema into one OpenAPI parameter per property.
fn parameters(location: &str, schema: &Schema) -> Vec<Value> {
    let document = schema.describe();
    let required: Vec<&str> = document
        .get("required")
        .and_then(Value::as_array)
        .map(|names| names.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();
    let Some(properties) = document.get("properties").and_then(Value::as_object) else {
        return Vec::new();
    };
    properties
        .iter()
        .map(|(name, property)| {
            json!({
                "name": name,
                "in": location,
                "required": location == "path" || required.contains(&name.as_str()),
                "schema": property,
            })
        })
        .collect()
}
