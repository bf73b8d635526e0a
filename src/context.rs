//! Per-request context.
//!
//! A [`Context`] is created fresh for every request from the validated input,
//! grows as middleware contribute data, and is handed by value to the
//! handler. Nothing in it outlives the response.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use http::Method;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::debug;

use crate::api_error::ApiError;
use crate::contract::Contract;
use crate::error_code::ErrorCode;
use crate::services::Container;

/// A file part of a `multipart/form-data` body.
#[derive(Clone, Debug, PartialEq)]
pub struct UploadedFile {
    /// The form field the file was sent under.
    pub field: String,
    pub filename: String,
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

/// Raw request data after transport parsing, before validation.
#[derive(Clone, Debug)]
pub struct RequestInput {
    pub method: Method,
    pub path: String,
    pub params: Map<String, Value>,
    pub query: Map<String, Value>,
    /// Lower-cased header names.
    pub headers: Map<String, Value>,
    /// For multipart requests, the text fields only.
    pub body: Value,
    /// File parts of a multipart body, in arrival order. Not schema-checked.
    pub files: Vec<UploadedFile>,
}

impl RequestInput {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            params: Map::new(),
            query: Map::new(),
            headers: Map::new(),
            body: Value::Null,
            files: Vec::new(),
        }
    }
}

/// The request context seen by middleware and handlers.
pub struct Context {
    input: RequestInput,
    data: Map<String, Value>,
    provenance: HashMap<String, String>,
    contract: Arc<Contract>,
    services: Arc<Container>,
}

impl Context {
    pub fn new(contract: Arc<Contract>, input: RequestInput, services: Arc<Container>) -> Self {
        Self {
            input,
            data: Map::new(),
            provenance: HashMap::new(),
            contract,
            services,
        }
    }

    pub fn method(&self) -> &Method { &self.input.method }
    pub fn path(&self) -> &str { &self.input.path }
    pub fn contract(&self) -> &Contract { &self.contract }
    pub fn params(&self) -> &Map<String, Value> { &self.input.params }
    pub fn query(&self) -> &Map<String, Value> { &self.input.query }
    pub fn headers(&self) -> &Map<String, Value> { &self.input.headers }
    pub fn body(&self) -> &Value { &self.input.body }
    pub fn files(&self) -> &[UploadedFile] { &self.input.files }

    /// The first file uploaded under `field`.
    pub fn file(&self, field: &str) -> Option<&UploadedFile> {
        self.input.files.iter().find(|file| file.field == field)
    }

    /// Returns a named path parameter.
    ///
    /// For a route `/users/{id}`, `ctx.param("id")` on `/users/42` returns `Some("42")`.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.input.params.get(name).and_then(Value::as_str)
    }

    /// Returns a query parameter. Repeated parameters are arrays.
    pub fn query_value(&self, name: &str) -> Option<&Value> {
        self.input.query.get(name)
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.input
            .headers
            .get(&name.to_ascii_lowercase())
            .and_then(Value::as_str)
    }

    /// Deserializes the body. A shape mismatch is the caller's fault.
    pub fn body_as<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        serde_json::from_value(self.input.body.clone())
            .map_err(|e| ApiError::bad_request(format!("invalid body: {e}")))
    }

    // ── Middleware data ───────────────────────────────────────────────────────

    /// Everything middleware contributed so far, merged in declaration order.
    pub fn data(&self) -> &Map<String, Value> {
        &self.data
    }

    /// A contributed value. A missing key is a handled internal error.
    pub fn get(&self, key: &str) -> Result<&Value, ApiError> {
        self.data
            .get(key)
            .ok_or_else(|| ApiError::internal(format!("context has no `{key}`")))
    }

    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<T, ApiError> {
        let value = self.get(key)?.clone();
        serde_json::from_value(value)
            .map_err(|e| ApiError::internal(format!("context field `{key}`: {e}")))
    }

    /// A typed view over all contributed data.
    ///
    /// The fields of `T` are the names the handler reads; any field no
    /// middleware produced surfaces as an internal error.
    pub fn data_as<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        serde_json::from_value(Value::Object(self.data.clone()))
            .map_err(|e| ApiError::internal(format!("context data: {e}")))
    }

    /// Name of the middleware that last wrote `key`.
    pub fn contributed_by(&self, key: &str) -> Option<&str> {
        self.provenance.get(key).map(String::as_str)
    }

    /// Shallow-merges one middleware's output. Later writers win.
    pub(crate) fn merge(&mut self, producer: &str, output: Map<String, Value>) {
        for (key, value) in output {
            if let Some(previous) = self.provenance.get(&key) {
                debug!(%key, previous = %previous, current = %producer, "middleware output overrides earlier value");
            }
            self.provenance.insert(key.clone(), producer.to_owned());
            self.data.insert(key, value);
        }
    }

    // ── Errors and services ───────────────────────────────────────────────────

    /// Raises `code`. Codes the contract does not declare are downgraded to
    /// `INTERNAL_SERVER_ERROR` when the response is written.
    pub fn error(&self, code: ErrorCode, message: impl Into<String>) -> ApiError {
        ApiError::new(code, message)
    }

    pub fn services(&self) -> &Container {
        &self.services
    }

    /// Resolves a registered service. Failure to resolve is an internal error.
    pub fn service<T: Send + Sync + 'static>(&self, name: &str) -> Result<Arc<T>, ApiError> {
        self.services.get::<T>(name).map_err(|e| ApiError::internal(e.to_string()))
    }
}
