//! Handler replies and their encoding.
//!
//! Handlers return anything that implements [`IntoReply`]. The reply is a
//! JSON value plus optional status, content type, and headers; the endpoint's
//! contract decides which schema it is checked against and how it is encoded
//! on the wire.

use bytes::Bytes;
use http::header::{CONTENT_TYPE, HeaderName, HeaderValue};
use http::StatusCode;
use http_body_util::Full;
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use crate::api_error::ApiError;

/// The response type handed to the transport.
pub type HttpResponse = http::Response<Full<Bytes>>;

// ── ContentType ───────────────────────────────────────────────────────────────

/// How a body is encoded for a given media type.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ContentType {
    Json, // application/json, application/*+json
    Xml,  // application/xml, text/xml
    Text, // text/plain and anything else textual
}

impl ContentType {
    /// Classifies a media type, ignoring parameters such as `charset`.
    pub fn of(media_type: &str) -> Self {
        let essence = media_type.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
        if essence == "application/json" || essence.ends_with("+json") {
            Self::Json
        } else if essence.ends_with("/xml") || essence.ends_with("+xml") {
            Self::Xml
        } else {
            Self::Text
        }
    }
}

/// Encodes `body` for `media_type`.
///
/// JSON bodies are serialized. XML and text bodies must be strings and are
/// sent verbatim, so that [`decode`] gives back the same value; `null` is an
/// empty body.
pub fn encode(body: &Value, media_type: &str) -> Result<Bytes, ApiError> {
    match (ContentType::of(media_type), body) {
        (ContentType::Json, body) => Ok(Bytes::from(serde_json::to_vec(body)?)),
        (_, Value::String(s)) => Ok(Bytes::from(s.clone())),
        (_, Value::Null) => Ok(Bytes::new()),
        (_, other) => Err(ApiError::internal(format!(
            "`{media_type}` bodies must be strings, got `{other}`"
        ))),
    }
}

/// Decodes bytes received as `media_type`: the inverse of [`encode`].
pub fn decode(bytes: &[u8], media_type: &str) -> Result<Value, ApiError> {
    if bytes.is_empty() {
        return Ok(Value::Null);
    }
    match ContentType::of(media_type) {
        ContentType::Json => serde_json::from_slice(bytes)
            .map_err(|e| ApiError::bad_request(format!("malformed JSON body: {e}"))),
        ContentType::Xml | ContentType::Text => std::str::from_utf8(bytes)
            .map(|s| Value::String(s.to_owned()))
            .map_err(|_| ApiError::bad_request("body is not valid UTF-8")),
    }
}

// ── Reply ─────────────────────────────────────────────────────────────────────

/// A handler's answer, before contract checks and encoding.
///
/// ```rust
/// use mesh::{Reply, StatusCode};
/// use serde_json::json;
///
/// Reply::new(json!({"id": "42"}))
///     .status(StatusCode::CREATED)
///     .header("location", "/users/42");
/// ```
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Reply {
    status: Option<StatusCode>,
    content_type: Option<String>,
    headers: Vec<(String, String)>,
    body: Value,
}

impl Reply {
    pub fn new(body: Value) -> Self {
        Self { body, ..Self::default() }
    }

    /// A reply with no body.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Answers with `code` instead of the contract's default success status.
    /// The status must be declared by the contract.
    pub fn status(mut self, code: StatusCode) -> Self {
        self.status = Some(code);
        self
    }

    /// Answers with `media_type` instead of the negotiated one.
    pub fn content_type(mut self, media_type: impl Into<String>) -> Self {
        self.content_type = Some(media_type.into());
        self
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_owned(), value.to_owned()));
        self
    }

    pub fn get_status(&self) -> Option<StatusCode> { self.status }
    pub fn get_content_type(&self) -> Option<&str> { self.content_type.as_deref() }
    pub fn headers(&self) -> &[(String, String)] { &self.headers }
    pub fn body(&self) -> &Value { &self.body }
}

// ── IntoReply ─────────────────────────────────────────────────────────────────

/// Conversion into a [`Reply`].
///
/// Implement on your own types to return them directly from handlers, or wrap
/// any `Serialize` value in [`Json`].
pub trait IntoReply {
    fn into_reply(self) -> Result<Reply, ApiError>;
}

impl IntoReply for Reply {
    fn into_reply(self) -> Result<Reply, ApiError> { Ok(self) }
}

impl IntoReply for Value {
    fn into_reply(self) -> Result<Reply, ApiError> { Ok(Reply::new(self)) }
}

impl IntoReply for String {
    fn into_reply(self) -> Result<Reply, ApiError> { Ok(Reply::new(Value::String(self))) }
}

impl IntoReply for &'static str {
    fn into_reply(self) -> Result<Reply, ApiError> { Ok(Reply::new(Value::String(self.to_owned()))) }
}

/// No body, e.g. for `204 No Content`.
impl IntoReply for () {
    fn into_reply(self) -> Result<Reply, ApiError> { Ok(Reply::empty()) }
}

/// Serializes the wrapped value with serde.
///
/// ```rust,ignore
/// async fn get_user(ctx: Context) -> Result<Json<User>, ApiError> {
///     Ok(Json(User { id: 1, name: "alice".into() }))
/// }
/// ```
pub struct Json<T>(pub T);

impl<T: Serialize> IntoReply for Json<T> {
    fn into_reply(self) -> Result<Reply, ApiError> {
        Ok(Reply::new(serde_json::to_value(self.0)?))
    }
}

// ── Wire responses ────────────────────────────────────────────────────────────

/// Builds the transport response. Headers that are not valid HTTP are
/// dropped with a warning.
pub(crate) fn build(
    status: StatusCode,
    media_type: Option<&str>,
    headers: &[(String, String)],
    body: Bytes,
) -> HttpResponse {
    let mut response = http::Response::new(Full::new(body));
    *response.status_mut() = status;
    let map = response.headers_mut();
    if let Some(media_type) = media_type {
        match HeaderValue::from_str(media_type) {
            Ok(value) => {
                map.insert(CONTENT_TYPE, value);
            }
            Err(_) => warn!(%media_type, "invalid content type dropped"),
        }
    }
    for (name, value) in headers {
        match (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(value)) {
            (Ok(name), Ok(value)) => {
                map.append(name, value);
            }
            _ => warn!(header = %name, "invalid reply header dropped"),
        }
    }
    response
}

/// The JSON error response for `err`, with the status from the fixed table.
pub(crate) fn error_response(err: &ApiError) -> HttpResponse {
    let body = serde_json::to_vec(&err.to_body()).unwrap_or_default();
    build(err.code().status(), Some("application/json"), &[], Bytes::from(body))
}
