//! Unified startup error type.

use thiserror::Error;

/// The error type returned by mesh's fallible setup operations.
///
/// Request-level failures (400, 404, etc.) are expressed as
/// [`ApiError`](crate::ApiError) values and rendered as responses, never as
/// `Error`s. This type surfaces failures that happen while wiring the
/// application together: compiling a schema, registering a route, resolving a
/// service, loading configuration, or binding a socket.
#[derive(Debug, Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid socket address `{addr}`: {source}")]
    InvalidAddr {
        addr: String,
        #[source]
        source: std::net::AddrParseError,
    },

    #[error("invalid schema: {0}")]
    InvalidSchema(String),

    #[error("invalid route `{method} {path}`: {reason}")]
    InvalidRoute {
        method: http::Method,
        path: String,
        reason: String,
    },

    #[error("middleware options rejected: {0}")]
    InvalidOptions(String),

    #[error("service `{0}` is not registered")]
    MissingService(String),

    #[error("service `{name}` is not a `{expected}`")]
    ServiceType { name: String, expected: &'static str },

    #[error("invalid configuration: {0}")]
    Config(String),
}
