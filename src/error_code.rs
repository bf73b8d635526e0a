//! The closed set of business error codes and their HTTP statuses.
//!
//! | Code | Status |
//! |---|---|
//! | `BAD_REQUEST` | 400 |
//! | `UNAUTHORIZED` | 401 |
//! | `FORBIDDEN` | 403 |
//! | `NOT_FOUND` | 404 |
//! | `INTERNAL_SERVER_ERROR` | 500 |

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use http::StatusCode;
use serde::{Deserialize, Serialize};

/// A business-level failure category.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    BadRequest,
    Unauthorized,
    Forbidden,
    NotFound,
    InternalServerError,
}

impl ErrorCode {
    pub const ALL: [ErrorCode; 5] = [
        Self::BadRequest,
        Self::Unauthorized,
        Self::Forbidden,
        Self::NotFound,
        Self::InternalServerError,
    ];

    /// Wire name, e.g. `"NOT_FOUND"`.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::BadRequest          => "BAD_REQUEST",
            Self::Unauthorized        => "UNAUTHORIZED",
            Self::Forbidden           => "FORBIDDEN",
            Self::NotFound            => "NOT_FOUND",
            Self::InternalServerError => "INTERNAL_SERVER_ERROR",
        }
    }

    pub fn status(self) -> StatusCode {
        match self {
            Self::BadRequest          => StatusCode::BAD_REQUEST,
            Self::Unauthorized        => StatusCode::UNAUTHORIZED,
            Self::Forbidden           => StatusCode::FORBIDDEN,
            Self::NotFound            => StatusCode::NOT_FOUND,
            Self::InternalServerError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parses a wire name (e.g. `"FORBIDDEN"`). Case-sensitive.
impl FromStr for ErrorCode {
    type Err = UnknownErrorCode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|code| code.as_str() == s)
            .ok_or_else(|| UnknownErrorCode(s.to_owned()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown error code `{0}`")]
pub struct UnknownErrorCode(pub String);

// ── Declared set ──────────────────────────────────────────────────────────────

/// The error codes an endpoint is permitted to surface.
///
/// `INTERNAL_SERVER_ERROR` is always permitted: it is what every undeclared
/// code degrades to.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ErrorCodes(BTreeSet<ErrorCode>);

impl ErrorCodes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn permits(&self, code: ErrorCode) -> bool {
        code == ErrorCode::InternalServerError || self.0.contains(&code)
    }

    /// The explicitly declared codes, in a stable order.
    pub fn iter(&self) -> impl Iterator<Item = ErrorCode> + '_ {
        self.0.iter().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<ErrorCode> for ErrorCodes {
    fn from_iter<I: IntoIterator<Item = ErrorCode>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Enumerates the error codes a contract may emit.
///
/// ```rust
/// use mesh::{err, ErrorCode};
///
/// let codes = err([ErrorCode::NotFound, ErrorCode::Unauthorized]);
/// assert!(codes.permits(ErrorCode::NotFound));
/// assert!(!codes.permits(ErrorCode::Forbidden));
/// ```
pub fn err(codes: impl IntoIterator<Item = ErrorCode>) -> ErrorCodes {
    codes.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_table_is_fixed() {
        let table: Vec<(ErrorCode, u16)> = ErrorCode::ALL
            .into_iter()
            .map(|code| (code, code.status().as_u16()))
            .collect();
        assert_eq!(
            table,
            vec![
                (ErrorCode::BadRequest, 400),
                (ErrorCode::Unauthorized, 401),
                (ErrorCode::Forbidden, 403),
                (ErrorCode::NotFound, 404),
                (ErrorCode::InternalServerError, 500),
            ]
        );
    }

    #[test]
    fn wire_names_parse_back() {
        for code in ErrorCode::ALL {
            assert_eq!(code.as_str().parse::<ErrorCode>(), Ok(code));
        }
        assert!("not_found".parse::<ErrorCode>().is_err());
    }

    #[test]
    fn serde_uses_wire_names() {
        let json = serde_json::to_string(&ErrorCode::InternalServerError).unwrap();
        assert_eq!(json, "\"INTERNAL_SERVER_ERROR\"");
    }

    #[test]
    fn internal_error_is_always_permitted() {
        let codes = ErrorCodes::new();
        assert!(codes.is_empty());
        assert!(codes.permits(ErrorCode::InternalServerError));
        assert!(!codes.permits(ErrorCode::BadRequest));
    }
}
