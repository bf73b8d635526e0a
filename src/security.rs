//! Security scheme metadata.
//!
//! These values only describe how an endpoint expects callers to
//! authenticate, in the shape OpenAPI's `securitySchemes` uses. Nothing on the
//! request path reads them. Enforcing a scheme is a middleware's job.

use serde::Serialize;
use serde_json::Value;

/// Where an API key travels.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiKeyLocation {
    Header,
    Query,
    Cookie,
}

/// A declarative authentication scheme.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum SecurityScheme {
    #[serde(rename = "http")]
    Http {
        scheme: String,
        #[serde(rename = "bearerFormat", skip_serializing_if = "Option::is_none")]
        bearer_format: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },
    #[serde(rename = "apiKey")]
    ApiKey {
        name: String,
        #[serde(rename = "in")]
        location: ApiKeyLocation,
        #[serde(skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },
}

impl SecurityScheme {
    pub fn description(mut self, text: impl Into<String>) -> Self {
        match &mut self {
            Self::Http { description, .. } | Self::ApiKey { description, .. } => {
                *description = Some(text.into());
            }
        }
        self
    }

    /// The OpenAPI security scheme object.
    pub fn describe(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// `Authorization: Bearer <JWT>`.
pub fn bearer_auth() -> SecurityScheme {
    SecurityScheme::Http {
        scheme: "bearer".to_owned(),
        bearer_format: Some("JWT".to_owned()),
        description: None,
    }
}

/// `Authorization: Basic <credentials>`.
pub fn basic_auth() -> SecurityScheme {
    SecurityScheme::Http { scheme: "basic".to_owned(), bearer_format: None, description: None }
}

/// An API key sent as the header, query parameter, or cookie called `name`.
pub fn api_key_auth(name: impl Into<String>, location: ApiKeyLocation) -> SecurityScheme {
    SecurityScheme::ApiKey { name: name.into(), location, description: None }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn bearer_matches_openapi_shape() {
        let scheme = bearer_auth().description("JWT issued by the gateway");
        assert_eq!(
            scheme.describe(),
            json!({
                "type": "http",
                "scheme": "bearer",
                "bearerFormat": "JWT",
                "description": "JWT issued by the gateway"
            })
        );
    }

    #[test]
    fn basic_has_no_bearer_format() {
        assert_eq!(basic_auth().describe(), json!({"type": "http", "scheme": "basic"}));
    }

    #[test]
    fn api_key_names_its_location() {
        let scheme = api_key_auth("x-api-key", ApiKeyLocation::Header);
        assert_eq!(
            scheme.describe(),
            json!({"type": "apiKey", "name": "x-api-key", "in": "header"})
        );
    }
}
