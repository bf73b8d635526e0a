//! Schema validation seam.
//!
//! mesh never validates anything itself. A [`Schema`] holds a JSON Schema
//! document compiled by [`jsonschema`] and exposes the two operations the rest
//! of the crate needs:
//!
//! - `validate(value)`: accept the value or report every violation
//! - `describe()`: the raw document, used for API documentation
//!
//! Schemas can be written by hand with [`serde_json::json!`] or derived from a
//! Rust type with [`schemars`]:
//!
//! ```rust
//! use mesh::Schema;
//! use serde_json::json;
//!
//! let user = Schema::new(json!({
//!     "type": "object",
//!     "properties": { "id": { "type": "string" } },
//!     "required": ["id"]
//! })).unwrap();
//!
//! assert!(user.validate(&json!({"id": "42"})).is_ok());
//! assert!(user.validate(&json!({})).is_err());
//! ```

use std::fmt;
use std::sync::Arc;

use jsonschema::JSONSchema;
use schemars::JsonSchema;
use serde_json::Value;

use crate::error::Error;

/// A compiled, shareable JSON Schema.
///
/// Cloning is one `Arc` increment; the compiled validator is shared.
#[derive(Clone)]
pub struct Schema {
    document: Arc<Value>,
    compiled: Arc<JSONSchema>,
}

impl Schema {
    /// Compiles `document`. Fails if it is not a valid JSON Schema.
    pub fn new(document: Value) -> Result<Self, Error> {
        let compiled = JSONSchema::compile(&document)
            .map_err(|e| Error::InvalidSchema(e.to_string()))?;
        Ok(Self { document: Arc::new(document), compiled: Arc::new(compiled) })
    }

    /// Derives the schema of `T` through its [`JsonSchema`] impl.
    pub fn of<T: JsonSchema>() -> Result<Self, Error> {
        let mut document = serde_json::to_value(schemars::schema_for!(T))
            .map_err(|e| Error::InvalidSchema(e.to_string()))?;
        // The validator picks its draft from `$schema`; the generated meta-schema
        // URI is not one it is built with, and the keywords used are draft-agnostic.
        if let Some(object) = document.as_object_mut() {
            object.remove("$schema");
        }
        Self::new(document)
    }

    pub fn validate(&self, value: &Value) -> Result<(), ValidationFailure> {
        self.compiled.validate(value).map_err(|errors| {
            let errors = errors
                .map(|e| {
                    let path = e.instance_path.to_string();
                    let path = if path.is_empty() { "/".to_owned() } else { path };
                    format!("{path}: {e}")
                })
                .collect();
            ValidationFailure { errors }
        })
    }

    pub fn is_valid(&self, value: &Value) -> bool {
        self.compiled.is_valid(value)
    }

    /// The schema document, for documentation generators.
    pub fn describe(&self) -> &Value {
        &self.document
    }
}

impl fmt::Debug for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Schema").field(&self.document).finish()
    }
}

/// Every violation found while validating one value.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{}", .errors.join("; "))]
pub struct ValidationFailure {
    errors: Vec<String>,
}

impl ValidationFailure {
    /// One entry per violation, formatted as `"<instance path>: <message>"`.
    pub fn errors(&self) -> &[String] {
        &self.errors
    }
}
