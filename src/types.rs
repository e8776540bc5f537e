//! Core shared types for versioned schema generation.

use serde_json::Value;

/// Prefix of every component reference emitted into a document.
pub const COMPONENT_REF_PREFIX: &str = "#/components/schemas/";

/// Extension key naming the version a schema was generated for.
pub const API_VERSION_EXTENSION: &str = "x-api-version";

/// Extension key listing the version changes applied to a schema.
pub const MIGRATIONS_EXTENSION: &str = "x-migrations";

/// Returns the JSON type name for error messages.
pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Direction a schema is shaped for.
///
/// Requests walk the version chain with inverted request operations,
/// responses apply response operations as declared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Request,
    Response,
}

impl Direction {
    /// Lowercase name used in log output.
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Request => "request",
            Direction::Response => "response",
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
