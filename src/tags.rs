//! Field annotation parsing.
//!
//! Turns `json`, `binding`, `validate` and metadata tags into schema
//! constraints. All functions are pure.

use serde_json::{Number, Value};

use crate::reflect::FieldTags;
use crate::schema::{Schema, SchemaKind};

/// Serialized-name tag.
pub const NAME_TAG: &str = "json";
/// Validation rules enforced on requests.
pub const REQUEST_TAG: &str = "binding";
/// Validation rules enforced on responses.
pub const RESPONSE_TAG: &str = "validate";

/// Name tag value that drops a field entirely.
pub const SKIP_FIELD: &str = "-";

const OPTIONAL_MARKERS: &[&str] = &["omitempty", "omitzero"];

/// Split a name tag into the serialized name and whether it is optional.
///
/// The name is empty when the tag only carries options; callers fall back
/// to the field identifier.
pub fn parse_name_tag(tag: &str) -> (String, bool) {
    let mut parts = tag.split(',');
    let name = parts.next().unwrap_or("").trim().to_string();
    let optional = parts.any(|opt| OPTIONAL_MARKERS.contains(&opt.trim()));
    (name, optional)
}

/// Apply validation rules from the request and response tags.
///
/// Alternations (`a|b`) only honor their first alternative.
pub fn apply_validation_tags(schema: &mut Schema, request_tag: &str, response_tag: &str) {
    for tag in [request_tag, response_tag] {
        for token in rule_tokens(tag) {
            match token.split_once('=') {
                Some((key, value)) => apply_rule(schema, key.trim(), value.trim()),
                None => apply_keyword(schema, token),
            }
        }
    }
}

/// Apply `example`, `enums`, `format` and `description` tags.
pub fn apply_common_tags(schema: &mut Schema, tags: &FieldTags) {
    if let Some(example) = tags.get("example") {
        schema.example = Some(typed_literal(schema, example));
    }
    if let Some(enums) = tags.get("enums") {
        schema.enum_values = enums
            .split(',')
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(|v| typed_literal(schema, v))
            .collect();
    }
    if let Some(format) = tags.get("format") {
        schema.format = Some(format.to_string());
    }
    if let Some(description) = tags.get("description") {
        schema.description = Some(description.to_string());
    }
}

/// A field is required when it is not optional and either validation tag says `required`.
pub fn is_required(request_tag: &str, response_tag: &str, optional: bool) -> bool {
    if optional {
        return false;
    }
    [request_tag, response_tag]
        .iter()
        .any(|tag| rule_tokens(tag).any(|token| token == "required"))
}

fn rule_tokens(tag: &str) -> impl Iterator<Item = &str> {
    tag.split(',')
        .map(|token| token.split('|').next().unwrap_or("").trim())
        .filter(|token| !token.is_empty())
}

fn apply_keyword(schema: &mut Schema, keyword: &str) {
    match keyword {
        "email" => schema.format = Some("email".to_string()),
        "url" => schema.format = Some("uri".to_string()),
        "uuid" => schema.format = Some("uuid".to_string()),
        "base64" => schema.format = Some("byte".to_string()),
        "numeric" if schema.is_string() => {
            schema.pattern = Some(r"^[-+]?[0-9]+(?:\.[0-9]+)?$".to_string())
        }
        "alpha" if schema.is_string() => schema.pattern = Some("^[a-zA-Z]+$".to_string()),
        "alphanum" if schema.is_string() => {
            schema.pattern = Some("^[a-zA-Z0-9]+$".to_string())
        }
        _ => {}
    }
}

fn apply_rule(schema: &mut Schema, key: &str, value: &str) {
    match key {
        "max" => {
            if schema.is_string() {
                schema.max_length = value.parse().ok().or(schema.max_length);
            } else if schema.is_numeric() {
                if let Some(bound) = parse_number(value) {
                    schema.maximum = Some(bound);
                }
            } else if schema.kind == Some(SchemaKind::Array) {
                schema.max_items = value.parse().ok().or(schema.max_items);
            }
        }
        "min" => {
            if schema.is_string() {
                schema.min_length = value.parse().ok().or(schema.min_length);
            } else if schema.is_numeric() {
                if let Some(bound) = parse_number(value) {
                    schema.minimum = Some(bound);
                }
            } else if schema.kind == Some(SchemaKind::Array) {
                schema.min_items = value.parse().ok().or(schema.min_items);
            }
        }
        "len" => {
            let Ok(len) = value.parse::<u64>() else {
                return;
            };
            if schema.kind == Some(SchemaKind::Array) {
                schema.min_items = Some(len);
                schema.max_items = Some(len);
            } else {
                schema.min_length = Some(len);
                schema.max_length = Some(len);
            }
        }
        "gt" | "gte" if schema.is_numeric() => {
            if let Some(bound) = parse_number(value) {
                schema.minimum = Some(bound);
                schema.exclusive_minimum = key == "gt";
            }
        }
        "lt" | "lte" if schema.is_numeric() => {
            if let Some(bound) = parse_number(value) {
                schema.maximum = Some(bound);
                schema.exclusive_maximum = key == "lt";
            }
        }
        "oneof" => {
            schema.enum_values = value
                .split_whitespace()
                .map(|v| typed_literal(schema, v))
                .collect();
        }
        _ => {}
    }
}

/// Integers stay integers so `min=1` is written as `1`, not `1.0`.
fn parse_number(raw: &str) -> Option<Number> {
    if let Ok(int) = raw.parse::<i64>() {
        return Some(Number::from(int));
    }
    raw.parse::<f64>().ok().and_then(Number::from_f64)
}

/// Convert a raw tag value into a JSON literal matching the schema kind.
fn typed_literal(schema: &Schema, raw: &str) -> Value {
    match schema.kind {
        Some(SchemaKind::Integer) => raw
            .parse::<i64>()
            .map(Value::from)
            .unwrap_or_else(|_| Value::String(raw.to_string())),
        Some(SchemaKind::Number) => raw
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .unwrap_or_else(|| Value::String(raw.to_string())),
        Some(SchemaKind::Boolean) => raw
            .parse::<bool>()
            .map(Value::Bool)
            .unwrap_or_else(|_| Value::String(raw.to_string())),
        _ => Value::String(raw.to_string()),
    }
}
