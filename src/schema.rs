//! Schema graph and document model.
//!
//! Field names follow OpenAPI 3.0 so managed schemas deserialize directly and
//! generated documents serialize back into the same dialect. Keys the model
//! does not know about are kept in `extensions` and written back unchanged.
//!
//! Base document schemas stay raw JSON until the generator takes one over, so
//! schemas it never touches are written back exactly as authored, whatever
//! dialect they use.

use std::collections::{BTreeMap, BTreeSet};

use serde::de::{self, Deserializer};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

use crate::types::COMPONENT_REF_PREFIX;

/// Primitive shape of a schema node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaKind {
    String,
    Integer,
    Number,
    Boolean,
    Object,
    Array,
}

/// A node describing a shape.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Schema {
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<SchemaKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub example: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(rename = "enum", skip_serializing_if = "Vec::is_empty")]
    pub enum_values: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minimum: Option<Number>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maximum: Option<Number>,
    #[serde(skip_serializing_if = "is_false")]
    pub exclusive_minimum: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub exclusive_maximum: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_length: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_length: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_items: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_items: Option<u64>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, SchemaRef>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub required: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<SchemaRef>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub additional_properties: Option<AdditionalProperties>,
    #[serde(flatten)]
    pub extensions: Map<String, Value>,
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl Schema {
    /// Create an empty schema of the given kind.
    pub fn new(kind: SchemaKind) -> Self {
        Self {
            kind: Some(kind),
            ..Self::default()
        }
    }

    /// Create a schema of the given kind and format.
    pub fn with_format(kind: SchemaKind, format: &str) -> Self {
        Self {
            kind: Some(kind),
            format: Some(format.to_string()),
            ..Self::default()
        }
    }

    /// Object schema with no declared properties.
    pub fn object() -> Self {
        Self::new(SchemaKind::Object)
    }

    /// Object schema accepting any keys and values.
    pub fn free_form() -> Self {
        Self {
            kind: Some(SchemaKind::Object),
            additional_properties: Some(AdditionalProperties::Allowed(true)),
            ..Self::default()
        }
    }

    /// Array schema with the given item schema.
    pub fn array(items: SchemaRef) -> Self {
        Self {
            kind: Some(SchemaKind::Array),
            items: Some(Box::new(items)),
            ..Self::default()
        }
    }

    /// Returns true for strings.
    pub fn is_string(&self) -> bool {
        self.kind == Some(SchemaKind::String)
    }

    /// Returns true for integers and numbers.
    pub fn is_numeric(&self) -> bool {
        matches!(self.kind, Some(SchemaKind::Integer | SchemaKind::Number))
    }

    /// Returns true for object schemas, including untyped schemas with properties.
    pub fn is_object(&self) -> bool {
        self.kind == Some(SchemaKind::Object) || (self.kind.is_none() && !self.properties.is_empty())
    }

    /// The set of declared property names.
    pub fn property_names(&self) -> BTreeSet<&str> {
        self.properties.keys().map(String::as_str).collect()
    }

    /// Add a name to `required` unless it is already present.
    pub fn require(&mut self, name: &str) {
        if !self.required.iter().any(|r| r == name) {
            self.required.push(name.to_string());
        }
    }
}

/// Either an inline schema or a reference to a shared component.
#[derive(Debug, Clone, PartialEq)]
pub enum SchemaRef {
    /// A `$ref` pointer, stored as written (e.g. `#/components/schemas/User`).
    Ref(String),
    Inline(Box<Schema>),
}

impl SchemaRef {
    /// Reference to a component of the current document.
    pub fn component(name: &str) -> Self {
        SchemaRef::Ref(format!("{}{}", COMPONENT_REF_PREFIX, name))
    }

    /// Wrap a schema inline.
    pub fn inline(schema: Schema) -> Self {
        SchemaRef::Inline(Box::new(schema))
    }

    /// Component name for local component references.
    pub fn component_name(&self) -> Option<&str> {
        match self {
            SchemaRef::Ref(reference) => reference.strip_prefix(COMPONENT_REF_PREFIX),
            SchemaRef::Inline(_) => None,
        }
    }

    pub fn as_inline(&self) -> Option<&Schema> {
        match self {
            SchemaRef::Inline(schema) => Some(schema),
            SchemaRef::Ref(_) => None,
        }
    }

    pub fn as_inline_mut(&mut self) -> Option<&mut Schema> {
        match self {
            SchemaRef::Inline(schema) => Some(schema),
            SchemaRef::Ref(_) => None,
        }
    }

    /// Every `$ref` reachable from this node, depth first.
    pub fn references(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_references(&mut out);
        out
    }

    fn collect_references<'s>(&'s self, out: &mut Vec<&'s str>) {
        match self {
            SchemaRef::Ref(reference) => out.push(reference),
            SchemaRef::Inline(schema) => {
                for property in schema.properties.values() {
                    property.collect_references(out);
                }
                if let Some(items) = &schema.items {
                    items.collect_references(out);
                }
                if let Some(AdditionalProperties::Schema(value)) = &schema.additional_properties {
                    value.collect_references(out);
                }
            }
        }
    }
}

impl From<Schema> for SchemaRef {
    fn from(schema: Schema) -> Self {
        SchemaRef::inline(schema)
    }
}

impl Serialize for SchemaRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            SchemaRef::Ref(reference) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("$ref", reference)?;
                map.end()
            }
            SchemaRef::Inline(schema) => schema.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for SchemaRef {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        // Siblings of $ref carry no meaning in OpenAPI 3.0
        if let Some(reference) = value.get("$ref").and_then(Value::as_str) {
            return Ok(SchemaRef::Ref(reference.to_string()));
        }
        Schema::deserialize(value)
            .map(SchemaRef::inline)
            .map_err(de::Error::custom)
    }
}

/// `additionalProperties`: either a flag or a value schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AdditionalProperties {
    Allowed(bool),
    Schema(Box<SchemaRef>),
}

/// A schema document: named components plus opaque sections.
///
/// Only `components.schemas` is interpreted; paths, tags, security and every
/// other section pass through untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    #[serde(flatten)]
    pub rest: Map<String, Value>,
    #[serde(default)]
    pub components: Components,
}

/// The `components` section of a document.
///
/// `raw_schemas` holds schemas as read; `schemas` holds the ones built or
/// rewritten by the generator. A typed entry shadows a raw entry of the same
/// name and is written at the raw entry's position.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(from = "RawComponents")]
pub struct Components {
    pub schemas: BTreeMap<String, SchemaRef>,
    pub raw_schemas: Map<String, Value>,
    pub rest: Map<String, Value>,
}

#[derive(Deserialize)]
struct RawComponents {
    #[serde(default)]
    schemas: Map<String, Value>,
    #[serde(flatten)]
    rest: Map<String, Value>,
}

impl From<RawComponents> for Components {
    fn from(raw: RawComponents) -> Self {
        Self {
            schemas: BTreeMap::new(),
            raw_schemas: raw.schemas,
            rest: raw.rest,
        }
    }
}

impl Serialize for Components {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.rest.len() + 1))?;
        map.serialize_entry("schemas", &SchemaEntries(self))?;
        for (key, value) in &self.rest {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

struct SchemaEntries<'a>(&'a Components);

impl Serialize for SchemaEntries<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let components = self.0;
        let mut map = serializer.serialize_map(None)?;
        for (name, raw) in &components.raw_schemas {
            match components.schemas.get(name) {
                Some(typed) => map.serialize_entry(name, typed)?,
                None => map.serialize_entry(name, raw)?,
            }
        }
        for (name, typed) in &components.schemas {
            if !components.raw_schemas.contains_key(name) {
                map.serialize_entry(name, typed)?;
            }
        }
        map.end()
    }
}

impl Document {
    /// Look up a schema built or rewritten by the generator.
    pub fn schema(&self, name: &str) -> Option<&SchemaRef> {
        self.components.schemas.get(name)
    }

    /// Look up a schema carried through as authored.
    pub fn raw_schema(&self, name: &str) -> Option<&Value> {
        if self.components.schemas.contains_key(name) {
            return None;
        }
        self.components.raw_schemas.get(name)
    }

    /// A schema in typed form, parsing the authored JSON when needed.
    ///
    /// Returns `None` when no component has this name.
    pub fn parse_schema(&self, name: &str) -> Option<Result<SchemaRef, serde_json::Error>> {
        if let Some(typed) = self.components.schemas.get(name) {
            return Some(Ok(typed.clone()));
        }
        self.components
            .raw_schemas
            .get(name)
            .map(SchemaRef::deserialize)
    }

    /// Returns true if a component with this name exists.
    pub fn has_schema(&self, name: &str) -> bool {
        self.components.schemas.contains_key(name)
            || self.components.raw_schemas.contains_key(name)
    }

    /// Names of every component, typed or raw.
    pub fn schema_names(&self) -> BTreeSet<&str> {
        self.components
            .schemas
            .keys()
            .chain(self.components.raw_schemas.keys())
            .map(String::as_str)
            .collect()
    }

    /// Insert or replace a component schema.
    pub fn set_schema(&mut self, name: impl Into<String>, schema: SchemaRef) {
        self.components.schemas.insert(name.into(), schema);
    }
}
