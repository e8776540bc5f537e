//! Type graph to schema conversion.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde_json::Number;
use tracing::debug;

use crate::error::GenerateError;
use crate::reflect::{FieldDef, StructDef, TypeDef, TypeGraph, TypeKey};
use crate::schema::{AdditionalProperties, Schema, SchemaKind, SchemaRef};
use crate::tags::{
    apply_common_tags, apply_validation_tags, is_required, parse_name_tag, NAME_TAG, REQUEST_TAG,
    RESPONSE_TAG, SKIP_FIELD,
};

/// Converts types into schemas, emitting named structs as components.
///
/// Caches are scoped to one traversal; call [`TypeParser::reset`] between
/// independent type-graph walks.
#[derive(Debug)]
pub struct TypeParser<'g> {
    graph: &'g TypeGraph,
    cache: HashMap<TypeKey, SchemaRef>,
    components: BTreeMap<String, SchemaRef>,
    parsing: HashSet<TypeKey>,
}

impl<'g> TypeParser<'g> {
    pub fn new(graph: &'g TypeGraph) -> Self {
        Self {
            graph,
            cache: HashMap::new(),
            components: BTreeMap::new(),
            parsing: HashSet::new(),
        }
    }

    pub fn graph(&self) -> &'g TypeGraph {
        self.graph
    }

    /// Forget every cached schema and emitted component.
    pub fn reset(&mut self) {
        self.cache.clear();
        self.components.clear();
        self.parsing.clear();
    }

    /// Components emitted since the last reset.
    pub fn components(&self) -> &BTreeMap<String, SchemaRef> {
        &self.components
    }

    /// Parse a type. Named structs come back as component references.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedKind` or `UnsupportedMapKey` when the type, or any
    /// type reachable from it, has no schema representation.
    pub fn parse_type(&mut self, key: TypeKey) -> Result<SchemaRef, GenerateError> {
        let graph = self.graph;
        let key = graph.deref(key);

        if let Some(cached) = self.cache.get(&key) {
            return Ok(cached.clone());
        }

        if self.parsing.contains(&key) {
            // Cycle: point at the component being built
            return match graph.get(key) {
                TypeDef::Struct(StructDef {
                    name: Some(name), ..
                }) => Ok(SchemaRef::component(name)),
                _ => Err(GenerateError::UnsupportedKind {
                    kind: format!("recursive {}", graph.type_name(key)),
                }),
            };
        }

        self.parsing.insert(key);
        let result = self.parse_kind(key);
        self.parsing.remove(&key);

        let parsed = result?;
        self.cache.insert(key, parsed.clone());
        Ok(parsed)
    }

    /// Parse a type and resolve a top-level component reference to its schema.
    ///
    /// # Errors
    ///
    /// Same as [`TypeParser::parse_type`], plus `UnresolvedComponent` if the
    /// returned reference names no emitted component.
    pub fn parse_schema(&mut self, key: TypeKey) -> Result<Schema, GenerateError> {
        let parsed = self.parse_type(key)?;
        self.resolve(&parsed)
    }

    /// Resolve a reference against the emitted components.
    pub fn resolve(&self, schema_ref: &SchemaRef) -> Result<Schema, GenerateError> {
        match schema_ref {
            SchemaRef::Inline(schema) => Ok((**schema).clone()),
            SchemaRef::Ref(reference) => schema_ref
                .component_name()
                .and_then(|name| self.components.get(name))
                .and_then(SchemaRef::as_inline)
                .cloned()
                .ok_or_else(|| GenerateError::UnresolvedComponent {
                    name: reference.clone(),
                }),
        }
    }

    fn parse_kind(&mut self, key: TypeKey) -> Result<SchemaRef, GenerateError> {
        let graph = self.graph;
        let schema = match graph.get(key) {
            TypeDef::Bool => Schema::new(SchemaKind::Boolean),
            TypeDef::Int { bits, signed } => {
                let format = if *bits <= 32 { "int32" } else { "int64" };
                let mut schema = Schema::with_format(SchemaKind::Integer, format);
                if !signed {
                    schema.minimum = Some(Number::from(0));
                }
                schema
            }
            TypeDef::Float { bits } => {
                let format = if *bits <= 32 { "float" } else { "double" };
                Schema::with_format(SchemaKind::Number, format)
            }
            TypeDef::String => Schema::new(SchemaKind::String),
            TypeDef::Timestamp => Schema::with_format(SchemaKind::String, "date-time"),
            TypeDef::Any => Schema::free_form(),
            TypeDef::Pointer(inner) => return self.parse_type(*inner),
            TypeDef::Slice(elem) => Schema::array(self.parse_type(*elem)?),
            TypeDef::Array { elem, len } => {
                let mut schema = Schema::array(self.parse_type(*elem)?);
                schema.min_items = Some(*len as u64);
                schema.max_items = Some(*len as u64);
                schema
            }
            TypeDef::Map { key: map_key, value } => {
                if !matches!(graph.get(graph.deref(*map_key)), TypeDef::String) {
                    return Err(GenerateError::UnsupportedMapKey {
                        kind: graph.type_name(*map_key),
                    });
                }
                let additional = if matches!(graph.get(graph.deref(*value)), TypeDef::Any) {
                    AdditionalProperties::Allowed(true)
                } else {
                    AdditionalProperties::Schema(Box::new(self.parse_type(*value)?))
                };
                Schema {
                    additional_properties: Some(additional),
                    ..Schema::object()
                }
            }
            TypeDef::Struct(StructDef {
                name: Some(name),
                fields,
            }) => return self.parse_named_struct(name, fields),
            TypeDef::Struct(StructDef { name: None, fields }) => self.parse_fields(fields)?,
            TypeDef::Unsupported(kind) => {
                return Err(GenerateError::UnsupportedKind { kind: kind.clone() })
            }
        };
        Ok(SchemaRef::inline(schema))
    }

    fn parse_named_struct(
        &mut self,
        name: &str,
        fields: &'g [FieldDef],
    ) -> Result<SchemaRef, GenerateError> {
        if self.components.contains_key(name) {
            return Ok(SchemaRef::component(name));
        }

        // Registered before the fields so self-references land on this entry
        self.components
            .insert(name.to_string(), SchemaRef::inline(Schema::object()));
        let schema = self.parse_fields(fields)?;
        debug!(component = name, properties = schema.properties.len(), "parsed struct");
        self.components
            .insert(name.to_string(), SchemaRef::inline(schema));

        Ok(SchemaRef::component(name))
    }

    fn parse_fields(&mut self, fields: &'g [FieldDef]) -> Result<Schema, GenerateError> {
        let mut schema = Schema::object();

        for field in fields {
            if !field.exported {
                continue;
            }

            let (tag_name, optional) = parse_name_tag(field.tags.lookup(NAME_TAG));
            if tag_name == SKIP_FIELD {
                continue;
            }

            if field.embedded && tag_name.is_empty() && self.graph.struct_def(field.ty).is_some() {
                self.promote(&mut schema, field.ty)?;
                continue;
            }

            let name = if tag_name.is_empty() {
                field.ident.to_lowercase()
            } else {
                tag_name
            };

            let request_tag = field.tags.lookup(REQUEST_TAG);
            let response_tag = field.tags.lookup(RESPONSE_TAG);

            let mut field_schema = self.parse_type(field.ty)?;
            // Constraints cannot sit beside a $ref
            if let Some(inline) = field_schema.as_inline_mut() {
                apply_validation_tags(inline, request_tag, response_tag);
                apply_common_tags(inline, &field.tags);
            }

            if is_required(request_tag, response_tag, optional) {
                schema.require(&name);
            }
            schema.properties.insert(name, field_schema);
        }

        Ok(schema)
    }

    /// Flatten an embedded struct's properties and required names into `schema`.
    fn promote(&mut self, schema: &mut Schema, embedded: TypeKey) -> Result<(), GenerateError> {
        let parsed = self.parse_type(embedded)?;
        let source = match &parsed {
            SchemaRef::Inline(inline) => Some((**inline).clone()),
            SchemaRef::Ref(_) => parsed
                .component_name()
                .and_then(|name| self.components.get(name))
                .and_then(SchemaRef::as_inline)
                .cloned(),
        };

        if let Some(source) = source {
            for (name, property) in source.properties {
                schema.properties.insert(name, property);
            }
            for name in &source.required {
                schema.require(name);
            }
        }
        Ok(())
    }
}
