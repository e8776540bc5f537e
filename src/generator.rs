//! Per-version document generation.
//!
//! For each version the generator:
//!
//! 1. clones the base document,
//! 2. discovers every type nested under the registered types,
//! 3. emits nested types as components shaped for the version,
//! 4. merges registered root types into the document, transforming
//!    externally authored schemas in place and generating missing ones,
//! 5. replaces inline objects matching a component's property names with
//!    references to that component.
//!
//! Schemas that match no registered or nested type are never touched.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{debug, info};

use crate::error::GenerateError;
use crate::parser::TypeParser;
use crate::reflect::{TypeDef, TypeGraph, TypeKey};
use crate::registry::TypeRegistry;
use crate::schema::{Document, Schema, SchemaRef};
use crate::tags::{parse_name_tag, NAME_TAG, SKIP_FIELD};
use crate::transformer::VersionTransformer;
use crate::types::{
    Direction, API_VERSION_EXTENSION, COMPONENT_REF_PREFIX, MIGRATIONS_EXTENSION,
};
use crate::version::{Operation, Version, VersionBundle};

/// Maps a type name to the schema name used in documents.
pub type NameMapper = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// Options for document generation.
#[derive(Clone)]
pub struct GeneratorConfig {
    /// Type name to document schema name. Defaults to identity.
    pub output_name_mapper: NameMapper,
    /// Tag placed in front of version suffixes.
    pub name_prefix: String,
    /// Annotate migrated schemas with `x-api-version` and `x-migrations`.
    pub include_migration_metadata: bool,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            output_name_mapper: Arc::new(|name: &str| name.to_string()),
            name_prefix: String::new(),
            include_migration_metadata: false,
        }
    }
}

impl fmt::Debug for GeneratorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeneratorConfig")
            .field("name_prefix", &self.name_prefix)
            .field("include_migration_metadata", &self.include_migration_metadata)
            .finish_non_exhaustive()
    }
}

impl GeneratorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the type name to schema name mapping.
    pub fn output_name_mapper(
        mut self,
        mapper: impl Fn(&str) -> String + Send + Sync + 'static,
    ) -> Self {
        self.output_name_mapper = Arc::new(mapper);
        self
    }

    /// Set the tag placed in front of version suffixes.
    pub fn name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.name_prefix = prefix.into();
        self
    }

    /// Enable or disable migration metadata on migrated schemas.
    pub fn include_migration_metadata(mut self, include: bool) -> Self {
        self.include_migration_metadata = include;
        self
    }

    /// Document schema name for a type name.
    pub fn map_name(&self, type_name: &str) -> String {
        (self.output_name_mapper)(type_name)
    }

    /// Suffix distinguishing a version's generated schemas; empty for head.
    pub fn version_suffix(&self, version: &Version) -> String {
        if version.is_head() {
            String::new()
        } else {
            format!("{}{}", self.name_prefix, version.suffix())
        }
    }
}

/// Generates one document per version from the registered types.
///
/// A generator processes versions sequentially and owns its parser and
/// transformer; generate concurrently with one generator per thread.
#[derive(Debug)]
pub struct SchemaGenerator<'a> {
    graph: &'a TypeGraph,
    registry: &'a TypeRegistry,
    config: GeneratorConfig,
    parser: TypeParser<'a>,
    transformer: VersionTransformer<'a>,
    /// Nested component names emitted per version.
    nested: HashMap<String, BTreeSet<String>>,
}

impl<'a> SchemaGenerator<'a> {
    pub fn new(
        graph: &'a TypeGraph,
        registry: &'a TypeRegistry,
        bundle: &'a VersionBundle,
        config: GeneratorConfig,
    ) -> Self {
        Self {
            graph,
            registry,
            config,
            parser: TypeParser::new(graph),
            transformer: VersionTransformer::new(graph, bundle),
            nested: HashMap::new(),
        }
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    /// Nested component names emitted for a version by the last generation.
    pub fn nested_components(&self, version: &Version) -> Option<&BTreeSet<String>> {
        self.nested.get(&version.to_string())
    }

    /// Generate a document for every version, keyed by version display string.
    ///
    /// # Errors
    ///
    /// Returns the first per-version failure; no documents are returned then.
    pub fn generate_versioned_specs(
        &mut self,
        base: &Document,
    ) -> Result<BTreeMap<String, Document>, GenerateError> {
        let versions: Vec<Version> = self.transformer.bundle().all_versions().collect();
        let mut documents = BTreeMap::new();
        for version in versions {
            let document = self.generate_spec_for_version(base, &version)?;
            documents.insert(version.to_string(), document);
        }
        Ok(documents)
    }

    /// Generate the document for one version.
    ///
    /// # Errors
    ///
    /// Any parse or transform failure aborts the whole version and is
    /// returned wrapped with the type and version it occurred for.
    pub fn generate_spec_for_version(
        &mut self,
        base: &Document,
        version: &Version,
    ) -> Result<Document, GenerateError> {
        let version_key = version.to_string();
        let mut document = base.clone();
        let mut managed = BTreeSet::new();

        let nested = self.discover_nested();
        self.emit_nested(&mut document, &nested, version, &mut managed)?;
        self.nested
            .insert(version_key.clone(), nested.keys().cloned().collect());

        self.merge_roots(base, &mut document, version, &mut managed)?;

        substitute_component_refs(&mut document, &managed);
        check_references(&document, &managed, &version_key)?;

        info!(
            version = %version,
            components = document.schema_names().len(),
            managed = managed.len(),
            "generated document"
        );
        Ok(document)
    }

    fn emit_nested(
        &mut self,
        document: &mut Document,
        nested: &BTreeMap<String, TypeKey>,
        version: &Version,
        managed: &mut BTreeSet<String>,
    ) -> Result<(), GenerateError> {
        let version_key = version.to_string();

        // Register everything first; siblings reference each other
        let mut pending = Vec::with_capacity(nested.len());
        for (name, key) in nested {
            self.parser.reset();
            let schema = self
                .parser
                .parse_schema(*key)
                .map_err(|e| e.in_type(name.as_str(), version_key.as_str()))?;
            document.set_schema(name.clone(), SchemaRef::inline(schema.clone()));
            pending.push((name, *key, schema));
        }

        // Nested types may sit under requests and responses alike
        for (name, key, schema) in pending {
            let type_name = self.graph.type_name(key);
            let response = self
                .transformer
                .transform_schema_for_version(&schema, &type_name, version, Direction::Response)
                .map_err(|e| e.in_type(type_name.as_str(), version_key.as_str()))?;
            let mut both = self
                .transformer
                .transform_schema_for_version(&response, &type_name, version, Direction::Request)
                .map_err(|e| e.in_type(type_name.as_str(), version_key.as_str()))?;
            self.annotate(
                &mut both,
                &type_name,
                version,
                &[Direction::Response, Direction::Request],
            );
            debug!(component = %name, type_name = %type_name, "emitted nested component");
            document.set_schema(name.clone(), SchemaRef::inline(both));
            managed.insert(name.clone());
        }
        Ok(())
    }

    fn merge_roots(
        &mut self,
        base: &Document,
        document: &mut Document,
        version: &Version,
        managed: &mut BTreeSet<String>,
    ) -> Result<(), GenerateError> {
        let version_key = version.to_string();
        let nested_names = self.nested.get(&version_key).cloned().unwrap_or_default();

        for (key, direction) in self.root_types() {
            let type_name = self.graph.type_name(key);
            let mapped = self.config.map_name(&self.component_name(key));

            let authored = base
                .parse_schema(&mapped)
                .transpose()
                .map_err(|source| {
                    GenerateError::InvalidBaseSchema {
                        name: mapped.clone(),
                        source,
                    }
                    .in_type(type_name.as_str(), version_key.as_str())
                })?;
            match authored {
                Some(SchemaRef::Inline(existing)) => {
                    let mut schema = self
                        .transformer
                        .transform_schema_for_version(&existing, &type_name, version, direction)
                        .map_err(|e| e.in_type(type_name.as_str(), version_key.as_str()))?;
                    self.annotate(&mut schema, &type_name, version, &[direction]);
                    debug!(schema = %mapped, %direction, "merged base schema");
                    document.set_schema(mapped.clone(), SchemaRef::inline(schema));
                    managed.insert(mapped);
                }
                Some(SchemaRef::Ref(_)) => {
                    debug!(schema = %mapped, "base schema is a reference, leaving as is");
                }
                None => {
                    let name = if version.is_head() || nested_names.contains(&mapped) {
                        mapped
                    } else {
                        format!("{}{}", mapped, self.config.version_suffix(version))
                    };
                    if document.has_schema(&name) {
                        continue;
                    }

                    self.parser.reset();
                    let head = self
                        .parser
                        .parse_schema(key)
                        .map_err(|e| e.in_type(type_name.as_str(), version_key.as_str()))?;
                    let mut schema = self
                        .transformer
                        .transform_schema_for_version(&head, &type_name, version, direction)
                        .map_err(|e| e.in_type(type_name.as_str(), version_key.as_str()))?;
                    self.annotate(&mut schema, &type_name, version, &[direction]);
                    debug!(schema = %name, %direction, "generated root schema");
                    document.set_schema(name.clone(), SchemaRef::inline(schema));
                    managed.insert(name);
                }
            }
        }
        Ok(())
    }

    /// Registered root types with their direction; a request registration
    /// wins over a response registration of the same type.
    fn root_types(&self) -> Vec<(TypeKey, Direction)> {
        let mut roots: Vec<(TypeKey, Direction)> = Vec::new();
        for registration in self.registry.registrations() {
            let candidates = [
                (registration.request, Direction::Request),
                (registration.response, Direction::Response),
            ];
            for (key, direction) in candidates {
                let Some(key) = key.map(|k| self.graph.deref(k)) else {
                    continue;
                };
                match roots.iter_mut().find(|(existing, _)| *existing == key) {
                    Some(entry) => {
                        if direction == Direction::Request {
                            entry.1 = Direction::Request;
                        }
                    }
                    None => roots.push((key, direction)),
                }
            }
        }
        roots
    }

    /// Walk every registered type and collect the component-worthy types
    /// reachable from it, keyed by component name.
    fn discover_nested(&self) -> BTreeMap<String, TypeKey> {
        let graph = self.graph;
        let mut nested = BTreeMap::new();
        let mut visited = HashSet::new();
        let mut stack: Vec<(TypeKey, String)> = Vec::new();

        for registration in self.registry.registrations() {
            for key in registration.request.iter().chain(registration.response.iter()) {
                stack.push((*key, self.component_name(*key)));
            }
            for key in registration
                .nested_arrays
                .iter()
                .chain(registration.nested_objects.iter())
            {
                let name = self.component_name(*key);
                if matches!(graph.struct_def(*key), Some(def) if def.name.is_none()) {
                    debug!(type_name = %name, "skipping anonymous nested registration");
                } else {
                    nested.entry(name.clone()).or_insert(graph.deref(*key));
                }
                stack.push((*key, name));
            }
        }

        // Composite defaults introduced by migrations need their components too
        for (_, change) in self.transformer.bundle().changes() {
            for ops in &change.types {
                for op in ops.request.iter().chain(ops.response.iter()) {
                    if let Operation::AddField {
                        type_hint: Some(key),
                        ..
                    } = op
                    {
                        self.reach(*key, &ops.type_name, "", &mut nested, &mut stack);
                    }
                }
            }
        }

        while let Some((key, context)) = stack.pop() {
            let key = graph.deref(key);
            if !visited.insert(key) {
                continue;
            }
            match graph.get(key) {
                TypeDef::Struct(def) => {
                    for field in &def.fields {
                        if !field.exported {
                            continue;
                        }
                        let (tag_name, _) = parse_name_tag(field.tags.lookup(NAME_TAG));
                        if tag_name == SKIP_FIELD {
                            continue;
                        }
                        if field.embedded && tag_name.is_empty() {
                            // Promoted, not referenced
                            stack.push((field.ty, context.clone()));
                        } else {
                            self.reach(field.ty, &context, &field.ident, &mut nested, &mut stack);
                        }
                    }
                }
                TypeDef::Slice(elem) | TypeDef::Array { elem, .. } => {
                    self.reach(*elem, &context, "Item", &mut nested, &mut stack);
                }
                TypeDef::Map { value, .. } => {
                    self.reach(*value, &context, "Value", &mut nested, &mut stack);
                }
                _ => {}
            }
        }

        nested
    }

    /// Record a type reached through a field, element or map value.
    fn reach(
        &self,
        key: TypeKey,
        context: &str,
        member: &str,
        nested: &mut BTreeMap<String, TypeKey>,
        stack: &mut Vec<(TypeKey, String)>,
    ) {
        let graph = self.graph;
        let key = graph.deref(key);
        match graph.get(key) {
            TypeDef::Struct(def) => {
                let name = match &def.name {
                    Some(name) => name.clone(),
                    None => format!("{}{}", context, pascal_case(member)),
                };
                nested.entry(name.clone()).or_insert(key);
                stack.push((key, name));
            }
            TypeDef::Slice(_) | TypeDef::Array { .. } | TypeDef::Map { .. } => {
                stack.push((key, context.to_string()));
            }
            _ => {}
        }
    }

    /// Deterministic component name for a type.
    fn component_name(&self, key: TypeKey) -> String {
        let graph = self.graph;
        let key = graph.deref(key);
        match graph.get(key) {
            TypeDef::Struct(def) => def.name.clone().unwrap_or_else(|| "Object".to_string()),
            TypeDef::Slice(elem) | TypeDef::Array { elem, .. } => {
                format!("{}Array", self.component_name(*elem))
            }
            TypeDef::Map { value, .. } => format!("{}Map", self.component_name(*value)),
            _ => pascal_case(&graph.type_name(key)),
        }
    }

    fn annotate(
        &self,
        schema: &mut Schema,
        type_name: &str,
        version: &Version,
        directions: &[Direction],
    ) {
        if !self.config.include_migration_metadata {
            return;
        }
        let mut descriptions: Vec<&str> = Vec::new();
        for direction in directions {
            for change in self.transformer.applied_changes(type_name, version, *direction) {
                if !descriptions.contains(&change.description.as_str()) {
                    descriptions.push(&change.description);
                }
            }
        }
        if descriptions.is_empty() {
            return;
        }
        schema
            .extensions
            .insert(API_VERSION_EXTENSION.to_string(), json!(version.to_string()));
        schema
            .extensions
            .insert(MIGRATIONS_EXTENSION.to_string(), json!(descriptions));
    }
}

fn pascal_case(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Replace inline objects whose property names equal a component's with a
/// reference to that component.
///
/// Matching looks at names only, so unrelated shapes sharing field names are
/// linked too. Ties go to the alphabetically first component.
fn substitute_component_refs(document: &mut Document, managed: &BTreeSet<String>) {
    let mut signatures: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for (name, schema) in &document.components.schemas {
        if let Some(schema) = schema.as_inline() {
            if schema.is_object() && !schema.properties.is_empty() {
                signatures.insert(name.clone(), schema.properties.keys().cloned().collect());
            }
        }
    }
    for (name, raw) in &document.components.raw_schemas {
        if document.components.schemas.contains_key(name) {
            continue;
        }
        if let Some(signature) = raw_signature(raw) {
            signatures.insert(name.clone(), signature);
        }
    }
    let signatures: Vec<(String, BTreeSet<String>)> = signatures.into_iter().collect();

    for name in managed {
        let Some(SchemaRef::Inline(schema)) = document.components.schemas.get_mut(name) else {
            continue;
        };
        for property in schema.properties.values_mut() {
            replace_matching(property, &signatures);
        }
        if let Some(items) = schema.items.as_mut() {
            replace_matching(items, &signatures);
        }
    }
}

/// Property names of an authored object schema.
fn raw_signature(raw: &Value) -> Option<BTreeSet<String>> {
    if raw.get("$ref").is_some() {
        return None;
    }
    let properties = raw.get("properties")?.as_object()?;
    let is_object = raw.get("type").map_or(true, |kind| kind == "object");
    (is_object && !properties.is_empty()).then(|| properties.keys().cloned().collect())
}

fn replace_matching(target: &mut SchemaRef, signatures: &[(String, BTreeSet<String>)]) {
    let matched = match target {
        SchemaRef::Inline(schema) => matching_component(schema, signatures),
        SchemaRef::Ref(_) => return,
    };

    if let Some(component) = matched {
        debug!(component = %component, "replaced inline object with reference");
        *target = SchemaRef::component(&component);
        return;
    }

    if let SchemaRef::Inline(schema) = target {
        for property in schema.properties.values_mut() {
            replace_matching(property, signatures);
        }
        if let Some(items) = schema.items.as_mut() {
            replace_matching(items, signatures);
        }
    }
}

fn matching_component(
    schema: &Schema,
    signatures: &[(String, BTreeSet<String>)],
) -> Option<String> {
    if !schema.is_object() || schema.properties.is_empty() {
        return None;
    }
    let names: BTreeSet<String> = schema.properties.keys().cloned().collect();
    signatures
        .iter()
        .find(|(_, signature)| *signature == names)
        .map(|(name, _)| name.clone())
}

/// Fail on references from managed schemas to components that do not exist.
fn check_references(
    document: &Document,
    managed: &BTreeSet<String>,
    version: &str,
) -> Result<(), GenerateError> {
    for name in managed {
        let Some(schema) = document.schema(name) else {
            continue;
        };
        for reference in schema.references() {
            let Some(target) = reference.strip_prefix(COMPONENT_REF_PREFIX) else {
                continue;
            };
            if !document.has_schema(target) {
                return Err(GenerateError::UnresolvedComponent {
                    name: target.to_string(),
                }
                .in_type(name.as_str(), version));
            }
        }
    }
    Ok(())
}
