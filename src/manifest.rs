//! Declarative project manifests.
//!
//! A manifest describes the type graph, versions, version changes, endpoint
//! registrations and generator options as JSON, so documents can be generated
//! without compiling Rust types:
//!
//! ```json
//! {
//!   "types": {
//!     "User": { "fields": [
//!       { "name": "ID", "type": "i64", "tags": { "json": "id", "validate": "required" } },
//!       { "name": "Email", "type": "String", "tags": { "json": "email" } }
//!     ] }
//!   },
//!   "versions": ["2024-01-01"],
//!   "changes": [
//!     { "version": "head", "description": "Add email",
//!       "types": { "User": { "response": [ { "op": "remove_field", "name": "email" } ] } } }
//!   ],
//!   "endpoints": [ { "response": "User" } ]
//! }
//! ```

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::error::{LoadError, ManifestError};
use crate::generator::{GeneratorConfig, SchemaGenerator};
use crate::loader::load_json;
use crate::reflect::{FieldDef, FieldTags, TypeDef, TypeGraph, TypeKey};
use crate::registry::{Registration, TypeRegistry};
use crate::version::{Operation, TypeOperations, Version, VersionBundle, VersionChange};

/// Spellings a declared type may not take.
const BUILTIN_TYPES: &[&str] = &[
    "bool", "i8", "i16", "i32", "i64", "isize", "u8", "u16", "u32", "u64", "usize", "f32", "f64",
    "String", "string", "DateTime", "Value", "any", "Option", "Box", "Vec", "HashMap", "BTreeMap",
];

/// Raw manifest as read from JSON.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub types: BTreeMap<String, StructSpec>,
    #[serde(default)]
    pub versions: Vec<String>,
    #[serde(default)]
    pub changes: Vec<ChangeSpec>,
    #[serde(default)]
    pub endpoints: Vec<EndpointSpec>,
    #[serde(default)]
    pub config: ConfigSpec,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StructSpec {
    #[serde(default)]
    pub fields: Vec<FieldSpec>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: TypeExpr,
    #[serde(default)]
    pub embedded: bool,
    #[serde(default = "exported_default")]
    pub exported: bool,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

fn exported_default() -> bool {
    true
}

/// A type expression: a type spelling or an inline anonymous struct.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum TypeExpr {
    Named(String),
    Inline(StructSpec),
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChangeSpec {
    pub version: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub types: BTreeMap<String, TypeOpsSpec>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TypeOpsSpec {
    #[serde(default)]
    pub request: Vec<OpSpec>,
    #[serde(default)]
    pub response: Vec<OpSpec>,
}

/// One field operation; which members are needed depends on `op`.
#[derive(Debug, Clone, Deserialize)]
pub struct OpSpec {
    pub op: String,
    pub name: Option<String>,
    #[serde(default)]
    pub default: Value,
    #[serde(rename = "type")]
    pub ty: Option<TypeExpr>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub label: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EndpointSpec {
    pub request: Option<TypeExpr>,
    pub response: Option<TypeExpr>,
    #[serde(default)]
    pub nested_arrays: Vec<TypeExpr>,
    #[serde(default)]
    pub nested_objects: Vec<TypeExpr>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigSpec {
    #[serde(default)]
    pub name_prefix: String,
    #[serde(default)]
    pub include_migration_metadata: bool,
    /// Type name to document schema name.
    #[serde(default)]
    pub rename: HashMap<String, String>,
}

impl Manifest {
    /// Parse a manifest from a JSON string.
    pub fn parse(content: &str) -> Result<Self, ManifestError> {
        let value = serde_json::from_str(content).map_err(|source| LoadError::InvalidJson { source })?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> Result<Self, ManifestError> {
        serde_json::from_value(value)
            .map_err(|source| LoadError::InvalidDocument { source }.into())
    }
}

/// Everything a generator needs, built from a manifest.
#[derive(Debug)]
pub struct Project {
    pub graph: TypeGraph,
    pub registry: TypeRegistry,
    pub bundle: VersionBundle,
    pub config: GeneratorConfig,
}

impl Project {
    /// Build the type graph, registry, bundle and config.
    ///
    /// # Errors
    ///
    /// Fails on unknown type names, malformed type expressions, unknown or
    /// incomplete operations, and out-of-order or unknown versions.
    pub fn from_manifest(manifest: &Manifest) -> Result<Self, ManifestError> {
        let mut graph = TypeGraph::new();

        // Declare every name first so fields can refer to any type
        let mut declared = Vec::with_capacity(manifest.types.len());
        for name in manifest.types.keys() {
            if BUILTIN_TYPES.contains(&name.as_str()) {
                return Err(ManifestError::ReservedTypeName { name: name.clone() });
            }
            declared.push((graph.declare_struct(name), name));
        }
        for (key, name) in declared {
            let fields = build_fields(&mut graph, &manifest.types[name].fields, name)?;
            graph.define_struct(key, fields);
        }

        let versions = manifest.versions.iter().map(|v| Version::parse(v)).collect();
        let mut bundle = VersionBundle::new(versions)?;
        for change in &manifest.changes {
            let version = Version::parse(&change.version);
            let built = build_change(&mut graph, change)?;
            bundle.attach(&version, built)?;
        }

        let mut registry = TypeRegistry::new();
        for (index, endpoint) in manifest.endpoints.iter().enumerate() {
            let context = format!("endpoint {}", index);
            let mut resolve = |expr: &Option<TypeExpr>| {
                expr.as_ref()
                    .map(|e| resolve_expr(&mut graph, e, &context))
                    .transpose()
            };
            let mut registration = Registration::new(
                resolve(&endpoint.request)?,
                resolve(&endpoint.response)?,
            );
            for expr in &endpoint.nested_arrays {
                registration = registration.nested_array(resolve_expr(&mut graph, expr, &context)?);
            }
            for expr in &endpoint.nested_objects {
                registration = registration.nested_object(resolve_expr(&mut graph, expr, &context)?);
            }
            registry.register(registration);
        }

        let rename = manifest.config.rename.clone();
        let config = GeneratorConfig::new()
            .name_prefix(manifest.config.name_prefix.clone())
            .include_migration_metadata(manifest.config.include_migration_metadata)
            .output_name_mapper(move |name| {
                rename.get(name).cloned().unwrap_or_else(|| name.to_string())
            });

        debug!(
            types = manifest.types.len(),
            versions = manifest.versions.len(),
            endpoints = manifest.endpoints.len(),
            "built project from manifest"
        );

        Ok(Self {
            graph,
            registry,
            bundle,
            config,
        })
    }

    /// A generator over this project.
    pub fn generator(&self) -> SchemaGenerator<'_> {
        SchemaGenerator::new(&self.graph, &self.registry, &self.bundle, self.config.clone())
    }
}

/// Load a manifest file and build its project.
pub fn load_project(path: &Path) -> Result<Project, ManifestError> {
    let manifest = Manifest::from_value(load_json(path)?)?;
    Project::from_manifest(&manifest)
}

fn build_fields(
    graph: &mut TypeGraph,
    specs: &[FieldSpec],
    owner: &str,
) -> Result<Vec<FieldDef>, ManifestError> {
    let mut fields = Vec::with_capacity(specs.len());
    for spec in specs {
        let context = format!("field {}.{}", owner, spec.name);
        let ty = resolve_expr(graph, &spec.ty, &context)?;
        let mut field = if spec.embedded {
            FieldDef::embedded(spec.name.clone(), ty)
        } else {
            FieldDef::new(spec.name.clone(), ty)
        };
        if !spec.exported {
            field = field.unexported();
        }
        field.tags = spec
            .tags
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect::<FieldTags>();
        fields.push(field);
    }
    Ok(fields)
}

fn build_change(graph: &mut TypeGraph, spec: &ChangeSpec) -> Result<VersionChange, ManifestError> {
    let mut change = VersionChange::new(spec.description.clone());
    for (type_name, ops) in &spec.types {
        let mut built = TypeOperations::new(type_name.clone());
        for op in &ops.request {
            built = built.request(build_operation(graph, op, &spec.version)?);
        }
        for op in &ops.response {
            built = built.response(build_operation(graph, op, &spec.version)?);
        }
        change = change.with(built);
    }
    Ok(change)
}

fn build_operation(
    graph: &mut TypeGraph,
    spec: &OpSpec,
    version: &str,
) -> Result<Operation, ManifestError> {
    let member = |value: &Option<String>, key: &str| {
        value.clone().ok_or_else(|| ManifestError::InvalidOperation {
            op: spec.op.clone(),
            message: format!("missing '{}'", key),
        })
    };

    let op = match spec.op.as_str() {
        "add_field" => {
            let name = member(&spec.name, "name")?;
            match &spec.ty {
                Some(expr) => {
                    let context = format!("{} operation on '{}'", spec.op, name);
                    let hint = resolve_expr(graph, expr, &context)?;
                    Operation::add_typed_field(name, spec.default.clone(), hint)
                }
                None => Operation::add_field(name, spec.default.clone()),
            }
        }
        "remove_field" => Operation::remove_field(member(&spec.name, "name")?),
        "rename_field" => {
            Operation::rename_field(member(&spec.from, "from")?, member(&spec.to, "to")?)
        }
        "remove_field_if_default" => {
            Operation::remove_field_if_default(member(&spec.name, "name")?)
        }
        // Payload transforms cannot be expressed in a manifest
        "custom" => Operation::custom(member(&spec.label, "label")?, |_| {}),
        other => {
            return Err(ManifestError::UnknownOperation {
                op: other.to_string(),
                version: version.to_string(),
            })
        }
    };
    Ok(op)
}

fn resolve_expr(
    graph: &mut TypeGraph,
    expr: &TypeExpr,
    context: &str,
) -> Result<TypeKey, ManifestError> {
    match expr {
        TypeExpr::Named(spelling) => parse_type_expr(graph, spelling, context),
        TypeExpr::Inline(spec) => {
            let fields = build_fields(graph, &spec.fields, context)?;
            Ok(graph.anonymous_struct(fields))
        }
    }
}

/// Resolve a type spelling such as `Option<Vec<Address>>`, `[f32; 3]` or
/// `HashMap<String, i64>` into the graph.
pub fn parse_type_expr(
    graph: &mut TypeGraph,
    expr: &str,
    context: &str,
) -> Result<TypeKey, ManifestError> {
    let expr = expr.trim();
    let invalid = |message: &str| ManifestError::InvalidTypeExpr {
        expr: expr.to_string(),
        message: message.to_string(),
    };

    let key = match expr {
        "bool" => graph.of::<bool>(),
        "i8" => graph.of::<i8>(),
        "i16" => graph.of::<i16>(),
        "i32" => graph.of::<i32>(),
        "i64" => graph.of::<i64>(),
        "isize" => graph.of::<isize>(),
        "u8" => graph.of::<u8>(),
        "u16" => graph.of::<u16>(),
        "u32" => graph.of::<u32>(),
        "u64" => graph.of::<u64>(),
        "usize" => graph.of::<usize>(),
        "f32" => graph.of::<f32>(),
        "f64" => graph.of::<f64>(),
        "String" | "string" => graph.of::<String>(),
        "DateTime" => graph.of::<DateTime<Utc>>(),
        "Value" | "any" => graph.of::<Value>(),
        "" => return Err(invalid("empty type")),
        _ => {
            if let Some(inner) = expr.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
                let (elem, len) = inner
                    .rsplit_once(';')
                    .ok_or_else(|| invalid("array needs '[T; N]'"))?;
                let len = len
                    .trim()
                    .parse::<usize>()
                    .map_err(|_| invalid("array length is not a number"))?;
                let elem = parse_type_expr(graph, elem, context)?;
                graph.add(TypeDef::Array { elem, len })
            } else if let Some((head, args)) = split_generic(expr) {
                let args = split_args(args);
                match (head, args.as_slice()) {
                    ("Option" | "Box", [inner]) => {
                        let inner = parse_type_expr(graph, inner, context)?;
                        graph.add(TypeDef::Pointer(inner))
                    }
                    ("Vec", [elem]) => {
                        let elem = parse_type_expr(graph, elem, context)?;
                        graph.add(TypeDef::Slice(elem))
                    }
                    ("HashMap" | "BTreeMap", [key, value]) => {
                        let key = parse_type_expr(graph, key, context)?;
                        let value = parse_type_expr(graph, value, context)?;
                        graph.add(TypeDef::Map { key, value })
                    }
                    ("Option" | "Box" | "Vec" | "HashMap" | "BTreeMap", _) => {
                        return Err(invalid("wrong number of type arguments"))
                    }
                    _ => return Err(invalid("unknown generic type")),
                }
            } else if expr.chars().all(|c| c.is_alphanumeric() || c == '_') {
                graph
                    .named(expr)
                    .ok_or_else(|| ManifestError::UnknownType {
                        name: expr.to_string(),
                        context: context.to_string(),
                    })?
            } else {
                return Err(invalid("unexpected characters"));
            }
        }
    };
    Ok(key)
}

/// Split `Head<args>` into its parts.
fn split_generic(expr: &str) -> Option<(&str, &str)> {
    let open = expr.find('<')?;
    let args = expr.strip_suffix('>')?;
    Some((expr[..open].trim(), &args[open + 1..]))
}

/// Split generic arguments on top-level commas.
fn split_args(args: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    for (i, c) in args.char_indices() {
        match c {
            '<' | '[' => depth += 1,
            '>' | ']' => depth -= 1,
            ',' if depth == 0 => {
                parts.push(args[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(args[start..].trim());
    parts
}
