//! Versioned OpenAPI schema generation
//!
//! Generates one schema document per API version from the current (head)
//! type definitions plus a chain of declared version changes, and merges the
//! result into an externally authored base document.
//!
//! # Example
//!
//! ```
//! use versioned_openapi::{
//!     Document, FieldDef, GeneratorConfig, Operation, Reflect, SchemaGenerator, TypeGraph,
//!     TypeKey, TypeOperations, TypeRegistry, Version, VersionBundle, VersionChange,
//! };
//!
//! struct User;
//!
//! impl Reflect for User {
//!     fn reflect(graph: &mut TypeGraph) -> TypeKey {
//!         graph.reflect_struct::<Self>("User", |g| {
//!             vec![
//!                 FieldDef::new("ID", g.of::<i64>()).tag("json", "id"),
//!                 FieldDef::new("Email", g.of::<String>()).tag("json", "email"),
//!             ]
//!         })
//!     }
//! }
//!
//! let mut graph = TypeGraph::new();
//! let user = graph.of::<User>();
//!
//! let mut registry = TypeRegistry::new();
//! registry.register_response(user);
//!
//! let v1 = Version::parse("2024-01-01");
//! let v2 = Version::parse("2024-06-01");
//! let mut bundle = VersionBundle::new(vec![v1.clone(), v2.clone()]).unwrap();
//! bundle
//!     .attach(
//!         &v2,
//!         VersionChange::new("Add email")
//!             .with(TypeOperations::new("User").response(Operation::remove_field("email"))),
//!     )
//!     .unwrap();
//!
//! let mut generator = SchemaGenerator::new(&graph, &registry, &bundle, GeneratorConfig::new());
//! let documents = generator.generate_versioned_specs(&Document::default()).unwrap();
//!
//! // Older versions get a suffixed schema without the field added later
//! let old = documents["2024-01-01"].schema("User20240101").unwrap();
//! assert!(!old.as_inline().unwrap().properties.contains_key("email"));
//!
//! let head = documents["head"].schema("User").unwrap();
//! assert!(head.as_inline().unwrap().properties.contains_key("email"));
//! ```
//!
//! # Version changes
//!
//! A change is attached to the version that introduced it. Response
//! operations describe how to turn a newer response into the older shape;
//! request operations describe how an older request becomes the newer shape
//! and are inverted when generating older request schemas.
//!
//! | Operation | Response schema | Request schema (inverted) |
//! |-----------|-----------------|---------------------------|
//! | `add_field` | Add property | Remove property |
//! | `remove_field` | Remove property | Add generic property |
//! | `rename_field` | Rename property | Rename back |
//! | `remove_field_if_default` | Remove property | Add generic property |
//! | `custom` | No change | Skipped |

mod error;
mod generator;
mod linter;
mod loader;
mod manifest;
mod parser;
mod reflect;
mod registry;
mod schema;
mod tags;
mod transformer;
mod types;
mod version;
mod writer;

pub use error::{GenerateError, LoadError, ManifestError, VersionError, WriteError};
pub use generator::{GeneratorConfig, NameMapper, SchemaGenerator};
pub use linter::{
    lint, lint_document, lint_file, Diagnostic, FileResult, FileStatus, LintResult, Severity,
};
pub use loader::{load_document, load_document_str, load_json};
pub use manifest::{
    load_project, parse_type_expr, ChangeSpec, ConfigSpec, EndpointSpec, FieldSpec, Manifest,
    OpSpec, Project, StructSpec, TypeExpr, TypeOpsSpec,
};
pub use parser::TypeParser;
pub use reflect::{FieldDef, FieldTags, Reflect, StructDef, TypeDef, TypeGraph, TypeKey};
pub use registry::{Registration, TypeRegistry};
pub use schema::{AdditionalProperties, Components, Document, Schema, SchemaKind, SchemaRef};
pub use tags::{apply_common_tags, apply_validation_tags, is_required, parse_name_tag};
pub use transformer::VersionTransformer;
pub use types::{Direction, API_VERSION_EXTENSION, COMPONENT_REF_PREFIX, MIGRATIONS_EXTENSION};
pub use version::{
    CustomTransform, Operation, TypeOperations, Version, VersionBundle, VersionChange, VersionKind,
    HEAD,
};
pub use writer::{document_file_name, documents_to_json, to_json, write_documents};
