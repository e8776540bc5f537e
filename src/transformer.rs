//! Applying version changes to schemas.
//!
//! Both directions start from the head schema and walk backward to the
//! target version. Response operations already describe newer-to-older edits
//! and apply as declared; request operations describe older-to-newer edits
//! and are inverted first.

use std::borrow::Cow;

use serde_json::Value;
use tracing::debug;

use crate::error::GenerateError;
use crate::parser::TypeParser;
use crate::reflect::{TypeGraph, TypeKey};
use crate::schema::{Schema, SchemaKind, SchemaRef};
use crate::types::{json_type_name, Direction};
use crate::version::{Operation, Version, VersionBundle, VersionChange};

/// Ages head schemas to older versions.
#[derive(Debug)]
pub struct VersionTransformer<'a> {
    bundle: &'a VersionBundle,
    parser: TypeParser<'a>,
}

impl<'a> VersionTransformer<'a> {
    pub fn new(graph: &'a TypeGraph, bundle: &'a VersionBundle) -> Self {
        Self {
            bundle,
            parser: TypeParser::new(graph),
        }
    }

    pub fn bundle(&self) -> &'a VersionBundle {
        self.bundle
    }

    /// Transform a head-shaped schema of `type_name` into its shape at `target`.
    ///
    /// The input is never modified. Custom operations and operations whose
    /// field does not exist are skipped.
    ///
    /// # Errors
    ///
    /// Returns `TransformFailure` when operations target a non-object schema
    /// or a rename would overwrite an existing property, and parser errors
    /// when a typed default cannot be described.
    pub fn transform_schema_for_version(
        &mut self,
        schema: &Schema,
        type_name: &str,
        target: &Version,
        direction: Direction,
    ) -> Result<Schema, GenerateError> {
        let mut result = schema.clone();
        if target.is_head() {
            return Ok(result);
        }

        let bundle = self.bundle;
        for (version, change) in bundle.changes_newer_than(target) {
            for ops in change.operations_for(type_name) {
                let declared = ops.operations(direction);
                if declared.is_empty() {
                    continue;
                }
                if !result.is_object() {
                    return Err(GenerateError::TransformFailure {
                        type_name: type_name.to_string(),
                        message: "field operations need an object schema".to_string(),
                    });
                }
                debug!(
                    type_name,
                    version = %version,
                    %direction,
                    change = %change.description,
                    "applying version change"
                );

                match direction {
                    Direction::Response => {
                        for op in declared {
                            self.apply(&mut result, type_name, Cow::Borrowed(op))?;
                        }
                    }
                    // Undo the forward edits in reverse order
                    Direction::Request => {
                        for op in declared.iter().rev() {
                            match op.invert() {
                                Some(inverse) => {
                                    self.apply(&mut result, type_name, Cow::Owned(inverse))?
                                }
                                None => debug!(
                                    type_name,
                                    kind = op.kind(),
                                    "skipping operation without inverse"
                                ),
                            }
                        }
                    }
                }
            }
        }

        Ok(result)
    }

    /// Changes with operations for `type_name` in `direction` that apply on the
    /// way to `target`, newest first.
    pub fn applied_changes(
        &self,
        type_name: &str,
        target: &Version,
        direction: Direction,
    ) -> Vec<&'a VersionChange> {
        if target.is_head() {
            return Vec::new();
        }
        let bundle = self.bundle;
        bundle
            .changes_newer_than(target)
            .filter(|(_, change)| {
                change
                    .operations_for(type_name)
                    .any(|ops| !ops.operations(direction).is_empty())
            })
            .map(|(_, change)| change)
            .collect()
    }

    fn apply(
        &mut self,
        schema: &mut Schema,
        type_name: &str,
        op: Cow<'_, Operation>,
    ) -> Result<(), GenerateError> {
        match &*op {
            Operation::AddField {
                name,
                default,
                type_hint,
            } => {
                let property = self.default_schema(default, *type_hint)?;
                schema.properties.insert(name.clone(), property);
                schema.required.retain(|r| r != name);
            }
            Operation::RemoveField { name } | Operation::RemoveFieldIfDefault { name } => {
                if schema.properties.remove(name).is_none() {
                    debug!(type_name, field = %name, "field to remove not present");
                }
                schema.required.retain(|r| r != name);
            }
            Operation::RenameField { from, to } => {
                let Some(property) = schema.properties.remove(from) else {
                    debug!(type_name, field = %from, "field to rename not present");
                    return Ok(());
                };
                if schema.properties.contains_key(to) {
                    return Err(GenerateError::TransformFailure {
                        type_name: type_name.to_string(),
                        message: format!("cannot rename {} to {}: {} already exists", from, to, to),
                    });
                }
                schema.properties.insert(to.clone(), property);
                for required in schema.required.iter_mut() {
                    if required == from {
                        *required = to.clone();
                    }
                }
            }
            Operation::Custom(custom) => {
                debug!(type_name, label = %custom.label, "custom operation has no schema effect");
            }
        }
        Ok(())
    }

    /// Schema for a field introduced with a literal default.
    fn default_schema(
        &mut self,
        default: &Value,
        type_hint: Option<TypeKey>,
    ) -> Result<SchemaRef, GenerateError> {
        if let Some(key) = type_hint {
            self.parser.reset();
            let mut property = self.parser.parse_type(key)?;
            if let (Some(schema), false) = (property.as_inline_mut(), default.is_null()) {
                schema.default = Some(default.clone());
            }
            return Ok(property);
        }

        let mut schema = literal_schema(default);
        if !default.is_null() {
            schema.default = Some(default.clone());
        }
        Ok(SchemaRef::inline(schema))
    }
}

/// Infer a schema from a JSON literal.
fn literal_schema(value: &Value) -> Schema {
    let schema = match value {
        Value::Null => Schema::object(),
        Value::Bool(_) => Schema::new(SchemaKind::Boolean),
        Value::Number(n) if n.is_i64() || n.is_u64() => {
            Schema::with_format(SchemaKind::Integer, "int64")
        }
        Value::Number(_) => Schema::with_format(SchemaKind::Number, "double"),
        Value::String(_) => Schema::new(SchemaKind::String),
        Value::Array(items) => Schema::array(SchemaRef::inline(
            items.first().map(literal_schema).unwrap_or_else(Schema::free_form),
        )),
        Value::Object(map) => {
            let mut schema = Schema::object();
            for (key, field) in map {
                schema
                    .properties
                    .insert(key.clone(), SchemaRef::inline(literal_schema(field)));
            }
            schema
        }
    };
    debug!(kind = json_type_name(value), "synthesized schema for default");
    schema
}
