//! Error types for schema generation, loading and writing.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while turning types into schemas for a version.
#[derive(Debug, Error)]
pub enum GenerateError {
    #[error("unsupported kind: {kind}")]
    UnsupportedKind { kind: String },

    #[error("unsupported map key kind: {kind} (only string keys are allowed)")]
    UnsupportedMapKey { kind: String },

    #[error("unresolved component: {name}")]
    UnresolvedComponent { name: String },

    #[error("cannot transform {type_name}: {message}")]
    TransformFailure { type_name: String, message: String },

    #[error("base schema {name} is not an OpenAPI 3.0 schema: {source}")]
    InvalidBaseSchema {
        name: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("type {type_name} at version {version}: {source}")]
    Type {
        type_name: String,
        version: String,
        #[source]
        source: Box<GenerateError>,
    },
}

impl GenerateError {
    /// Wrap this error with the type and version it was raised for.
    ///
    /// Already wrapped errors are returned unchanged so context is never doubled.
    pub fn in_type(self, type_name: impl Into<String>, version: impl Into<String>) -> Self {
        match self {
            wrapped @ GenerateError::Type { .. } => wrapped,
            other => GenerateError::Type {
                type_name: type_name.into(),
                version: version.into(),
                source: Box::new(other),
            },
        }
    }
}

/// Errors building a version bundle or attaching changes to it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VersionError {
    #[error("versions must be ascending: {next} does not come after {previous}")]
    NotAscending { previous: String, next: String },

    #[error("duplicate version: {version}")]
    Duplicate { version: String },

    #[error("unknown version: {version}")]
    UnknownVersion { version: String },
}

/// Errors loading documents and manifests.
#[derive(Debug, Error)]
pub enum LoadError {
    // IO errors (exit code 3)
    #[error("file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("cannot read {path}: {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // Parse errors (exit code 2)
    #[error("invalid JSON: {source}")]
    InvalidJson {
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid document: {source}")]
    InvalidDocument {
        #[source]
        source: serde_json::Error,
    },
}

impl LoadError {
    /// Returns the exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            LoadError::FileNotFound { .. } | LoadError::ReadError { .. } => 3,
            _ => 2,
        }
    }
}

/// Errors turning a declarative manifest into a type graph and version bundle.
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error("unknown type '{name}' referenced by {context}")]
    UnknownType { name: String, context: String },

    #[error("invalid type expression '{expr}': {message}")]
    InvalidTypeExpr { expr: String, message: String },

    #[error("type name '{name}' is reserved for a built-in type")]
    ReservedTypeName { name: String },

    #[error("unknown operation '{op}' in change for {version}")]
    UnknownOperation { op: String, version: String },

    #[error("invalid {op} operation: {message}")]
    InvalidOperation { op: String, message: String },

    #[error(transparent)]
    Version(#[from] VersionError),
}

impl ManifestError {
    /// Returns the exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            ManifestError::Load(e) => e.exit_code(),
            _ => 2,
        }
    }
}

/// Errors writing generated documents.
#[derive(Debug, Error)]
pub enum WriteError {
    #[error("cannot create {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot serialize document for version {version}: {source}")]
    Serialize {
        version: String,
        #[source]
        source: serde_json::Error,
    },
}
