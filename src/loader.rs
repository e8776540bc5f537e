//! Document loading from files and strings.

use std::path::Path;

use serde_json::Value;

use crate::error::LoadError;
use crate::schema::Document;

/// Load raw JSON from a file path.
///
/// # Errors
///
/// Returns `LoadError::FileNotFound` if the file doesn't exist,
/// or `LoadError::InvalidJson` if the file isn't valid JSON.
pub fn load_json(path: &Path) -> Result<Value, LoadError> {
    if !path.exists() {
        return Err(LoadError::FileNotFound {
            path: path.to_path_buf(),
        });
    }

    let content = std::fs::read_to_string(path).map_err(|source| LoadError::ReadError {
        path: path.to_path_buf(),
        source,
    })?;

    serde_json::from_str(&content).map_err(|source| LoadError::InvalidJson { source })
}

/// Load a base document from a file path.
///
/// # Errors
///
/// Returns the errors of [`load_json`], or `LoadError::InvalidDocument` when
/// the JSON is not shaped like a document (for example, `components.schemas`
/// that is not an object). Individual schemas are kept as authored.
pub fn load_document(path: &Path) -> Result<Document, LoadError> {
    document_from_value(load_json(path)?)
}

/// Load a base document from a JSON string.
///
/// # Errors
///
/// Returns `LoadError::InvalidJson` if the string isn't valid JSON.
pub fn load_document_str(content: &str) -> Result<Document, LoadError> {
    let value = serde_json::from_str(content).map_err(|source| LoadError::InvalidJson { source })?;
    document_from_value(value)
}

fn document_from_value(value: Value) -> Result<Document, LoadError> {
    serde_json::from_value(value).map_err(|source| LoadError::InvalidDocument { source })
}
