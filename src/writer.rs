//! Writing generated documents to disk.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::WriteError;
use crate::schema::Document;

/// File name for a version's document.
pub fn document_file_name(version: &str) -> String {
    let safe: String = version
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '.' { c } else { '_' })
        .collect();
    format!("openapi-{}.json", safe)
}

/// Serialize one document.
pub fn to_json(document: &Document, version: &str, pretty: bool) -> Result<String, WriteError> {
    let result = if pretty {
        serde_json::to_string_pretty(document)
    } else {
        serde_json::to_string(document)
    };
    result.map_err(|source| WriteError::Serialize {
        version: version.to_string(),
        source,
    })
}

/// Serialize every document into one object keyed by version.
pub fn documents_to_json(
    documents: &BTreeMap<String, Document>,
    pretty: bool,
) -> Result<String, WriteError> {
    let result = if pretty {
        serde_json::to_string_pretty(documents)
    } else {
        serde_json::to_string(documents)
    };
    result.map_err(|source| WriteError::Serialize {
        version: "all".to_string(),
        source,
    })
}

/// Write one `openapi-<version>.json` per document into `out_dir`,
/// creating it if needed. Returns the written paths in version order.
pub fn write_documents(
    documents: &BTreeMap<String, Document>,
    out_dir: &Path,
    pretty: bool,
) -> Result<Vec<PathBuf>, WriteError> {
    std::fs::create_dir_all(out_dir).map_err(|source| WriteError::CreateDir {
        path: out_dir.to_path_buf(),
        source,
    })?;

    let mut written = Vec::with_capacity(documents.len());
    for (version, document) in documents {
        let path = out_dir.join(document_file_name(version));
        let mut content = to_json(document, version, pretty)?;
        content.push('\n');
        std::fs::write(&path, content).map_err(|source| WriteError::Write {
            path: path.clone(),
            source,
        })?;
        info!(version = %version, path = %path.display(), "wrote document");
        written.push(path);
    }
    Ok(written)
}
