//! Document linting - static checks over generated or hand-written documents.
//!
//! Reports:
//! - JSON syntax errors
//! - Broken internal `$ref` pointers (including missing components)
//! - `required` names with no matching property
//! - Object schemas that describe no shape at all

use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::Value;

use crate::loader::load_json;
use crate::types::json_type_name;

/// Severity level for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

/// A single diagnostic message from linting.
#[derive(Debug, Clone, Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub code: String,
    /// JSON path to the issue (e.g., "/components/schemas/User/required/0")
    pub path: String,
    pub message: String,
}

impl Diagnostic {
    fn error(code: &str, path: &str, message: String) -> Self {
        Self {
            severity: Severity::Error,
            code: code.to_string(),
            path: path.to_string(),
            message,
        }
    }

    fn warning(code: &str, path: &str, message: String) -> Self {
        Self {
            severity: Severity::Warning,
            code: code.to_string(),
            path: path.to_string(),
            message,
        }
    }
}

/// Result of linting a single file.
#[derive(Debug, Clone, Serialize)]
pub struct FileResult {
    pub file: PathBuf,
    pub status: FileStatus,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub diagnostics: Vec<Diagnostic>,
}

/// Status of a linted file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Ok,
    Error,
    Warning,
}

/// Result of linting a directory or set of files.
#[derive(Debug, Clone, Serialize)]
pub struct LintResult {
    pub path: PathBuf,
    pub files_checked: usize,
    pub passed: usize,
    pub failed: usize,
    pub errors: usize,
    pub warnings: usize,
    pub results: Vec<FileResult>,
}

impl LintResult {
    /// Returns true if all files passed (no errors).
    pub fn is_ok(&self) -> bool {
        self.errors == 0
    }
}

/// Lint a file or directory.
///
/// If path is a directory, recursively finds all .json files.
/// If `strict` is true, warnings are treated as errors.
pub fn lint(path: &Path, strict: bool) -> LintResult {
    let files = collect_document_files(path);
    let mut results = Vec::new();
    let mut total_errors = 0;
    let mut total_warnings = 0;

    for file in &files {
        let file_result = lint_file(file, path);
        total_errors += file_result
            .diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Error)
            .count();
        total_warnings += file_result
            .diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Warning)
            .count();
        results.push(file_result);
    }

    let failed = results
        .iter()
        .filter(|r| {
            if strict {
                r.status != FileStatus::Ok
            } else {
                r.status == FileStatus::Error
            }
        })
        .count();

    LintResult {
        path: path.to_path_buf(),
        files_checked: files.len(),
        passed: files.len() - failed,
        failed,
        errors: total_errors,
        warnings: total_warnings,
        results,
    }
}

/// Lint a single document file.
pub fn lint_file(file: &Path, base_path: &Path) -> FileResult {
    let relative = file.strip_prefix(base_path).unwrap_or(file);
    let relative = if relative.as_os_str().is_empty() {
        file.file_name().map(PathBuf::from).unwrap_or_else(|| file.to_path_buf())
    } else {
        relative.to_path_buf()
    };

    let diagnostics = match load_json(file) {
        Ok(document) => lint_document(&document),
        Err(e) => vec![Diagnostic::error("E001", "/", format!("syntax error: {}", e))],
    };

    let status = if diagnostics.iter().any(|d| d.severity == Severity::Error) {
        FileStatus::Error
    } else if diagnostics.is_empty() {
        FileStatus::Ok
    } else {
        FileStatus::Warning
    };

    FileResult {
        file: relative,
        status,
        diagnostics,
    }
}

/// Lint a parsed document.
pub fn lint_document(document: &Value) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    check_node(document, "", document, &mut diagnostics);
    diagnostics
}

/// Recursively check every object in the document.
fn check_node(value: &Value, path: &str, root: &Value, diagnostics: &mut Vec<Diagnostic>) {
    match value {
        Value::Object(map) => {
            if let Some(reference) = map.get("$ref") {
                check_ref(reference, path, root, diagnostics);
            }
            check_required(map, path, diagnostics);
            check_empty_object(map, path, diagnostics);

            for (key, val) in map {
                let child_path = format!("{}/{}", path, escape_pointer(key));
                check_node(val, &child_path, root, diagnostics);
            }
        }
        Value::Array(arr) => {
            for (i, item) in arr.iter().enumerate() {
                let child_path = format!("{}/{}", path, i);
                check_node(item, &child_path, root, diagnostics);
            }
        }
        _ => {}
    }
}

fn check_ref(reference: &Value, path: &str, root: &Value, diagnostics: &mut Vec<Diagnostic>) {
    let ref_path = format!("{}/$ref", path);
    let Value::String(target) = reference else {
        diagnostics.push(Diagnostic::error(
            "E002",
            &ref_path,
            format!("$ref must be a string, got {}", json_type_name(reference)),
        ));
        return;
    };

    // External documents can't be checked locally
    let Some(pointer) = target.strip_prefix('#') else {
        return;
    };
    if !pointer.is_empty() && root.pointer(pointer).is_none() {
        diagnostics.push(Diagnostic::error(
            "E002",
            &ref_path,
            format!("reference not found: {}", target),
        ));
    }
}

fn check_required(
    map: &serde_json::Map<String, Value>,
    path: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    // A property named "required" holds a schema, not a name list
    let Some(Value::Array(required)) = map.get("required") else {
        return;
    };
    let properties = map.get("properties").and_then(Value::as_object);

    for (i, name) in required.iter().enumerate() {
        let Some(name) = name.as_str() else {
            continue;
        };
        if !properties.is_some_and(|p| p.contains_key(name)) {
            diagnostics.push(Diagnostic::error(
                "E003",
                &format!("{}/required/{}", path, i),
                format!("required property \"{}\" is not declared in properties", name),
            ));
        }
    }
}

fn check_empty_object(
    map: &serde_json::Map<String, Value>,
    path: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    if map.get("type").and_then(Value::as_str) != Some("object") {
        return;
    }
    let describes_shape = ["properties", "additionalProperties", "allOf", "oneOf", "anyOf"]
        .iter()
        .any(|key| map.contains_key(*key));
    if !describes_shape {
        diagnostics.push(Diagnostic::warning(
            "W001",
            path,
            "object schema declares no properties".to_string(),
        ));
    }
}

/// Escape a key for use in a JSON pointer (`~` and `/`).
fn escape_pointer(key: &str) -> String {
    key.replace('~', "~0").replace('/', "~1")
}

/// Collect all .json files in a path (file or directory).
fn collect_document_files(path: &Path) -> Vec<PathBuf> {
    if path.is_file() {
        return vec![path.to_path_buf()];
    }

    let mut files = Vec::new();
    collect_files_recursive(path, &mut files);
    files.sort();
    files
}

fn collect_files_recursive(dir: &Path, files: &mut Vec<PathBuf>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };

    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_files_recursive(&path, files);
        } else if path.extension().map(|e| e == "json").unwrap_or(false) {
            files.push(path);
        }
    }
}
