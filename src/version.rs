//! Versions, version changes and their field operations.
//!
//! A [`VersionChange`] is attached to the newer of two adjacent versions.
//! Response operations describe how a newer response becomes older; request
//! operations describe how an older request becomes newer.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use chrono::NaiveDate;
use serde_json::Value;

use crate::error::VersionError;
use crate::reflect::TypeKey;
use crate::types::Direction;

/// Display string of the head version.
pub const HEAD: &str = "head";

/// A point in the API's history.
///
/// Versions keep the spelling they were declared with. Their chronology is
/// the order of the bundle that declares them; the parsed kind only serves
/// to compare spellings and to sanity-check dates and numbered versions.
#[derive(Debug, Clone)]
pub struct Version {
    spelling: String,
    kind: VersionKind,
}

/// What a version spelling parsed as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VersionKind {
    Date(NaiveDate),
    Semver { major: u64, minor: u64, patch: u64 },
    /// Opaque label, compared by spelling.
    Label,
    /// Current, unversioned shape. Never migrated.
    Head,
}

impl Version {
    /// Parse `head`, a `YYYY-MM-DD` date, an `X.Y` or `X.Y.Z` version (with
    /// an optional `v` prefix), or fall back to an opaque label.
    pub fn parse(s: &str) -> Self {
        let s = s.trim();
        if s.eq_ignore_ascii_case(HEAD) {
            return Self::head();
        }
        Self {
            spelling: s.to_string(),
            kind: parse_kind(s),
        }
    }

    /// The head sentinel.
    pub fn head() -> Self {
        Self {
            spelling: HEAD.to_string(),
            kind: VersionKind::Head,
        }
    }

    pub fn kind(&self) -> VersionKind {
        self.kind
    }

    pub fn is_head(&self) -> bool {
        self.kind == VersionKind::Head
    }

    /// Display string with separators stripped; empty for head.
    pub fn suffix(&self) -> String {
        if self.is_head() {
            return String::new();
        }
        self.spelling
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect()
    }

    /// Natural order between two dates or two numbered versions.
    ///
    /// `None` for labels, head, and mixed kinds.
    fn natural_cmp(&self, other: &Version) -> Option<Ordering> {
        match (self.kind, other.kind) {
            (VersionKind::Date(a), VersionKind::Date(b)) => Some(a.cmp(&b)),
            (
                VersionKind::Semver {
                    major,
                    minor,
                    patch,
                },
                VersionKind::Semver {
                    major: other_major,
                    minor: other_minor,
                    patch: other_patch,
                },
            ) => Some((major, minor, patch).cmp(&(other_major, other_minor, other_patch))),
            _ => None,
        }
    }
}

fn parse_kind(s: &str) -> VersionKind {
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return VersionKind::Date(date);
    }
    let numeric = s.strip_prefix('v').unwrap_or(s);
    let parts: Result<Vec<u64>, _> = numeric.split('.').map(str::parse).collect();
    match parts.as_deref() {
        Ok([major, minor]) => VersionKind::Semver {
            major: *major,
            minor: *minor,
            patch: 0,
        },
        Ok([major, minor, patch]) => VersionKind::Semver {
            major: *major,
            minor: *minor,
            patch: *patch,
        },
        _ => VersionKind::Label,
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
            && (self.kind != VersionKind::Label || self.spelling == other.spelling)
    }
}

impl Eq for Version {}

impl Hash for Version {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.kind.hash(state);
        if self.kind == VersionKind::Label {
            self.spelling.hash(state);
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.spelling)
    }
}

impl From<&str> for Version {
    fn from(s: &str) -> Self {
        Version::parse(s)
    }
}

/// Payload transformer for operations with no schema-level meaning.
#[derive(Clone)]
pub struct CustomTransform {
    pub label: String,
    transform: Arc<dyn Fn(&mut Value) + Send + Sync>,
}

impl CustomTransform {
    pub fn new(label: impl Into<String>, transform: impl Fn(&mut Value) + Send + Sync + 'static) -> Self {
        Self {
            label: label.into(),
            transform: Arc::new(transform),
        }
    }

    /// Transformer that leaves payloads untouched.
    pub fn noop(label: impl Into<String>) -> Self {
        Self::new(label, |_| {})
    }

    /// Run the transformer on a payload.
    pub fn apply(&self, payload: &mut Value) {
        (self.transform)(payload)
    }
}

impl fmt::Debug for CustomTransform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomTransform")
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

/// A field-level edit between two adjacent versions.
#[derive(Debug, Clone)]
pub enum Operation {
    /// Add a field. `type_hint` describes composite defaults.
    AddField {
        name: String,
        default: Value,
        type_hint: Option<TypeKey>,
    },
    RemoveField {
        name: String,
    },
    RenameField {
        from: String,
        to: String,
    },
    /// Remove a field when it holds its default. Schemas treat it as a removal.
    RemoveFieldIfDefault {
        name: String,
    },
    Custom(CustomTransform),
}

impl Operation {
    pub fn add_field(name: impl Into<String>, default: Value) -> Self {
        Operation::AddField {
            name: name.into(),
            default,
            type_hint: None,
        }
    }

    pub fn add_typed_field(name: impl Into<String>, default: Value, type_hint: TypeKey) -> Self {
        Operation::AddField {
            name: name.into(),
            default,
            type_hint: Some(type_hint),
        }
    }

    pub fn remove_field(name: impl Into<String>) -> Self {
        Operation::RemoveField { name: name.into() }
    }

    pub fn rename_field(from: impl Into<String>, to: impl Into<String>) -> Self {
        Operation::RenameField {
            from: from.into(),
            to: to.into(),
        }
    }

    pub fn remove_field_if_default(name: impl Into<String>) -> Self {
        Operation::RemoveFieldIfDefault { name: name.into() }
    }

    pub fn custom(label: impl Into<String>, transform: impl Fn(&mut Value) + Send + Sync + 'static) -> Self {
        Operation::Custom(CustomTransform::new(label, transform))
    }

    /// The operation undoing this one, or `None` when there is no mechanical inverse.
    ///
    /// Adds and removals swap (a re-added field has no known default), renames
    /// swap their names, and custom transformers cannot be inverted.
    pub fn invert(&self) -> Option<Operation> {
        match self {
            Operation::AddField { name, .. } => Some(Operation::remove_field(name.clone())),
            Operation::RemoveField { name } | Operation::RemoveFieldIfDefault { name } => {
                Some(Operation::add_field(name.clone(), Value::Null))
            }
            Operation::RenameField { from, to } => {
                Some(Operation::rename_field(to.clone(), from.clone()))
            }
            Operation::Custom(_) => None,
        }
    }

    /// Short name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Operation::AddField { .. } => "add_field",
            Operation::RemoveField { .. } => "remove_field",
            Operation::RenameField { .. } => "rename_field",
            Operation::RemoveFieldIfDefault { .. } => "remove_field_if_default",
            Operation::Custom(_) => "custom",
        }
    }
}

/// Operations a version change declares for one type.
#[derive(Debug, Clone, Default)]
pub struct TypeOperations {
    pub type_name: String,
    pub request: Vec<Operation>,
    pub response: Vec<Operation>,
}

impl TypeOperations {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            ..Self::default()
        }
    }

    /// Append a request operation (older request to newer).
    pub fn request(mut self, op: Operation) -> Self {
        self.request.push(op);
        self
    }

    /// Append a response operation (newer response to older).
    pub fn response(mut self, op: Operation) -> Self {
        self.response.push(op);
        self
    }

    pub fn operations(&self, direction: Direction) -> &[Operation] {
        match direction {
            Direction::Request => &self.request,
            Direction::Response => &self.response,
        }
    }
}

/// The set of operations converting between two adjacent versions.
#[derive(Debug, Clone, Default)]
pub struct VersionChange {
    pub description: String,
    pub types: Vec<TypeOperations>,
}

impl VersionChange {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            types: Vec::new(),
        }
    }

    pub fn with(mut self, ops: TypeOperations) -> Self {
        self.types.push(ops);
        self
    }

    /// Operation sets targeting `type_name`.
    pub fn operations_for<'a>(
        &'a self,
        type_name: &'a str,
    ) -> impl Iterator<Item = &'a TypeOperations> + 'a {
        self.types.iter().filter(move |ops| ops.type_name == type_name)
    }
}

/// Released versions in chronological order, the head sentinel, and
/// attached changes.
#[derive(Debug, Clone)]
pub struct VersionBundle {
    versions: Vec<Version>,
    head: Version,
    /// Changes by version position; the slot after the last release is head's.
    changes: Vec<Vec<VersionChange>>,
}

impl Default for VersionBundle {
    fn default() -> Self {
        Self {
            versions: Vec::new(),
            head: Version::head(),
            changes: vec![Vec::new()],
        }
    }
}

impl VersionBundle {
    /// Build a bundle from versions in chronological order.
    ///
    /// The declared order is authoritative. Dates and numbered versions are
    /// additionally checked against each other of their own kind. A trailing
    /// `head` is accepted and dropped.
    ///
    /// # Errors
    ///
    /// Returns `VersionError` if a version repeats, `head` is not last, or a
    /// date or numbered version goes backward.
    pub fn new(versions: Vec<Version>) -> Result<Self, VersionError> {
        let mut released: Vec<Version> = Vec::with_capacity(versions.len());
        for (index, version) in versions.iter().enumerate() {
            if version.is_head() {
                match versions.get(index + 1) {
                    None => continue,
                    Some(next) => {
                        return Err(VersionError::NotAscending {
                            previous: HEAD.to_string(),
                            next: next.to_string(),
                        })
                    }
                }
            }
            if released.contains(version) {
                return Err(VersionError::Duplicate {
                    version: version.to_string(),
                });
            }
            let earlier = released
                .iter()
                .rev()
                .find(|previous| previous.natural_cmp(version).is_some());
            if let Some(previous) = earlier {
                if previous.natural_cmp(version) == Some(Ordering::Greater) {
                    return Err(VersionError::NotAscending {
                        previous: previous.to_string(),
                        next: version.to_string(),
                    });
                }
            }
            released.push(version.clone());
        }
        let slots = released.len() + 1;
        Ok(Self {
            versions: released,
            head: Version::head(),
            changes: vec![Vec::new(); slots],
        })
    }

    /// Attach a change to the newer endpoint of its version pair.
    ///
    /// # Errors
    ///
    /// Returns `VersionError::UnknownVersion` if the version is not in the bundle.
    pub fn attach(&mut self, version: &Version, change: VersionChange) -> Result<(), VersionError> {
        let position = self
            .position(version)
            .ok_or_else(|| VersionError::UnknownVersion {
                version: version.to_string(),
            })?;
        self.changes[position].push(change);
        Ok(())
    }

    /// Released versions, oldest first.
    pub fn versions(&self) -> &[Version] {
        &self.versions
    }

    /// Released versions followed by head.
    pub fn all_versions(&self) -> impl Iterator<Item = Version> + '_ {
        self.versions
            .iter()
            .chain(std::iter::once(&self.head))
            .cloned()
    }

    /// Find a version by its display string, returning it as declared.
    pub fn find(&self, s: &str) -> Option<Version> {
        let position = self.position(&Version::parse(s))?;
        Some(self.version_at(position).clone())
    }

    /// Chronological position; head comes after every release.
    pub fn position(&self, version: &Version) -> Option<usize> {
        if version.is_head() {
            return Some(self.versions.len());
        }
        self.versions.iter().position(|declared| declared == version)
    }

    fn version_at(&self, position: usize) -> &Version {
        self.versions.get(position).unwrap_or(&self.head)
    }

    /// Every attached change with the version it is attached to, oldest first.
    pub fn changes(&self) -> impl Iterator<Item = (&Version, &VersionChange)> {
        self.changes
            .iter()
            .enumerate()
            .flat_map(move |(position, changes)| {
                let version = self.version_at(position);
                changes.iter().map(move |change| (version, change))
            })
    }

    /// Changes that must be undone to reach `target` from head, newest first.
    ///
    /// Empty for versions the bundle does not declare.
    pub fn changes_newer_than<'a>(
        &'a self,
        target: &Version,
    ) -> impl Iterator<Item = (&'a Version, &'a VersionChange)> + 'a {
        let start = self
            .position(target)
            .map_or(self.changes.len(), |position| position + 1);
        self.changes
            .iter()
            .enumerate()
            .skip(start)
            .rev()
            .flat_map(move |(position, changes)| {
                let version = self.version_at(position);
                changes.iter().map(move |change| (version, change))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn v(s: &str) -> Version {
        Version::parse(s)
    }

    #[test]
    fn parse_kinds() {
        assert!(matches!(v("2024-06-01").kind(), VersionKind::Date(_)));
        assert_eq!(
            v("v1.2.3").kind(),
            VersionKind::Semver {
                major: 1,
                minor: 2,
                patch: 3
            }
        );
        assert_eq!(
            v("1.10").kind(),
            VersionKind::Semver {
                major: 1,
                minor: 10,
                patch: 0
            }
        );
        assert_eq!(v("beta").kind(), VersionKind::Label);
        assert_eq!(v("HEAD"), Version::head());
    }

    #[test]
    fn display_keeps_declared_spelling() {
        assert_eq!(v("v1.2.3").to_string(), "v1.2.3");
        assert_eq!(v("2024-1-1").to_string(), "2024-1-1");
        assert_eq!(v(" beta ").to_string(), "beta");
        assert_eq!(v("HEAD").to_string(), "head");
        // Same version, different spelling
        assert_eq!(v("2024-1-1"), v("2024-01-01"));
        assert_eq!(v("v1.2.3"), v("1.2.3"));
        assert_ne!(v("beta"), v("Beta"));
    }

    #[test]
    fn suffix_strips_separators() {
        assert_eq!(v("2024-01-01").suffix(), "20240101");
        assert_eq!(v("1.2.0").suffix(), "120");
        assert_eq!(v("v1.2.3").suffix(), "v123");
        assert_eq!(Version::head().suffix(), "");
    }

    #[test]
    fn invert_operations() {
        match Operation::add_field("nickname", json!("")).invert() {
            Some(Operation::RemoveField { name }) => assert_eq!(name, "nickname"),
            other => panic!("unexpected {:?}", other),
        }
        match Operation::rename_field("name", "full_name").invert() {
            Some(Operation::RenameField { from, to }) => {
                assert_eq!(from, "full_name");
                assert_eq!(to, "name");
            }
            other => panic!("unexpected {:?}", other),
        }
        match Operation::remove_field_if_default("status").invert() {
            Some(Operation::AddField { name, default, .. }) => {
                assert_eq!(name, "status");
                assert_eq!(default, Value::Null);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(Operation::custom("split name", |_| {}).invert().is_none());
    }

    #[test]
    fn custom_transform_runs_on_payloads() {
        let op = CustomTransform::new("uppercase", |payload| {
            if let Some(name) = payload.get_mut("name") {
                *name = json!(name.as_str().unwrap_or_default().to_uppercase());
            }
        });
        let mut payload = json!({ "name": "ada" });
        op.apply(&mut payload);
        assert_eq!(payload, json!({ "name": "ADA" }));
    }

    #[test]
    fn bundle_rejects_out_of_order() {
        let err = VersionBundle::new(vec![v("2024-06-01"), v("2024-01-01")]).unwrap_err();
        assert!(matches!(err, VersionError::NotAscending { .. }));

        let err = VersionBundle::new(vec![v("2024-01-01"), v("2024-01-01")]).unwrap_err();
        assert!(matches!(err, VersionError::Duplicate { .. }));
    }

    #[test]
    fn bundle_drops_trailing_head() {
        let bundle = VersionBundle::new(vec![v("2024-01-01"), Version::head()]).unwrap();
        assert_eq!(bundle.versions(), &[v("2024-01-01")]);
        let all: Vec<Version> = bundle.all_versions().collect();
        assert_eq!(all, vec![v("2024-01-01"), Version::head()]);

        let err = VersionBundle::new(vec![Version::head(), v("2024-01-01")]).unwrap_err();
        assert_eq!(
            err,
            VersionError::NotAscending {
                previous: "head".into(),
                next: "2024-01-01".into()
            }
        );
    }

    #[test]
    fn bundle_follows_declared_order() {
        let labels = VersionBundle::new(vec![v("v1"), v("v2"), v("v10")]).unwrap();
        assert_eq!(labels.position(&v("v10")), Some(2));
        assert_eq!(labels.position(&Version::head()), Some(3));

        let numbered = VersionBundle::new(vec![v("1.0"), v("1.9"), v("1.10")]).unwrap();
        assert_eq!(numbered.versions().len(), 3);

        let mut bundle = VersionBundle::new(vec![v("alpha"), v("beta"), v("2")]).unwrap();
        bundle.attach(&v("beta"), VersionChange::new("beta change")).unwrap();
        bundle.attach(&v("2"), VersionChange::new("2 change")).unwrap();
        let to_alpha: Vec<&str> = bundle
            .changes_newer_than(&v("alpha"))
            .map(|(_, c)| c.description.as_str())
            .collect();
        assert_eq!(to_alpha, vec!["2 change", "beta change"]);
    }

    #[test]
    fn find_returns_declared_spelling() {
        let bundle = VersionBundle::new(vec![v("v1.2.0"), v("2024-1-1")]).unwrap();
        assert_eq!(bundle.find("1.2.0").unwrap().to_string(), "v1.2.0");
        assert_eq!(bundle.find("2024-01-01").unwrap().to_string(), "2024-1-1");
        assert!(bundle.find("1.3.0").is_none());
        assert!(bundle.find("head").unwrap().is_head());
    }

    #[test]
    fn attach_requires_known_version() {
        let mut bundle = VersionBundle::new(vec![v("2024-01-01")]).unwrap();
        let err = bundle
            .attach(&v("2023-01-01"), VersionChange::new("nope"))
            .unwrap_err();
        assert!(matches!(err, VersionError::UnknownVersion { .. }));
    }

    #[test]
    fn changes_newer_than_walks_backward() {
        let mut bundle =
            VersionBundle::new(vec![v("2024-01-01"), v("2024-06-01"), v("2025-01-01")]).unwrap();
        bundle
            .attach(&v("2024-06-01"), VersionChange::new("drop email"))
            .unwrap();
        bundle
            .attach(&v("2025-01-01"), VersionChange::new("rename name"))
            .unwrap();

        let to_v1: Vec<&str> = bundle
            .changes_newer_than(&v("2024-01-01"))
            .map(|(_, c)| c.description.as_str())
            .collect();
        assert_eq!(to_v1, vec!["rename name", "drop email"]);

        let to_v3 = bundle.changes_newer_than(&v("2025-01-01")).count();
        assert_eq!(to_v3, 0);

        let unknown = bundle.changes_newer_than(&v("2023-01-01")).count();
        assert_eq!(unknown, 0);
    }
}
