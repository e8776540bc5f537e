//! Type descriptions consumed by the type parser.
//!
//! Rust types are described by an explicit graph of [`TypeDef`] nodes. Native
//! types describe themselves through [`Reflect`]; structs register their key
//! before describing their fields so self- and mutually-referential types
//! terminate.
//!
//! ```
//! use versioned_openapi::{FieldDef, Reflect, TypeGraph, TypeKey};
//!
//! struct Node {
//!     _children: Vec<Node>,
//! }
//!
//! impl Reflect for Node {
//!     fn reflect(graph: &mut TypeGraph) -> TypeKey {
//!         graph.reflect_struct::<Self>("Node", |g| {
//!             vec![FieldDef::new("Children", g.of::<Vec<Node>>()).tag("json", "children")]
//!         })
//!     }
//! }
//!
//! let mut graph = TypeGraph::new();
//! let node = graph.of::<Node>();
//! assert_eq!(graph.type_name(node), "Node");
//! ```

use std::any::TypeId;
use std::collections::{BTreeMap, HashMap};

/// Index of a type in a [`TypeGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeKey(usize);

/// The closed set of type kinds the parser understands.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeDef {
    Bool,
    Int { bits: u8, signed: bool },
    Float { bits: u8 },
    String,
    /// A point in time, rendered as a `date-time` string.
    Timestamp,
    /// Any value at all.
    Any,
    /// Transparent indirection (`Option`, `Box`).
    Pointer(TypeKey),
    Slice(TypeKey),
    Array { elem: TypeKey, len: usize },
    Map { key: TypeKey, value: TypeKey },
    Struct(StructDef),
    /// A kind with no schema representation (functions, channels, ...).
    Unsupported(String),
}

/// A struct: named, or anonymous when `name` is `None`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StructDef {
    pub name: Option<String>,
    pub fields: Vec<FieldDef>,
}

/// One declared struct field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDef {
    /// Field identifier as declared.
    pub ident: String,
    pub ty: TypeKey,
    /// Unexported fields never appear in schemas.
    pub exported: bool,
    /// Embedded fields have their properties promoted into the parent.
    pub embedded: bool,
    pub tags: FieldTags,
}

impl FieldDef {
    pub fn new(ident: impl Into<String>, ty: TypeKey) -> Self {
        Self {
            ident: ident.into(),
            ty,
            exported: true,
            embedded: false,
            tags: FieldTags::default(),
        }
    }

    /// Embedded field of the given type.
    pub fn embedded(ident: impl Into<String>, ty: TypeKey) -> Self {
        Self {
            embedded: true,
            ..Self::new(ident, ty)
        }
    }

    /// Mark the field as not serializable.
    pub fn unexported(mut self) -> Self {
        self.exported = false;
        self
    }

    /// Attach an annotation.
    pub fn tag(mut self, key: &str, value: &str) -> Self {
        self.tags.insert(key, value);
        self
    }
}

/// Field annotations keyed by tag name (`json`, `validate`, `example`, ...).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldTags(BTreeMap<String, String>);

impl FieldTags {
    pub fn insert(&mut self, key: &str, value: &str) {
        self.0.insert(key.to_string(), value.to_string());
    }

    /// Tag value, or `None` when the tag is absent.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Tag value, or the empty string when the tag is absent.
    pub fn lookup(&self, key: &str) -> &str {
        self.get(key).unwrap_or("")
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for FieldTags {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// Arena of type definitions.
#[derive(Debug, Default)]
pub struct TypeGraph {
    defs: Vec<TypeDef>,
    by_rust: HashMap<TypeId, TypeKey>,
    by_name: HashMap<String, TypeKey>,
}

impl TypeGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a definition and return its key.
    pub fn add(&mut self, def: TypeDef) -> TypeKey {
        let key = TypeKey(self.defs.len());
        if let TypeDef::Struct(StructDef {
            name: Some(name), ..
        }) = &def
        {
            self.by_name.entry(name.clone()).or_insert(key);
        }
        self.defs.push(def);
        key
    }

    /// Look up a definition.
    ///
    /// # Panics
    ///
    /// Panics if `key` came from a different graph.
    pub fn get(&self, key: TypeKey) -> &TypeDef {
        &self.defs[key.0]
    }

    /// Key of a named struct.
    pub fn named(&self, name: &str) -> Option<TypeKey> {
        self.by_name.get(name).copied()
    }

    /// Reserve a named struct whose fields are supplied later.
    ///
    /// Returns the existing key when the name is already declared.
    pub fn declare_struct(&mut self, name: &str) -> TypeKey {
        if let Some(key) = self.named(name) {
            return key;
        }
        self.add(TypeDef::Struct(StructDef {
            name: Some(name.to_string()),
            fields: Vec::new(),
        }))
    }

    /// Set the fields of a previously declared struct.
    pub fn define_struct(&mut self, key: TypeKey, fields: Vec<FieldDef>) {
        if let TypeDef::Struct(def) = &mut self.defs[key.0] {
            def.fields = fields;
        }
    }

    /// Add an anonymous struct.
    pub fn anonymous_struct(&mut self, fields: Vec<FieldDef>) -> TypeKey {
        self.add(TypeDef::Struct(StructDef { name: None, fields }))
    }

    /// Key of a native Rust type, describing it on first use.
    pub fn of<T: Reflect + ?Sized + 'static>(&mut self) -> TypeKey {
        let id = TypeId::of::<T>();
        if let Some(key) = self.by_rust.get(&id) {
            return *key;
        }
        let key = T::reflect(self);
        self.by_rust.insert(id, key);
        key
    }

    /// Describe a Rust struct, registering it before its fields.
    ///
    /// Field types that lead back to `T` resolve to the key being built.
    pub fn reflect_struct<T: 'static>(
        &mut self,
        name: &str,
        fields: impl FnOnce(&mut TypeGraph) -> Vec<FieldDef>,
    ) -> TypeKey {
        let id = TypeId::of::<T>();
        if let Some(key) = self.by_rust.get(&id) {
            return *key;
        }
        let key = self.declare_struct(name);
        self.by_rust.insert(id, key);
        let fields = fields(self);
        self.define_struct(key, fields);
        key
    }

    /// Follow pointer indirection to the pointee.
    pub fn deref(&self, mut key: TypeKey) -> TypeKey {
        // Bounded so a malformed pointer cycle cannot spin forever
        for _ in 0..=self.defs.len() {
            match self.get(key) {
                TypeDef::Pointer(inner) => key = *inner,
                _ => break,
            }
        }
        key
    }

    /// The struct definition behind a key, if it is a struct.
    pub fn struct_def(&self, key: TypeKey) -> Option<&StructDef> {
        match self.get(self.deref(key)) {
            TypeDef::Struct(def) => Some(def),
            _ => None,
        }
    }

    /// Display name of a type.
    ///
    /// Named structs use their name; composite types use a Rust-like spelling.
    pub fn type_name(&self, key: TypeKey) -> String {
        match self.get(key) {
            TypeDef::Bool => "bool".to_string(),
            TypeDef::Int { bits, signed } => {
                format!("{}{}", if *signed { "i" } else { "u" }, bits)
            }
            TypeDef::Float { bits } => format!("f{}", bits),
            TypeDef::String => "String".to_string(),
            TypeDef::Timestamp => "DateTime".to_string(),
            TypeDef::Any => "Value".to_string(),
            TypeDef::Pointer(inner) => format!("Option<{}>", self.type_name(*inner)),
            TypeDef::Slice(elem) => format!("Vec<{}>", self.type_name(*elem)),
            TypeDef::Array { elem, len } => format!("[{}; {}]", self.type_name(*elem), len),
            TypeDef::Map { key, value } => format!(
                "HashMap<{}, {}>",
                self.type_name(*key),
                self.type_name(*value)
            ),
            TypeDef::Struct(StructDef {
                name: Some(name), ..
            }) => name.clone(),
            TypeDef::Struct(StructDef { name: None, .. }) => "struct { .. }".to_string(),
            TypeDef::Unsupported(kind) => kind.clone(),
        }
    }
}

/// Types that can describe themselves into a [`TypeGraph`].
pub trait Reflect {
    fn reflect(graph: &mut TypeGraph) -> TypeKey;
}

macro_rules! reflect_int {
    ($($ty:ty => $bits:expr, $signed:expr;)*) => {
        $(
            impl Reflect for $ty {
                fn reflect(graph: &mut TypeGraph) -> TypeKey {
                    graph.add(TypeDef::Int { bits: $bits, signed: $signed })
                }
            }
        )*
    };
}

reflect_int! {
    i8 => 8, true;
    i16 => 16, true;
    i32 => 32, true;
    i64 => 64, true;
    isize => 64, true;
    u8 => 8, false;
    u16 => 16, false;
    u32 => 32, false;
    u64 => 64, false;
    usize => 64, false;
}

impl Reflect for bool {
    fn reflect(graph: &mut TypeGraph) -> TypeKey {
        graph.add(TypeDef::Bool)
    }
}

impl Reflect for f32 {
    fn reflect(graph: &mut TypeGraph) -> TypeKey {
        graph.add(TypeDef::Float { bits: 32 })
    }
}

impl Reflect for f64 {
    fn reflect(graph: &mut TypeGraph) -> TypeKey {
        graph.add(TypeDef::Float { bits: 64 })
    }
}

impl Reflect for String {
    fn reflect(graph: &mut TypeGraph) -> TypeKey {
        graph.add(TypeDef::String)
    }
}

impl<Tz: chrono::TimeZone + 'static> Reflect for chrono::DateTime<Tz> {
    fn reflect(graph: &mut TypeGraph) -> TypeKey {
        graph.add(TypeDef::Timestamp)
    }
}

impl Reflect for serde_json::Value {
    fn reflect(graph: &mut TypeGraph) -> TypeKey {
        graph.add(TypeDef::Any)
    }
}

impl<T: Reflect + 'static> Reflect for Option<T> {
    fn reflect(graph: &mut TypeGraph) -> TypeKey {
        let inner = graph.of::<T>();
        graph.add(TypeDef::Pointer(inner))
    }
}

impl<T: Reflect + 'static> Reflect for Box<T> {
    fn reflect(graph: &mut TypeGraph) -> TypeKey {
        let inner = graph.of::<T>();
        graph.add(TypeDef::Pointer(inner))
    }
}

impl<T: Reflect + 'static> Reflect for Vec<T> {
    fn reflect(graph: &mut TypeGraph) -> TypeKey {
        let elem = graph.of::<T>();
        graph.add(TypeDef::Slice(elem))
    }
}

impl<T: Reflect + 'static, const N: usize> Reflect for [T; N] {
    fn reflect(graph: &mut TypeGraph) -> TypeKey {
        let elem = graph.of::<T>();
        graph.add(TypeDef::Array { elem, len: N })
    }
}

impl<K: Reflect + 'static, V: Reflect + 'static, S: 'static> Reflect
    for std::collections::HashMap<K, V, S>
{
    fn reflect(graph: &mut TypeGraph) -> TypeKey {
        let key = graph.of::<K>();
        let value = graph.of::<V>();
        graph.add(TypeDef::Map { key, value })
    }
}

impl<K: Reflect + 'static, V: Reflect + 'static> Reflect for BTreeMap<K, V> {
    fn reflect(graph: &mut TypeGraph) -> TypeKey {
        let key = graph.of::<K>();
        let value = graph.of::<V>();
        graph.add(TypeDef::Map { key, value })
    }
}
