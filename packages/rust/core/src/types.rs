//! Type lookup for type-filtered namespaces.
//!
//! Type names are resolved against a closed table: a handful of short
//! built-in names, the `function` marker, and dotted paths registered up
//! front. Input is only ever looked up, never evaluated.

use std::any::{TypeId, type_name};
use std::collections::BTreeMap;
use std::fmt;

use hutchns_shared::{NamespaceError, Result};

use crate::object::Object;

/// Name that selects free functions rather than a concrete type.
pub const FUNCTION_MARKER: &str = "function";

/// A membership test for the type-filtered builder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeFilter {
    /// Plain free functions only.
    Function,
    /// Every object.
    Any,
    /// Exactly one Rust type.
    Rust { type_id: TypeId, name: &'static str },
    /// Objects whose class chain contains this dotted path.
    Class(String),
}

impl TypeFilter {
    /// Filter on the concrete Rust type `T`.
    pub fn of<T: Object>() -> Self {
        TypeFilter::Rust {
            type_id: TypeId::of::<T>(),
            name: type_name::<T>(),
        }
    }

    pub fn matches(&self, obj: &dyn Object) -> bool {
        match self {
            TypeFilter::Function => obj.is_plain_function(),
            TypeFilter::Any => true,
            TypeFilter::Rust { type_id, .. } => obj.as_any().type_id() == *type_id,
            TypeFilter::Class(path) => obj.is_instance_of(path),
        }
    }
}

impl fmt::Display for TypeFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeFilter::Function => f.write_str(FUNCTION_MARKER),
            TypeFilter::Any => f.write_str("object"),
            TypeFilter::Rust { name, .. } => f.write_str(name),
            TypeFilter::Class(path) => f.write_str(path),
        }
    }
}

/// What the caller asked to filter on.
#[derive(Debug, Clone)]
pub enum TypeQuery {
    /// Short name, dotted path, or [`FUNCTION_MARKER`].
    Name(String),
    /// An already-resolved filter.
    Filter(TypeFilter),
}

impl From<&str> for TypeQuery {
    fn from(name: &str) -> Self {
        TypeQuery::Name(name.to_string())
    }
}

impl From<String> for TypeQuery {
    fn from(name: String) -> Self {
        TypeQuery::Name(name)
    }
}

impl From<TypeFilter> for TypeQuery {
    fn from(filter: TypeFilter) -> Self {
        TypeQuery::Filter(filter)
    }
}

impl fmt::Display for TypeQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeQuery::Name(name) => f.write_str(name),
            TypeQuery::Filter(filter) => filter.fmt(f),
        }
    }
}

/// Closed registry of resolvable type names.
#[derive(Debug, Clone)]
pub struct TypeRegistry {
    builtins: BTreeMap<&'static str, TypeFilter>,
    paths: BTreeMap<String, TypeFilter>,
}

impl Default for TypeRegistry {
    fn default() -> Self {
        let builtins = BTreeMap::from([
            ("object", TypeFilter::Any),
            ("str", TypeFilter::of::<String>()),
            ("int", TypeFilter::of::<i64>()),
            ("float", TypeFilter::of::<f64>()),
            ("bool", TypeFilter::of::<bool>()),
        ]);
        Self {
            builtins,
            paths: BTreeMap::new(),
        }
    }
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the Rust type `T` resolvable as `path`.
    pub fn register<T: Object>(&mut self, path: impl Into<String>) {
        self.paths.insert(path.into(), TypeFilter::of::<T>());
    }

    /// Make `path` resolvable as a class-chain test.
    pub fn register_class(&mut self, path: impl Into<String>) {
        let path = path.into();
        self.paths
            .entry(path.clone())
            .or_insert(TypeFilter::Class(path));
    }

    pub fn registered_paths(&self) -> impl Iterator<Item = &str> {
        self.paths.keys().map(String::as_str)
    }

    /// Resolve a short name, dotted path, or the function marker.
    pub fn resolve(&self, name: &str) -> Result<TypeFilter> {
        let name = name.trim();
        if name == FUNCTION_MARKER {
            return Ok(TypeFilter::Function);
        }
        let found = if name.contains('.') {
            self.paths.get(name)
        } else {
            self.builtins.get(name)
        };
        found
            .cloned()
            .ok_or_else(|| NamespaceError::type_not_found(name))
    }

    /// Resolve a query, passing filters through.
    pub fn resolve_query(&self, query: &TypeQuery) -> Result<TypeFilter> {
        match query {
            TypeQuery::Name(name) => self.resolve(name),
            TypeQuery::Filter(filter) => Ok(filter.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::object::{Device, Function, ObjectRef, Signal};

    #[test]
    fn builtins_resolve_by_short_name() {
        let types = TypeRegistry::new();
        let int = types.resolve("int").unwrap();
        assert!(int.matches(&5_i64));
        assert!(!int.matches(&5.0_f64));
        assert!(types.resolve("str").unwrap().matches(&String::from("x")));
        assert!(types.resolve("object").unwrap().matches(&Signal::new("s")));
    }

    #[test]
    fn function_marker_matches_only_functions() {
        let filter = TypeRegistry::new().resolve("function").unwrap();
        let f: ObjectRef = Arc::new(Function::returning("f", Arc::new(())));
        assert!(filter.matches(f.as_ref()));
        assert!(!filter.matches(&Device::new("d")));
    }

    #[test]
    fn dotted_paths_need_registration() {
        let mut types = TypeRegistry::new();
        assert!(types.resolve("ophyd.device.Device").is_err());

        types.register_class("ophyd.device.Device");
        types.register::<Signal>("ophyd.signal.Signal");

        let dev = Device::new("d").with_class("ophyd.device.Device");
        assert!(types.resolve("ophyd.device.Device").unwrap().matches(&dev));
        assert!(types.resolve("ophyd.signal.Signal").unwrap().matches(&Signal::new("s")));
        assert!(!types.resolve("ophyd.signal.Signal").unwrap().matches(&dev));
    }

    #[test]
    fn unknown_names_are_not_evaluated() {
        let types = TypeRegistry::new();
        let err = types.resolve("__import__('os')").unwrap_err();
        assert!(matches!(err, NamespaceError::TypeNotFound { .. }));
        assert!(types.resolve("Device").is_err());
    }

    #[test]
    fn register_class_keeps_rust_registration() {
        let mut types = TypeRegistry::new();
        types.register::<Device>("hutch.Device");
        types.register_class("hutch.Device");
        assert_eq!(types.resolve("hutch.Device").unwrap(), TypeFilter::of::<Device>());
    }

    #[test]
    fn registered_paths_are_sorted() {
        let mut types = TypeRegistry::new();
        assert_eq!(types.registered_paths().count(), 0);
        types.register_class("ophyd.signal.Signal");
        types.register::<Device>("hutch.Device");
        assert_eq!(
            types.registered_paths().collect::<Vec<_>>(),
            vec!["hutch.Device", "ophyd.signal.Signal"]
        );
    }
}
