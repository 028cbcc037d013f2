//! Namespace construction for a pool of runtime-discovered objects.
//!
//! Two builders share one input, a [`Scope`] resolved from a [`Registry`]:
//! - [`class_namespace`]: a flat namespace of every object of one type,
//!   with composite objects expanded into their sub-components
//! - [`metadata_namespace`]: a tree of namespaces keyed by metadata fields
//!   or underscore-delimited name segments

pub mod class_ns;
pub mod db;
pub mod expand;
pub mod metadata_ns;
pub mod namespace;
pub mod object;
pub mod scope;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use class_ns::class_namespace;
pub use db::ObjectDb;
pub use expand::expand_composites;
pub use metadata_ns::{Key, metadata_namespace};
pub use namespace::{Entry, IterableNamespace};
pub use object::{Composite, Device, Function, Metadata, Object, ObjectRef, Signal, object_id};
pub use scope::{Module, Registry, Scope, ScopeSource, ScopeSpec, resolve_scope};
pub use types::{FUNCTION_MARKER, TypeFilter, TypeQuery, TypeRegistry};
