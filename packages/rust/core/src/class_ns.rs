//! Type-filtered namespaces: every object in scope of a requested type.

use tracing::{debug, error, instrument};

use crate::expand::expand_composites;
use crate::namespace::IterableNamespace;
use crate::scope::{Registry, ScopeSpec, resolve_scope};
use crate::types::{TypeQuery, TypeRegistry};

/// Build a flat namespace of the objects in scope that match `query`.
///
/// Composite objects in scope contribute their sub-components (bound under
/// their canonical names) before filtering. If `query` names a type that
/// cannot be resolved, the error is logged and the namespace is empty.
#[instrument(skip_all)]
pub fn class_namespace(
    registry: &Registry,
    types: &TypeRegistry,
    query: impl Into<TypeQuery>,
    spec: &ScopeSpec,
) -> IterableNamespace {
    let query = query.into();
    debug!(%query, ?spec, "create class namespace");

    let mut class_space = IterableNamespace::new();
    let filter = match types.resolve_query(&query) {
        Ok(filter) => filter,
        Err(e) => {
            error!("type {query} could not be loaded");
            debug!(error = ?e, "type resolution failed");
            return class_space;
        }
    };

    let mut pool = resolve_scope(registry, spec);
    expand_composites(&mut pool);

    for (name, obj) in pool.iter() {
        if filter.matches(obj.as_ref()) {
            debug!(%name, %filter, "include in class namespace");
            class_space.insert(name, obj.clone());
        }
    }

    debug!(%filter, count = class_space.len(), "class namespace built");
    class_space
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::object::{Device, Function, ObjectRef, Signal};
    use crate::scope::Scope;
    use crate::types::TypeFilter;

    fn scope_of(items: Vec<(&str, ObjectRef)>) -> ScopeSpec {
        let scope: Scope = items.into_iter().map(|(n, o)| (n.to_string(), o)).collect();
        ScopeSpec::sources(vec![scope])
    }

    #[test]
    fn filters_by_registered_class() {
        let mut types = TypeRegistry::new();
        types.register_class("ophyd.signal.Signal");

        let x: ObjectRef = Arc::new(Signal::new("m1_x").with_class("ophyd.signal.Signal"));
        let m1: ObjectRef = Arc::new(Device::new("m1").with_component("x", x));
        let spec = scope_of(vec![("m1", m1), ("gain", Arc::new(4_i64) as ObjectRef)]);

        let ns = class_namespace(&Registry::new(), &types, "ophyd.signal.Signal", &spec);
        assert_eq!(ns.names().collect::<Vec<_>>(), vec!["m1_x"]);
    }

    #[test]
    fn accepts_resolved_filters() {
        let spec = scope_of(vec![
            ("a", Arc::new(1_i64) as ObjectRef),
            ("b", Arc::new(String::from("b")) as ObjectRef),
        ]);
        let ns = class_namespace(
            &Registry::new(),
            &TypeRegistry::new(),
            TypeFilter::of::<String>(),
            &spec,
        );
        assert_eq!(ns.names().collect::<Vec<_>>(), vec!["b"]);
    }

    #[test]
    fn unresolvable_type_gives_empty_namespace() {
        let spec = scope_of(vec![("s", Arc::new(Signal::new("s")) as ObjectRef)]);
        let ns = class_namespace(&Registry::new(), &TypeRegistry::new(), "not.a.Type", &spec);
        assert!(ns.is_empty());
    }

    #[test]
    fn functions_selected_by_marker() {
        let spec = scope_of(vec![
            ("tweak", Arc::new(Function::returning("tweak", Arc::new(()))) as ObjectRef),
            ("dev", Arc::new(Device::new("dev")) as ObjectRef),
        ]);
        let ns = class_namespace(&Registry::new(), &TypeRegistry::new(), "function", &spec);
        assert_eq!(ns.names().collect::<Vec<_>>(), vec!["tweak"]);
    }
}
