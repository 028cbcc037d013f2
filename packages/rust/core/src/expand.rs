//! Composite expansion: bind every reachable sub-component into the pool
//! under its canonical name.

use std::collections::HashSet;

use tracing::{debug, trace};

use crate::object::{ObjectRef, object_id};
use crate::scope::Scope;

/// Recursively add the sub-components of every composite in `pool`.
///
/// Children are visited depth-first and bound after their own descendants.
/// An identity cache makes each object visited at most once, so cyclic
/// graphs terminate. Existing bindings are never replaced, and objects that
/// are already bound at the top level are not bound a second time.
pub fn expand_composites(pool: &mut Scope) {
    let mut cache: HashSet<usize> = pool.iter().map(|(_, obj)| object_id(obj)).collect();
    let mut roots_seen = HashSet::new();

    let roots: Vec<ObjectRef> = pool
        .iter()
        .filter(|(_, obj)| obj.as_composite().is_some())
        .map(|(_, obj)| obj.clone())
        .collect();

    let before = pool.len();
    for root in roots {
        if roots_seen.insert(object_id(&root)) {
            accumulate(&root, pool, &mut cache);
        }
    }
    debug!(added = pool.len() - before, "expanded composite objects");
}

fn accumulate(obj: &ObjectRef, pool: &mut Scope, cache: &mut HashSet<usize>) {
    let Some(composite) = obj.as_composite() else {
        return;
    };

    for (attr, child) in composite.components() {
        if !cache.insert(object_id(&child)) {
            continue;
        }
        accumulate(&child, pool, cache);

        match child.name() {
            Some(name) if !pool.contains(name) => {
                trace!(%attr, %name, "binding sub-component");
                pool.insert(name, child.clone());
            }
            Some(_) => {}
            None => trace!(%attr, "sub-component has no canonical name"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::object::{Device, Signal};

    fn names(scope: &Scope) -> Vec<&str> {
        scope.names().collect()
    }

    #[test]
    fn nested_components_bound_depth_first() {
        let inner = Device::new("ipm_diode").with_component("x", Arc::new(Signal::new("ipm_diode_x")));
        let ipm: ObjectRef = Arc::new(Device::new("ipm").with_component("diode", Arc::new(inner)));

        let mut pool = Scope::new();
        pool.insert("ipm", ipm);
        expand_composites(&mut pool);

        assert_eq!(names(&pool), vec!["ipm", "ipm_diode_x", "ipm_diode"]);
    }

    #[test]
    fn cycles_terminate_with_single_bindings() {
        let a: ObjectRef = Arc::new(Device::new("a"));
        let b = Arc::new(Device::new("b"));
        b.add_back_reference("parent", &a);
        let b: ObjectRef = b;
        a.as_any()
            .downcast_ref::<Device>()
            .unwrap()
            .add_component("child", b.clone());

        let mut pool = Scope::new();
        pool.insert("a", a.clone());
        expand_composites(&mut pool);

        assert_eq!(names(&pool), vec!["a", "b"]);
        assert_eq!(object_id(pool.get("b").unwrap()), object_id(&b));
    }

    #[test]
    fn existing_bindings_are_never_replaced() {
        let original: ObjectRef = Arc::new(Signal::new("motor_x"));
        let dev: ObjectRef = Arc::new(
            Device::new("motor").with_component("x", Arc::new(Signal::new("motor_x"))),
        );

        let mut pool = Scope::new();
        pool.insert("motor_x", original.clone());
        pool.insert("motor", dev);
        expand_composites(&mut pool);

        assert_eq!(pool.len(), 2);
        assert_eq!(object_id(pool.get("motor_x").unwrap()), object_id(&original));
    }

    #[test]
    fn shared_children_bound_once() {
        let shared: ObjectRef = Arc::new(Signal::new("shared_sig"));
        let d1: ObjectRef = Arc::new(Device::new("d1").with_component("s", shared.clone()));
        let d2: ObjectRef = Arc::new(Device::new("d2").with_component("s", shared.clone()));

        let mut pool = Scope::new();
        pool.insert("d1", d1);
        pool.insert("d2", d2);
        pool.insert("alias", shared);
        expand_composites(&mut pool);

        // Already reachable as `alias`, so not bound again as `shared_sig`.
        assert_eq!(names(&pool), vec!["d1", "d2", "alias"]);
    }

    #[test]
    fn top_level_composite_children_still_expanded() {
        let leaf: ObjectRef = Arc::new(Signal::new("child_leaf"));
        let child: ObjectRef = Arc::new(Device::new("child").with_component("leaf", leaf));
        let parent: ObjectRef = Arc::new(Device::new("parent").with_component("child", child.clone()));

        let mut pool = Scope::new();
        pool.insert("parent", parent);
        pool.insert("child", child);
        expand_composites(&mut pool);

        assert_eq!(names(&pool), vec!["parent", "child", "child_leaf"]);
    }
}
