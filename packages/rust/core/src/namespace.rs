//! `IterableNamespace`: an ordered name → entry store with attribute-style
//! lookup and in-order iteration over the same bindings.

use std::collections::HashMap;
use std::fmt;

use serde_json::{Map, Value};

use crate::object::ObjectRef;

// ---------------------------------------------------------------------------
// Bindings
// ---------------------------------------------------------------------------

/// Insertion-ordered map. Rebinding a name replaces the value in place.
#[derive(Clone)]
pub(crate) struct Bindings<V> {
    entries: Vec<(String, V)>,
    index: HashMap<String, usize>,
}

impl<V> Default for Bindings<V> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            index: HashMap::new(),
        }
    }
}

impl<V> Bindings<V> {
    pub(crate) fn insert(&mut self, name: String, value: V) -> Option<V> {
        match self.index.get(&name) {
            Some(&i) => Some(std::mem::replace(&mut self.entries[i].1, value)),
            None => {
                self.index.insert(name.clone(), self.entries.len());
                self.entries.push((name, value));
                None
            }
        }
    }

    pub(crate) fn get(&self, name: &str) -> Option<&V> {
        self.index.get(name).map(|&i| &self.entries[i].1)
    }

    pub(crate) fn get_mut(&mut self, name: &str) -> Option<&mut V> {
        self.index.get(name).map(|&i| &mut self.entries[i].1)
    }

    pub(crate) fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (&str, &V)> {
        self.entries.iter().map(|(name, v)| (name.as_str(), v))
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

// ---------------------------------------------------------------------------
// Entry
// ---------------------------------------------------------------------------

/// A namespace attribute: an object leaf or a nested namespace.
#[derive(Debug, Clone)]
pub enum Entry {
    Object(ObjectRef),
    Namespace(IterableNamespace),
}

impl Entry {
    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Entry::Object(obj) => Some(obj),
            Entry::Namespace(_) => None,
        }
    }

    pub fn as_namespace(&self) -> Option<&IterableNamespace> {
        match self {
            Entry::Namespace(ns) => Some(ns),
            Entry::Object(_) => None,
        }
    }

    pub fn as_namespace_mut(&mut self) -> Option<&mut IterableNamespace> {
        match self {
            Entry::Namespace(ns) => Some(ns),
            Entry::Object(_) => None,
        }
    }
}

impl From<ObjectRef> for Entry {
    fn from(obj: ObjectRef) -> Self {
        Entry::Object(obj)
    }
}

impl From<IterableNamespace> for Entry {
    fn from(ns: IterableNamespace) -> Self {
        Entry::Namespace(ns)
    }
}

// ---------------------------------------------------------------------------
// IterableNamespace
// ---------------------------------------------------------------------------

/// Attribute-accessible container that also iterates its values in the
/// order they were first bound.
///
/// Lookup and iteration share one store, so they always observe the same
/// bindings.
#[derive(Clone, Default)]
pub struct IterableNamespace {
    bindings: Bindings<Entry>,
}

impl IterableNamespace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `name`, returning the entry it replaced.
    pub fn insert(&mut self, name: impl Into<String>, entry: impl Into<Entry>) -> Option<Entry> {
        self.bindings.insert(name.into(), entry.into())
    }

    pub fn get(&self, name: &str) -> Option<&Entry> {
        self.bindings.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Entry> {
        self.bindings.get_mut(name)
    }

    /// The object bound at `name`, if that entry is a leaf.
    pub fn object(&self, name: &str) -> Option<&ObjectRef> {
        self.get(name).and_then(Entry::as_object)
    }

    /// The namespace bound at `name`, if that entry is a branch.
    pub fn namespace(&self, name: &str) -> Option<&IterableNamespace> {
        self.get(name).and_then(Entry::as_namespace)
    }

    /// The branch at `name`, created empty if unbound.
    ///
    /// Returns `None` when `name` is already bound to an object.
    pub fn branch(&mut self, name: &str) -> Option<&mut IterableNamespace> {
        if !self.contains(name) {
            self.insert(name, IterableNamespace::new());
        }
        self.get_mut(name).and_then(Entry::as_namespace_mut)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.bindings.contains(name)
    }

    /// Walk nested namespaces along `path`.
    pub fn lookup(&self, path: &[&str]) -> Option<&Entry> {
        let (last, parents) = path.split_last()?;
        let mut node = self;
        for name in parents {
            node = node.namespace(name)?;
        }
        node.get(last)
    }

    /// `(name, entry)` pairs in binding order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Entry)> {
        self.bindings.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.iter().map(|(name, _)| name)
    }

    pub fn values(&self) -> impl Iterator<Item = &Entry> {
        self.iter().map(|(_, entry)| entry)
    }

    /// Leaf objects bound directly in this namespace.
    pub fn objects(&self) -> impl Iterator<Item = (&str, &ObjectRef)> {
        self.iter()
            .filter_map(|(name, entry)| entry.as_object().map(|obj| (name, obj)))
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of objects in this namespace and all nested ones.
    pub fn leaf_count(&self) -> usize {
        self.values()
            .map(|entry| match entry {
                Entry::Object(_) => 1,
                Entry::Namespace(ns) => ns.leaf_count(),
            })
            .sum()
    }

    /// JSON view: branches become objects, leaves become their label.
    pub fn to_json(&self) -> Value {
        let mut map = Map::new();
        for (name, entry) in self.iter() {
            let value = match entry {
                Entry::Object(obj) => Value::String(label(obj)),
                Entry::Namespace(ns) => ns.to_json(),
            };
            map.insert(name.to_string(), value);
        }
        Value::Object(map)
    }

    fn fmt_tree(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        for (name, entry) in self.iter() {
            let indent = "  ".repeat(depth);
            match entry {
                Entry::Object(obj) => writeln!(f, "{indent}{name}: {}", label(obj))?,
                Entry::Namespace(ns) => {
                    writeln!(f, "{indent}{name}/")?;
                    ns.fmt_tree(f, depth + 1)?;
                }
            }
        }
        Ok(())
    }
}

/// Short human label: canonical name if any, else the debug form.
fn label(obj: &ObjectRef) -> String {
    match obj.name() {
        Some(name) => name.to_string(),
        None => format!("{obj:?}"),
    }
}

impl fmt::Display for IterableNamespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_tree(f, 0)
    }
}

impl fmt::Debug for IterableNamespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<'a> IntoIterator for &'a IterableNamespace {
    type Item = &'a Entry;
    type IntoIter = Box<dyn Iterator<Item = &'a Entry> + 'a>;

    fn into_iter(self) -> Self::IntoIter {
        Box::new(self.values())
    }
}
