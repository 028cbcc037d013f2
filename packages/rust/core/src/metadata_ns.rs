//! Metadata trees: group objects into nested namespaces keyed by metadata
//! fields, or by underscore-delimited name segments when an object carries
//! no metadata.

use std::fmt;

use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::namespace::{Entry, IterableNamespace};
use crate::object::ObjectRef;
use crate::scope::{Registry, ScopeSpec, resolve_scope};

/// Separator for name-derived keys.
pub const SEPARATOR: char = '_';

/// One normalized classification key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Key {
    /// A string value, lowercased.
    Text(String),
    /// Any other value, rendered but otherwise unchanged.
    Other(String),
}

impl Key {
    /// Lowercase a textual key.
    pub fn text(s: &str) -> Self {
        Key::Text(s.to_lowercase())
    }

    /// Normalize a metadata value. `null` means "no key".
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::String(s) => Some(Key::text(s)),
            other => Some(Key::Other(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Key::Text(s) | Key::Other(s) => s,
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Derive the key path for one object.
///
/// Returns the keys (with `None` where a field is absent) and whether they
/// came from splitting the name. `None` overall means the object cannot be
/// classified.
pub fn key_path<S: AsRef<str>>(
    name: &str,
    obj: &ObjectRef,
    fields: &[S],
) -> Option<(Vec<Option<Key>>, bool)> {
    let (keys, from_name) = match obj.metadata() {
        Some(md) => {
            let keys = fields
                .iter()
                .map(|field| md.get(field.as_ref()).and_then(Key::from_value))
                .collect::<Vec<_>>();
            (keys, false)
        }
        None => {
            if !name.contains(SEPARATOR) {
                return None;
            }
            let keys = name
                .split(SEPARATOR)
                .take(fields.len())
                .map(|segment| Some(Key::text(segment)))
                .collect::<Vec<_>>();
            (keys, true)
        }
    };

    match keys.first() {
        Some(Some(_)) => Some((keys, from_name)),
        _ => None,
    }
}

/// Remove `prefix` and the separator after it from the front of `name`.
///
/// The first segment of `name` is compared to `prefix` after lowercasing
/// both. If it does not match, or nothing would remain, `name` is returned
/// as is.
pub fn strip_prefix(name: &str, prefix: &str) -> String {
    let prefix = prefix.to_lowercase();
    match name.split_once(SEPARATOR) {
        Some((head, rest)) if !rest.is_empty() && head.to_lowercase() == prefix => {
            rest.to_string()
        }
        _ => name.to_string(),
    }
}

/// Build a tree of namespaces from the objects in scope.
///
/// `fields` names the metadata field for each level, root to leaf. Objects
/// without metadata are keyed by the first `fields.len()` segments of their
/// bound name instead, and are bound under what remains of that name. A
/// missing field ends the path early at that level.
///
/// Objects with identical full paths overwrite each other; the last one wins.
#[instrument(skip_all, fields(depth = fields.len()))]
pub fn metadata_namespace<S: AsRef<str>>(
    registry: &Registry,
    fields: &[S],
    spec: &ScopeSpec,
) -> IterableNamespace {
    debug!(?spec, "create metadata namespace");
    let mut metadata_space = IterableNamespace::new();

    if fields.is_empty() {
        warn!("no metadata fields given, nothing to classify");
        return metadata_space;
    }

    let scope = resolve_scope(registry, spec);
    for (name, obj) in scope.iter() {
        let Some((keys, from_name)) = key_path(name, obj, fields) else {
            continue;
        };
        debug!(%name, "add to metadata namespace");
        insert_at_path(&mut metadata_space, name, obj, &keys, from_name);
    }

    debug!(count = metadata_space.leaf_count(), "metadata namespace built");
    metadata_space
}

fn insert_at_path(
    root: &mut IterableNamespace,
    name: &str,
    obj: &ObjectRef,
    keys: &[Option<Key>],
    from_name: bool,
) {
    let mut leaf = name.to_string();
    let mut node = root;

    for key in keys.iter().map_while(Option::as_ref) {
        if from_name {
            leaf = strip_prefix(&leaf, key.as_str());
        }
        node = match node.branch(key.as_str()) {
            Some(branch) => branch,
            None => {
                warn!(%name, %key, "key already bound to an object, skipping");
                return;
            }
        };
    }

    let is_branch = node.get(&leaf).map(|entry| matches!(entry, Entry::Namespace(_)));
    match is_branch {
        Some(true) => {
            warn!(%name, %leaf, "leaf name already bound to a namespace, skipping");
        }
        Some(false) => {
            warn!(%name, %leaf, "key path collision, replacing previous object");
            node.insert(leaf, obj.clone());
        }
        None => {
            node.insert(leaf, obj.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::object::{Device, Metadata, Signal};
    use crate::scope::Scope;

    fn scope_of(items: Vec<(&str, ObjectRef)>) -> ScopeSpec {
        let scope: Scope = items.into_iter().map(|(n, o)| (n.to_string(), o)).collect();
        ScopeSpec::sources(vec![scope])
    }

    fn md(value: Value) -> Metadata {
        match value {
            Value::Object(map) => map,
            _ => panic!("metadata must be an object"),
        }
    }

    #[test]
    fn keys_from_metadata_are_lowercased() {
        let dev: ObjectRef = Arc::new(
            Device::new("x").with_metadata(md(json!({"beamline": "MFX", "z": 3.5}))),
        );
        let (keys, from_name) = key_path("x", &dev, &["beamline", "z", "missing"]).unwrap();
        assert!(!from_name);
        assert_eq!(
            keys,
            vec![Some(Key::text("mfx")), Some(Key::Other("3.5".into())), None]
        );
    }

    #[test]
    fn keys_from_name_split() {
        let sig: ObjectRef = Arc::new(Signal::new("whatever"));
        let (keys, from_name) = key_path("TST_Det_1", &sig, &["a", "b"]).unwrap();
        assert!(from_name);
        assert_eq!(keys, vec![Some(Key::text("tst")), Some(Key::text("det"))]);

        assert!(key_path("nounderscore", &sig, &["a"]).is_none());
    }

    #[test]
    fn null_first_key_is_unclassified() {
        let dev: ObjectRef =
            Arc::new(Device::new("x").with_metadata(md(json!({"beamline": null}))));
        assert!(key_path("x", &dev, &["beamline"]).is_none());
        assert!(key_path("x", &dev, &["hutch"]).is_none());
    }

    #[test]
    fn strip_prefix_cases() {
        assert_eq!(strip_prefix("tst_det_1", "tst"), "det_1");
        assert_eq!(strip_prefix("TST_det_1", "tst"), "det_1");
        assert_eq!(strip_prefix("det_1", "tst"), "det_1");
        assert_eq!(strip_prefix("tstdet_1", "tst"), "tstdet_1");
        assert_eq!(strip_prefix("tst", "tst"), "tst");
        assert_eq!(strip_prefix("tst_", "tst"), "tst_");
        assert_eq!(strip_prefix("é_x", "e"), "é_x");
        assert_eq!(strip_prefix("Ärm_x", "ärm"), "x");
        assert_eq!(strip_prefix("ÄRM_Det_1", &Key::text("ÄRM").to_string()), "Det_1");
    }

    #[test]
    fn non_ascii_name_segments_are_stripped() {
        let sig: ObjectRef = Arc::new(Signal::new("a"));
        let ns = metadata_namespace(&Registry::new(), &["a"], &scope_of(vec![("Ärm_x", sig)]));
        assert!(ns.lookup(&["ärm", "x"]).is_some());
        assert!(ns.lookup(&["ärm", "Ärm_x"]).is_none());
    }

    #[test]
    fn empty_field_list_classifies_nothing() {
        let with_md: ObjectRef =
            Arc::new(Device::new("d").with_metadata(md(json!({"beamline": "MFX"}))));
        let spec = scope_of(vec![
            ("tst_det_1", Arc::new(Signal::new("s")) as ObjectRef),
            ("mfx_d", with_md),
        ]);
        let ns = metadata_namespace(&Registry::new(), &[] as &[&str], &spec);
        assert!(ns.is_empty());
    }

    #[test]
    fn leaf_name_matching_a_branch_is_skipped() {
        let pim: ObjectRef = Arc::new(Signal::new("pim"));
        let stand: ObjectRef =
            Arc::new(Device::new("sb2").with_metadata(md(json!({"a": "XPP", "b": null}))));
        let spec = scope_of(vec![("xpp_sb2_pim", pim.clone()), ("sb2", stand)]);

        let ns = metadata_namespace(&Registry::new(), &["a", "b"], &spec);
        let xpp = ns.namespace("xpp").unwrap();
        assert_eq!(xpp.names().collect::<Vec<_>>(), vec!["sb2"]);
        assert!(xpp.namespace("sb2").is_some());
        assert_eq!(ns.leaf_count(), 1);
        let leaf = ns.lookup(&["xpp", "sb2", "pim"]).and_then(|e| e.as_object()).unwrap();
        assert!(Arc::ptr_eq(leaf, &pim));
    }

    #[test]
    fn leaf_collisions_are_skipped() {
        let mut root = IterableNamespace::new();
        let first: ObjectRef = Arc::new(Signal::new("first"));
        root.insert("mfx", first);

        let obj: ObjectRef = Arc::new(Signal::new("second"));
        insert_at_path(&mut root, "mfx_dg1", &obj, &[Some(Key::text("mfx"))], true);
        assert_eq!(root.object("mfx").and_then(|o| o.name()), Some("first"));
        assert_eq!(root.len(), 1);
    }
}
