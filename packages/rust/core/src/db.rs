//! JSON object database: describes the modules, published objects, and
//! caller frame that make up a [`Registry`].
//!
//! ```json
//! {
//!   "modules": [
//!     {
//!       "name": "mfx.beamline",
//!       "objects": [
//!         { "kind": "device", "name": "mfx_dg1_pim",
//!           "class": ["pcdsdevices.pim.PIM", "ophyd.device.Device"],
//!           "md": { "beamline": "MFX", "stand": "DG1" },
//!           "components": [
//!             { "attr": "zoom", "object": { "kind": "signal", "name": "mfx_dg1_pim_zoom" } },
//!             { "attr": "parent", "ref": "mfx_dg1" }
//!           ] },
//!         { "kind": "function", "name": "tweak" },
//!         { "kind": "value", "name": "gain", "value": 3 }
//!       ]
//!     }
//!   ],
//!   "published": ["mfx.beamline"],
//!   "frame": [ { "kind": "value", "name": "run_number", "value": 12 } ]
//! }
//! ```
//!
//! `ref` components point at another object by canonical name and are
//! held weakly, so they may form cycles.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, instrument};

use hutchns_shared::{NamespaceError, Result};

use crate::object::{Device, Function, Metadata, ObjectRef, Signal};
use crate::scope::{Module, Registry, Scope};
use crate::types::TypeRegistry;

/// Top-level database document.
#[derive(Debug, Clone, Deserialize)]
pub struct ObjectDb {
    #[serde(default)]
    pub modules: Vec<ModuleSpec>,
    /// Module names whose public bindings are published to the session.
    #[serde(default)]
    pub published: Vec<String>,
    /// Bindings of the innermost caller frame.
    #[serde(default)]
    pub frame: Vec<ObjectSpec>,
}

/// One importable module.
#[derive(Debug, Clone, Deserialize)]
pub struct ModuleSpec {
    pub name: String,
    #[serde(default)]
    pub exports: Option<Vec<String>>,
    #[serde(default)]
    pub objects: Vec<ObjectSpec>,
}

/// One object, tagged by `kind`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ObjectSpec {
    Device {
        name: String,
        #[serde(default)]
        class: Vec<String>,
        #[serde(default)]
        md: Option<Metadata>,
        #[serde(default)]
        components: Vec<ComponentSpec>,
    },
    Signal {
        name: String,
        #[serde(default)]
        class: Vec<String>,
    },
    Function {
        name: String,
        #[serde(default)]
        returns: Option<Box<ObjectSpec>>,
    },
    Value {
        name: String,
        value: Value,
    },
}

impl ObjectSpec {
    pub fn name(&self) -> &str {
        match self {
            ObjectSpec::Device { name, .. }
            | ObjectSpec::Signal { name, .. }
            | ObjectSpec::Function { name, .. }
            | ObjectSpec::Value { name, .. } => name,
        }
    }
}

/// A device component: an inline object or a reference by name.
#[derive(Debug, Clone, Deserialize)]
pub struct ComponentSpec {
    pub attr: String,
    #[serde(default)]
    pub object: Option<ObjectSpec>,
    #[serde(default, rename = "ref")]
    pub reference: Option<String>,
}

impl ObjectDb {
    /// Read and parse a database file.
    pub fn from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| NamespaceError::io(path, e))?;
        serde_json::from_str(&content)
            .map_err(|e| NamespaceError::load(format!("{}: {e}", path.display())))
    }

    /// Parse a database document.
    pub fn parse(content: &str) -> Result<Self> {
        serde_json::from_str(content).map_err(|e| NamespaceError::load(e.to_string()))
    }

    /// Instantiate every object and assemble the registry.
    ///
    /// Every class path seen is registered with `types`.
    #[instrument(skip_all, fields(modules = self.modules.len()))]
    pub fn into_registry(self, types: &mut TypeRegistry) -> Result<Registry> {
        let mut builder = Builder {
            types,
            by_name: HashMap::new(),
            pending: Vec::new(),
        };

        let mut registry = Registry::new();
        for spec in &self.modules {
            let mut module = Module::new(&spec.name);
            for obj_spec in &spec.objects {
                let obj = builder.build(obj_spec)?;
                module.bind(obj_spec.name(), obj);
            }
            if let Some(exports) = &spec.exports {
                module = module.with_exports(exports.clone());
            }
            debug!(module = %spec.name, objects = spec.objects.len(), "module loaded");
            registry.add_module(module);
        }

        let mut frame = Scope::new();
        for obj_spec in &self.frame {
            let obj = builder.build(obj_spec)?;
            frame.insert(obj_spec.name(), obj);
        }

        builder.link_references()?;

        for name in &self.published {
            let module = registry.module(name).ok_or_else(|| {
                NamespaceError::load(format!("published module {name} is not defined"))
            })?;
            let bindings = module.public_bindings();
            for (obj_name, obj) in bindings.iter() {
                registry.publish(obj_name, obj.clone());
            }
        }
        if !frame.is_empty() {
            registry.push_frame(frame);
        }

        info!(
            objects = builder.by_name.len(),
            published = registry.published().len(),
            "object database loaded"
        );
        Ok(registry)
    }
}

struct Builder<'a> {
    types: &'a mut TypeRegistry,
    by_name: HashMap<String, ObjectRef>,
    /// `(device, attr, target name)` links resolved once everything exists.
    pending: Vec<(Arc<Device>, String, String)>,
}

impl Builder<'_> {
    fn build(&mut self, spec: &ObjectSpec) -> Result<ObjectRef> {
        let obj: ObjectRef = match spec {
            ObjectSpec::Device {
                name,
                class,
                md,
                components,
            } => {
                let mut device = Device::new(name);
                for path in class {
                    self.types.register_class(path);
                    device = device.with_class(path);
                }
                if let Some(md) = md {
                    device = device.with_metadata(md.clone());
                }
                let device = Arc::new(device);
                for component in components {
                    match (&component.object, &component.reference) {
                        (Some(child), None) => {
                            let child = self.build(child)?;
                            device.add_component(&component.attr, child);
                        }
                        (None, Some(target)) => {
                            self.pending
                                .push((device.clone(), component.attr.clone(), target.clone()));
                        }
                        _ => {
                            return Err(NamespaceError::load(format!(
                                "component {name}.{} needs exactly one of object or ref",
                                component.attr
                            )));
                        }
                    }
                }
                device as ObjectRef
            }
            ObjectSpec::Signal { name, class } => {
                let mut signal = Signal::new(name);
                for path in class {
                    self.types.register_class(path);
                    signal = signal.with_class(path);
                }
                Arc::new(signal) as ObjectRef
            }
            ObjectSpec::Function { name, returns } => {
                let value: ObjectRef = match returns {
                    Some(returns) => self.build(returns)?,
                    None => Arc::new(()) as ObjectRef,
                };
                Arc::new(Function::returning(name, value)) as ObjectRef
            }
            ObjectSpec::Value { name, value } => plain_value(name, value)?,
        };

        self.by_name.insert(spec.name().to_string(), obj.clone());
        Ok(obj)
    }

    fn link_references(&mut self) -> Result<()> {
        for (device, attr, target) in self.pending.drain(..) {
            let obj = self.by_name.get(&target).ok_or_else(|| {
                NamespaceError::load(format!("component {attr} refers to unknown object {target}"))
            })?;
            device.add_back_reference(attr, obj);
        }
        Ok(())
    }
}

fn plain_value(name: &str, value: &Value) -> Result<ObjectRef> {
    let obj: ObjectRef = match value {
        Value::Bool(b) => Arc::new(*b) as ObjectRef,
        Value::String(s) => Arc::new(s.clone()) as ObjectRef,
        Value::Number(n) => match n.as_i64() {
            Some(i) => Arc::new(i) as ObjectRef,
            None => Arc::new(n.as_f64().unwrap_or(f64::NAN)) as ObjectRef,
        },
        Value::Null => Arc::new(()) as ObjectRef,
        Value::Array(_) | Value::Object(_) => {
            return Err(NamespaceError::load(format!(
                "value {name} must be a bool, number, string, or null"
            )));
        }
    };
    Ok(obj)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::Composite;

    const DB: &str = r#"{
        "modules": [
            {
                "name": "mfx.beamline",
                "objects": [
                    { "kind": "device", "name": "mfx_dg1",
                      "class": ["ophyd.device.Device"],
                      "md": { "beamline": "MFX" },
                      "components": [
                        { "attr": "pim", "object": { "kind": "device", "name": "mfx_dg1_pim",
                          "class": ["ophyd.device.Device"],
                          "components": [ { "attr": "parent", "ref": "mfx_dg1" } ] } }
                      ] },
                    { "kind": "function", "name": "tweak",
                      "returns": { "kind": "value", "name": "tweak_result", "value": 1.5 } },
                    { "kind": "value", "name": "_hidden", "value": "x" }
                ]
            }
        ],
        "published": ["mfx.beamline"],
        "frame": [ { "kind": "value", "name": "run", "value": 12 } ]
    }"#;

    #[test]
    fn loads_modules_published_and_frame() {
        let mut types = TypeRegistry::new();
        let registry = ObjectDb::parse(DB).unwrap().into_registry(&mut types).unwrap();

        assert!(registry.module("mfx.beamline").is_some());
        assert_eq!(
            registry.published().names().collect::<Vec<_>>(),
            vec!["mfx_dg1", "tweak"]
        );
        let run = registry.frame(0).and_then(|f| f.get("run")).unwrap();
        assert_eq!(run.as_any().downcast_ref::<i64>(), Some(&12));
        assert!(types.resolve("ophyd.device.Device").is_ok());
    }

    #[test]
    fn references_link_back_to_named_objects() {
        let mut types = TypeRegistry::new();
        let registry = ObjectDb::parse(DB).unwrap().into_registry(&mut types).unwrap();

        let dg1 = registry.published().get("mfx_dg1").unwrap();
        let dg1_dev = dg1.as_any().downcast_ref::<Device>().unwrap();
        let (_, pim) = &dg1_dev.components()[0];
        let pim_dev = pim.as_any().downcast_ref::<Device>().unwrap();
        let (attr, parent) = &pim_dev.components()[0];
        assert_eq!(attr, "parent");
        assert!(Arc::ptr_eq(parent, dg1));
    }

    #[test]
    fn functions_return_their_declared_value() {
        let mut types = TypeRegistry::new();
        let registry = ObjectDb::parse(DB).unwrap().into_registry(&mut types).unwrap();
        let tweak = registry.published().get("tweak").unwrap();
        assert!(tweak.is_plain_function());
        let out = tweak.call().unwrap();
        assert_eq!(out.as_any().downcast_ref::<f64>(), Some(&1.5));
    }

    #[test]
    fn unknown_reference_is_a_load_error() {
        let db = r#"{ "modules": [ { "name": "m", "objects": [
            { "kind": "device", "name": "d", "components": [ { "attr": "p", "ref": "ghost" } ] }
        ] } ] }"#;
        let err = ObjectDb::parse(db)
            .unwrap()
            .into_registry(&mut TypeRegistry::new())
            .unwrap_err();
        assert!(err.to_string().contains("ghost"));
    }

    #[test]
    fn malformed_documents_are_rejected() {
        assert!(ObjectDb::parse("{ not json").is_err());

        let db = r#"{ "modules": [ { "name": "m", "objects": [
            { "kind": "value", "name": "v", "value": [1, 2] }
        ] } ] }"#;
        assert!(ObjectDb::parse(db).unwrap().into_registry(&mut TypeRegistry::new()).is_err());

        let db = r#"{ "published": ["missing"] }"#;
        assert!(ObjectDb::parse(db).unwrap().into_registry(&mut TypeRegistry::new()).is_err());
    }
}
