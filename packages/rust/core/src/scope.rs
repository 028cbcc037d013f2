//! Scope resolution: turn source specifiers into one name → object mapping.
//!
//! The process-wide object registry is an explicit [`Registry`] value: the
//! objects published by the session, the importable [`Module`]s, and a
//! stack of caller frames. Every build resolves a fresh [`Scope`] from it.

use std::collections::BTreeMap;
use std::fmt;

use hutchns_shared::{NamespaceError, Result};
use tracing::{debug, error, warn};

use crate::namespace::{Bindings, IterableNamespace};
use crate::object::ObjectRef;

/// Prefix marking a binding as hidden.
const HIDDEN_PREFIX: char = '_';

/// Suffix requesting that the resolved object be called.
const CALL_SUFFIX: &str = "()";

/// Accepted file-name suffix on module names.
const FILE_SUFFIX: &str = ".py";

fn is_hidden(name: &str) -> bool {
    name.starts_with(HIDDEN_PREFIX)
}

// ---------------------------------------------------------------------------
// Scope
// ---------------------------------------------------------------------------

/// Ordered name → object mapping. Later bindings shadow earlier ones.
#[derive(Clone, Default)]
pub struct Scope {
    bindings: Bindings<ObjectRef>,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `name`, returning the object it shadowed.
    pub fn insert(&mut self, name: impl Into<String>, obj: ObjectRef) -> Option<ObjectRef> {
        self.bindings.insert(name.into(), obj)
    }

    pub fn get(&self, name: &str) -> Option<&ObjectRef> {
        self.bindings.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.bindings.contains(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ObjectRef)> {
        self.bindings.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.iter().map(|(name, _)| name)
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Merge `other` into `self`; `other` wins on collision.
    pub fn extend(&mut self, other: Scope) {
        for (name, obj) in other.iter() {
            self.insert(name, obj.clone());
        }
    }

    /// Bindings whose names are not hidden.
    pub fn visible(&self) -> Scope {
        self.iter()
            .filter(|(name, _)| !is_hidden(name))
            .map(|(name, obj)| (name.to_string(), obj.clone()))
            .collect()
    }
}

impl FromIterator<(String, ObjectRef)> for Scope {
    fn from_iter<I: IntoIterator<Item = (String, ObjectRef)>>(iter: I) -> Self {
        let mut scope = Scope::new();
        for (name, obj) in iter {
            scope.insert(name, obj);
        }
        scope
    }
}

impl From<&IterableNamespace> for Scope {
    /// Top-level object leaves only; nested namespaces are not objects.
    fn from(ns: &IterableNamespace) -> Self {
        ns.objects()
            .map(|(name, obj)| (name.to_string(), obj.clone()))
            .collect()
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

// ---------------------------------------------------------------------------
// Module
// ---------------------------------------------------------------------------

/// A single importable unit of objects.
#[derive(Debug, Clone, Default)]
pub struct Module {
    name: String,
    bindings: Scope,
    exports: Option<Vec<String>>,
}

impl Module {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Restrict the module's public bindings to `exports`.
    pub fn with_exports(mut self, exports: Vec<String>) -> Self {
        self.exports = Some(exports);
        self
    }

    pub fn bind(&mut self, name: impl Into<String>, obj: ObjectRef) {
        self.bindings.insert(name, obj);
    }

    pub fn with_binding(mut self, name: impl Into<String>, obj: ObjectRef) -> Self {
        self.bind(name, obj);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Any binding, hidden or not.
    pub fn attr(&self, name: &str) -> Option<&ObjectRef> {
        self.bindings.get(name)
    }

    /// The declared exports, or every non-hidden binding.
    pub fn public_bindings(&self) -> Scope {
        match &self.exports {
            Some(exports) => {
                let mut scope = Scope::new();
                for name in exports {
                    match self.bindings.get(name) {
                        Some(obj) => {
                            scope.insert(name.clone(), obj.clone());
                        }
                        None => warn!(module = %self.name, %name, "exported name is not bound"),
                    }
                }
                scope
            }
            None => self.bindings.visible(),
        }
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Explicit snapshot of everything a namespace build may see.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    published: Scope,
    modules: BTreeMap<String, Module>,
    frames: Vec<Scope>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish an object to the session-wide pool.
    pub fn publish(&mut self, name: impl Into<String>, obj: ObjectRef) {
        self.published.insert(name, obj);
    }

    pub fn published(&self) -> &Scope {
        &self.published
    }

    pub fn add_module(&mut self, module: Module) {
        self.modules.insert(module.name.clone(), module);
    }

    pub fn module(&self, name: &str) -> Option<&Module> {
        self.modules.get(name)
    }

    pub fn module_names(&self) -> impl Iterator<Item = &str> {
        self.modules.keys().map(String::as_str)
    }

    /// Enter a caller frame.
    pub fn push_frame(&mut self, frame: Scope) {
        self.frames.push(frame);
    }

    pub fn pop_frame(&mut self) -> Option<Scope> {
        self.frames.pop()
    }

    /// The frame `stack_offset` levels below the innermost one.
    pub fn frame(&self, stack_offset: usize) -> Option<&Scope> {
        self.frames.iter().rev().nth(stack_offset)
    }
}

// ---------------------------------------------------------------------------
// Sources
// ---------------------------------------------------------------------------

/// One source of bindings.
#[derive(Debug, Clone)]
pub enum ScopeSource {
    /// A module name, `module.attr` object path, or either with a `()` suffix.
    Module(String),
    /// An already-built namespace.
    Namespace(IterableNamespace),
    /// An explicit mapping.
    Scope(Scope),
    /// Several sources, merged in order.
    List(Vec<ScopeSource>),
}

impl From<&str> for ScopeSource {
    fn from(name: &str) -> Self {
        ScopeSource::Module(name.to_string())
    }
}

impl From<String> for ScopeSource {
    fn from(name: String) -> Self {
        ScopeSource::Module(name)
    }
}

impl From<IterableNamespace> for ScopeSource {
    fn from(ns: IterableNamespace) -> Self {
        ScopeSource::Namespace(ns)
    }
}

impl From<Scope> for ScopeSource {
    fn from(scope: Scope) -> Self {
        ScopeSource::Scope(scope)
    }
}

impl<S: Into<ScopeSource>> From<Vec<S>> for ScopeSource {
    fn from(sources: Vec<S>) -> Self {
        ScopeSource::List(sources.into_iter().map(Into::into).collect())
    }
}

/// Which bindings a namespace build should consider.
#[derive(Debug, Clone)]
pub enum ScopeSpec {
    /// Published objects plus the visible bindings of a caller frame.
    Default { stack_offset: usize },
    /// Explicit sources, later ones overriding earlier ones.
    Sources(Vec<ScopeSource>),
}

impl Default for ScopeSpec {
    fn default() -> Self {
        ScopeSpec::Default { stack_offset: 0 }
    }
}

impl ScopeSpec {
    pub fn sources<I, S>(sources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<ScopeSource>,
    {
        ScopeSpec::Sources(sources.into_iter().map(Into::into).collect())
    }
}

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

/// Resolve `spec` against `registry`.
///
/// A source that fails to resolve is logged and contributes nothing.
pub fn resolve_scope(registry: &Registry, spec: &ScopeSpec) -> Scope {
    match spec {
        ScopeSpec::Default { stack_offset } => {
            let mut scope = registry.published().clone();
            match registry.frame(*stack_offset) {
                Some(frame) => scope.extend(frame.visible()),
                None => debug!(stack_offset, "no caller frame at offset"),
            }
            scope
        }
        ScopeSpec::Sources(sources) => {
            let mut scope = Scope::new();
            for source in sources {
                scope.extend(resolve_source_lenient(registry, source));
            }
            scope
        }
    }
}

fn resolve_source_lenient(registry: &Registry, source: &ScopeSource) -> Scope {
    if let ScopeSource::List(items) = source {
        let mut scope = Scope::new();
        for item in items {
            scope.extend(resolve_source_lenient(registry, item));
        }
        return scope;
    }
    match resolve_source(registry, source) {
        Ok(scope) => scope,
        Err(e) => {
            debug!(error = ?e, ?source, "scope source failed");
            error!("{e}");
            Scope::new()
        }
    }
}

/// Resolve a single source strictly.
pub fn resolve_source(registry: &Registry, source: &ScopeSource) -> Result<Scope> {
    match source {
        ScopeSource::Module(name) => resolve_module(registry, name),
        ScopeSource::Namespace(ns) => Ok(Scope::from(ns).visible()),
        ScopeSource::Scope(scope) => Ok(scope.visible()),
        ScopeSource::List(items) => {
            let mut scope = Scope::new();
            for item in items {
                scope.extend(resolve_source(registry, item)?);
            }
            Ok(scope)
        }
    }
}

/// Resolve a module name or object path.
///
/// - `"beamline"` / `"beamline.py"`: the module's public bindings
/// - `"beamline.motor"`: that one object, bound as `motor`
/// - `"beamline.make_motor()"`: the object's return value, bound as `make_motor`
pub fn resolve_module(registry: &Registry, spec: &str) -> Result<Scope> {
    let spec = spec.trim();
    let (path, call) = match spec.strip_suffix(CALL_SUFFIX) {
        Some(path) => (path, true),
        None => (spec, false),
    };
    let path = path.strip_suffix(FILE_SUFFIX).unwrap_or(path);

    if let Some(module) = registry.module(path) {
        debug!(module = %path, "importing module bindings");
        return Ok(module.public_bindings());
    }

    let (module_path, attr) = path
        .rsplit_once('.')
        .ok_or_else(|| NamespaceError::source_not_found(spec, "no module with that name"))?;
    let module = registry.module(module_path).ok_or_else(|| {
        NamespaceError::source_not_found(spec, format!("no module named {module_path}"))
    })?;
    let obj = module.attr(attr).ok_or_else(|| {
        NamespaceError::source_not_found(spec, format!("module {module_path} has no attribute {attr}"))
    })?;

    let obj = if call {
        obj.call()
            .ok_or_else(|| NamespaceError::source_not_found(spec, format!("{attr} is not callable")))?
    } else {
        obj.clone()
    };

    let mut scope = Scope::new();
    scope.insert(attr, obj);
    Ok(scope)
}
