//! Object model: opaque handles, identity, and the capability interface.
//!
//! Namespaces hold [`ObjectRef`]s. The builders never look inside an object
//! beyond the optional capabilities exposed on [`Object`]:
//! - [`Object::as_composite`]: sub-components reachable by attribute name
//! - [`Object::metadata`]: a record of named metadata fields
//!
//! Objects that expose neither are leaves.

use std::any::Any;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, Weak};

/// Shared handle to a pooled object.
pub type ObjectRef = Arc<dyn Object>;

/// Metadata record: field name to value.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// Identity of an object (address of its allocation), not its value.
pub fn object_id(obj: &ObjectRef) -> usize {
    Arc::as_ptr(obj) as *const () as usize
}

/// An opaque, already-instantiated handle in the object pool.
pub trait Object: Any + Send + Sync + fmt::Debug {
    /// Upcast for concrete type checks.
    fn as_any(&self) -> &dyn Any;

    /// Canonical identifying name, independent of any binding name.
    fn name(&self) -> Option<&str> {
        None
    }

    /// Composite capability: `Some` when this object has sub-components.
    fn as_composite(&self) -> Option<&dyn Composite> {
        None
    }

    /// Metadata capability: `Some` when this object carries a metadata record.
    fn metadata(&self) -> Option<&Metadata> {
        None
    }

    /// True only for free functions. Callable instances are not functions.
    fn is_plain_function(&self) -> bool {
        false
    }

    /// Invoke the object, if it is callable.
    fn call(&self) -> Option<ObjectRef> {
        None
    }

    /// Whether the object's class chain contains `class_path`.
    fn is_instance_of(&self, _class_path: &str) -> bool {
        false
    }
}

/// Objects exposing named sub-components.
pub trait Composite {
    /// Ordered `(attribute name, child)` pairs.
    fn components(&self) -> Vec<(String, ObjectRef)>;
}

// ---------------------------------------------------------------------------
// Device
// ---------------------------------------------------------------------------

enum Component {
    Owned(ObjectRef),
    Back(Weak<dyn Object>),
}

/// A composite, metadata-bearing instrument handle.
///
/// Components may be added after the device is shared, and back-references
/// are held weakly so cyclic device graphs do not leak.
pub struct Device {
    name: String,
    classes: Vec<String>,
    metadata: Option<Metadata>,
    components: RwLock<Vec<(String, Component)>>,
}

impl Device {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            classes: Vec::new(),
            metadata: None,
            components: RwLock::new(Vec::new()),
        }
    }

    /// Append a class path to the class chain (most derived first).
    pub fn with_class(mut self, class_path: impl Into<String>) -> Self {
        self.classes.push(class_path.into());
        self
    }

    /// Attach a metadata record.
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Add an owned sub-component reachable as `attr`.
    pub fn with_component(self, attr: impl Into<String>, child: ObjectRef) -> Self {
        self.add_component(attr, child);
        self
    }

    /// Add an owned sub-component to a device that may already be shared.
    pub fn add_component(&self, attr: impl Into<String>, child: ObjectRef) {
        self.components
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((attr.into(), Component::Owned(child)));
    }

    /// Add a weakly held sub-component, typically a parent or sibling.
    pub fn add_back_reference(&self, attr: impl Into<String>, target: &ObjectRef) {
        self.components
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((attr.into(), Component::Back(Arc::downgrade(target))));
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }
}

impl fmt::Debug for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Component names only: the graph may be cyclic.
        let components = self.components.read().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("Device")
            .field("name", &self.name)
            .field("classes", &self.classes)
            .field(
                "components",
                &components.iter().map(|(attr, _)| attr.as_str()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl Object for Device {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn name(&self) -> Option<&str> {
        Some(&self.name)
    }

    fn as_composite(&self) -> Option<&dyn Composite> {
        Some(self)
    }

    fn metadata(&self) -> Option<&Metadata> {
        self.metadata.as_ref()
    }

    fn is_instance_of(&self, class_path: &str) -> bool {
        self.classes.iter().any(|c| c == class_path)
    }
}

impl Composite for Device {
    fn components(&self) -> Vec<(String, ObjectRef)> {
        let components = self.components.read().unwrap_or_else(PoisonError::into_inner);
        components
            .iter()
            .filter_map(|(attr, component)| {
                let child = match component {
                    Component::Owned(obj) => obj.clone(),
                    Component::Back(weak) => weak.upgrade()?,
                };
                Some((attr.clone(), child))
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Signal
// ---------------------------------------------------------------------------

/// A named leaf handle (a single readback or setpoint).
#[derive(Debug, Clone)]
pub struct Signal {
    name: String,
    classes: Vec<String>,
}

impl Signal {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            classes: Vec::new(),
        }
    }

    pub fn with_class(mut self, class_path: impl Into<String>) -> Self {
        self.classes.push(class_path.into());
        self
    }
}

impl Object for Signal {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn name(&self) -> Option<&str> {
        Some(&self.name)
    }

    fn is_instance_of(&self, class_path: &str) -> bool {
        self.classes.iter().any(|c| c == class_path)
    }
}

// ---------------------------------------------------------------------------
// Function
// ---------------------------------------------------------------------------

type FunctionBody = Arc<dyn Fn() -> ObjectRef + Send + Sync>;

/// A free function.
#[derive(Clone)]
pub struct Function {
    name: String,
    body: FunctionBody,
}

impl Function {
    pub fn new(name: impl Into<String>, body: impl Fn() -> ObjectRef + Send + Sync + 'static) -> Self {
        Self {
            name: name.into(),
            body: Arc::new(body),
        }
    }

    /// A function that always returns the same object.
    pub fn returning(name: impl Into<String>, value: ObjectRef) -> Self {
        Self::new(name, move || value.clone())
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<function {}>", self.name)
    }
}

impl Object for Function {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn name(&self) -> Option<&str> {
        Some(&self.name)
    }

    fn is_plain_function(&self) -> bool {
        true
    }

    fn call(&self) -> Option<ObjectRef> {
        Some((self.body)())
    }
}

// ---------------------------------------------------------------------------
// Plain values
// ---------------------------------------------------------------------------

macro_rules! plain_value {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Object for $ty {
                fn as_any(&self) -> &dyn Any {
                    self
                }
            }
        )*
    };
}

plain_value!((), bool, i64, f64, String);
