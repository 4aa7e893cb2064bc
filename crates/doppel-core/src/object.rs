//! Object model for stand-in classes and their instances
//!
//! A [`SubjectClass`] is a first-class runtime class object: a name-keyed
//! instance-method table with per-method visibility, an optional parent
//! class, an optional capability probe, and a frozen flag. Calls that match
//! no defined method fall through to the class's fallback definition (the
//! method-table entry named [`FALLBACK_SLOT`]), and finally to an
//! undefined-method failure. This is the surface the injection layer
//! rewrites and restores.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::dispatch::{DispatchError, DispatchResult};
use crate::value::{Block, KeywordArgs, Value};

/// Reserved method-table name holding a class's dynamic-fallback override.
///
/// A class has at most one fallback definition at a time; this entry is the
/// hook slot the injection layer takes over while interception is active.
pub const FALLBACK_SLOT: &str = "__fallback__";

/// Reserved method-table name for the sequence-coercion protocol.
///
/// [`coerce_to_sequence`] invokes this operation to ask a value whether it
/// can be decomposed as an ordered sequence. A `Null` result means "not
/// applicable".
pub const SEQUENCE_COERCE_SLOT: &str = "to_sequence";

/// Global counter for generating unique class IDs
static NEXT_CLASS_ID: AtomicU64 = AtomicU64::new(1);

/// Global counter for generating unique object IDs
static NEXT_OBJECT_ID: AtomicU64 = AtomicU64::new(1);

fn generate_class_id() -> ClassId {
    ClassId(NEXT_CLASS_ID.fetch_add(1, Ordering::Relaxed))
}

fn generate_object_id() -> u64 {
    NEXT_OBJECT_ID.fetch_add(1, Ordering::Relaxed)
}

/// Identity key of a [`SubjectClass`].
///
/// Assigned once at class creation and never reused; equality and hashing
/// are by identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClassId(u64);

impl ClassId {
    /// Raw numeric value of the ID
    pub fn raw(self) -> u64 {
        self.0
    }
}

/// Visibility of a method-table entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    /// Advertised by `responds_to` regardless of the non-public flag
    Public,
    /// Advertised by `responds_to` only when non-public members are included
    Private,
}

/// Native method body stored in a class's method table
pub type MethodFn = Arc<dyn for<'a> Fn(&MethodCall<'a>) -> DispatchResult + Send + Sync>;

/// Capability probe: `(receiver, name, include_non_public)`.
///
/// Lets a class advertise operations it handles dynamically without
/// defining them in the method table.
pub type CapabilityProbe = Arc<dyn Fn(&Instance, &str, bool) -> bool + Send + Sync>;

/// One call as seen by a method body: receiver, originating operation name,
/// positional arguments, keyword arguments, and optional trailing block.
pub struct MethodCall<'a> {
    /// Instance the call was made on
    pub receiver: &'a Instance,
    /// Operation name as invoked (fallback bodies see the original name)
    pub name: &'a str,
    /// Positional arguments
    pub args: &'a [Value],
    /// Keyword arguments
    pub kwargs: &'a KeywordArgs,
    /// Trailing block, if one was passed
    pub block: Option<&'a Block>,
}

#[derive(Clone)]
pub(crate) struct MethodEntry {
    pub(crate) body: MethodFn,
    pub(crate) visibility: Visibility,
}

/// Errors raised by method-table mutation
#[derive(Debug, Clone, thiserror::Error)]
pub enum ObjectError {
    /// Definition, alias, or removal attempted on a frozen class
    #[error("cannot modify frozen class `{0}`")]
    FrozenClass(String),

    /// Alias or removal target does not exist
    #[error("undefined method `{method}` for class `{class}`")]
    UndefinedMethod {
        /// Class the operation was attempted on
        class: String,
        /// Missing method name
        method: String,
    },
}

/// Result type for method-table mutation
pub type ObjectResult<T> = Result<T, ObjectError>;

/// A first-class runtime class object.
///
/// Classes are created behind `Arc` and identified by [`ClassId`]; the
/// method table uses interior mutability so interception can be installed
/// and removed on a shared class. Bind/reset races on the same class are
/// not supported and require external serialization.
pub struct SubjectClass {
    id: ClassId,
    name: String,
    parent: Option<Arc<SubjectClass>>,
    methods: RwLock<FxHashMap<String, MethodEntry>>,
    capability_probe: RwLock<Option<CapabilityProbe>>,
    frozen: AtomicBool,
}

impl SubjectClass {
    /// Create a new root class
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            id: generate_class_id(),
            name: name.into(),
            parent: None,
            methods: RwLock::new(FxHashMap::default()),
            capability_probe: RwLock::new(None),
            frozen: AtomicBool::new(false),
        })
    }

    /// Create a new class inheriting from `parent`
    pub fn with_parent(name: impl Into<String>, parent: Arc<SubjectClass>) -> Arc<Self> {
        Arc::new(Self {
            id: generate_class_id(),
            name: name.into(),
            parent: Some(parent),
            methods: RwLock::new(FxHashMap::default()),
            capability_probe: RwLock::new(None),
            frozen: AtomicBool::new(false),
        })
    }

    /// Identity key of this class
    pub fn id(&self) -> ClassId {
        self.id
    }

    /// Class name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Parent class, if any
    pub fn parent(&self) -> Option<&Arc<SubjectClass>> {
        self.parent.as_ref()
    }

    /// Freeze the class: all subsequent method-table mutation fails
    pub fn freeze(&self) {
        self.frozen.store(true, Ordering::Relaxed);
    }

    /// Whether the class is frozen
    pub fn is_frozen(&self) -> bool {
        self.frozen.load(Ordering::Relaxed)
    }

    fn check_mutable(&self) -> ObjectResult<()> {
        if self.is_frozen() {
            Err(ObjectError::FrozenClass(self.name.clone()))
        } else {
            Ok(())
        }
    }

    /// Define (or redefine) an instance method under `name`
    pub fn define_method<F>(&self, name: &str, visibility: Visibility, body: F) -> ObjectResult<()>
    where
        F: for<'a> Fn(&MethodCall<'a>) -> DispatchResult + Send + Sync + 'static,
    {
        self.check_mutable()?;
        self.methods.write().insert(
            name.to_string(),
            MethodEntry {
                body: Arc::new(body),
                visibility,
            },
        );
        Ok(())
    }

    /// Install a dynamic-fallback override for this class.
    ///
    /// The body is invoked for any call that matches no defined method,
    /// with the originating operation name in [`MethodCall::name`].
    pub fn define_fallback<F>(&self, body: F) -> ObjectResult<()>
    where
        F: for<'a> Fn(&MethodCall<'a>) -> DispatchResult + Send + Sync + 'static,
    {
        self.define_method(FALLBACK_SLOT, Visibility::Private, body)
    }

    /// Remove the method defined under `name` on this class itself
    pub fn remove_method(&self, name: &str) -> ObjectResult<()> {
        self.check_mutable()?;
        if self.methods.write().remove(name).is_none() {
            return Err(ObjectError::UndefinedMethod {
                class: self.name.clone(),
                method: name.to_string(),
            });
        }
        Ok(())
    }

    /// Copy the definition visible under `existing` (own or inherited) to a
    /// new entry named `new_name` on this class itself
    pub fn alias_method(&self, new_name: &str, existing: &str) -> ObjectResult<()> {
        self.check_mutable()?;
        let entry = self
            .resolve_entry(existing)
            .ok_or_else(|| ObjectError::UndefinedMethod {
                class: self.name.clone(),
                method: existing.to_string(),
            })?;
        self.methods.write().insert(new_name.to_string(), entry);
        Ok(())
    }

    /// Whether this class itself defines `name`
    pub fn has_own_method(&self, name: &str) -> bool {
        self.methods.read().contains_key(name)
    }

    /// Whether `name` is defined on this class or any ancestor.
    ///
    /// This is the capability check the injection layer uses to detect
    /// pre-existing fallback overrides and to decide installation
    /// idempotence.
    pub fn instance_method_defined(&self, name: &str) -> bool {
        self.resolve_entry(name).is_some()
    }

    /// Set the capability probe consulted by `responds_to` for operation
    /// names with no method-table entry
    pub fn set_capability_probe<F>(&self, probe: F) -> ObjectResult<()>
    where
        F: Fn(&Instance, &str, bool) -> bool + Send + Sync + 'static,
    {
        self.check_mutable()?;
        *self.capability_probe.write() = Some(Arc::new(probe));
        Ok(())
    }

    /// Create an instance of this class
    pub fn instantiate(self: &Arc<Self>) -> Instance {
        Instance::new(self)
    }

    /// Resolve `name` through this class and its ancestors.
    ///
    /// Clones the entry so no lock is held while the body runs.
    pub(crate) fn resolve_entry(&self, name: &str) -> Option<MethodEntry> {
        let mut current = Some(self);
        while let Some(class) = current {
            if let Some(entry) = class.methods.read().get(name) {
                return Some(entry.clone());
            }
            current = class.parent.as_deref();
        }
        None
    }

    fn resolve_probe(&self) -> Option<CapabilityProbe> {
        let mut current = Some(self);
        while let Some(class) = current {
            if let Some(probe) = class.capability_probe.read().as_ref() {
                return Some(probe.clone());
            }
            current = class.parent.as_deref();
        }
        None
    }
}

impl fmt::Debug for SubjectClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubjectClass")
            .field("id", &self.id.raw())
            .field("name", &self.name)
            .field("methods", &self.methods.read().len())
            .field("frozen", &self.is_frozen())
            .finish()
    }
}

/// Instance of a [`SubjectClass`].
///
/// Cheap to clone; equality and hashing are by identity (`object_id`).
#[derive(Clone)]
pub struct Instance {
    inner: Arc<InstanceInner>,
}

struct InstanceInner {
    object_id: u64,
    class: Arc<SubjectClass>,
}

impl Instance {
    /// Create a new instance of `class`
    pub fn new(class: &Arc<SubjectClass>) -> Self {
        Self {
            inner: Arc::new(InstanceInner {
                object_id: generate_object_id(),
                class: class.clone(),
            }),
        }
    }

    /// Unique identity of this instance
    pub fn object_id(&self) -> u64 {
        self.inner.object_id
    }

    /// Class this instance belongs to
    pub fn class(&self) -> &Arc<SubjectClass> {
        &self.inner.class
    }

    /// Capability predicate: does this instance answer `name`?
    ///
    /// True when the class chain defines `name` (visibility-filtered unless
    /// `include_non_public`), or when the class's capability probe
    /// advertises it.
    pub fn responds_to(&self, name: &str, include_non_public: bool) -> bool {
        if let Some(entry) = self.inner.class.resolve_entry(name) {
            if include_non_public || entry.visibility == Visibility::Public {
                return true;
            }
        }
        match self.inner.class.resolve_probe() {
            Some(probe) => probe(self, name, include_non_public),
            None => false,
        }
    }

    /// Invoke an operation on this instance.
    ///
    /// Dispatch order: defined method (own or inherited), then the fallback
    /// chain, then an undefined-method failure. Errors from the body
    /// (including resolver failures of an intercepted call) propagate
    /// unchanged.
    pub fn invoke(
        &self,
        name: &str,
        args: &[Value],
        kwargs: &KeywordArgs,
        block: Option<&Block>,
    ) -> DispatchResult {
        if let Some(entry) = self.inner.class.resolve_entry(name) {
            let call = MethodCall {
                receiver: self,
                name,
                args,
                kwargs,
                block,
            };
            return (entry.body)(&call);
        }
        self.invoke_fallback_from(Some(&self.inner.class), name, args, kwargs, block)
    }

    /// Dispatch `name` to the fallback chain starting at `start` (`None`
    /// means past the root: undefined-method failure).
    pub(crate) fn invoke_fallback_from(
        &self,
        start: Option<&Arc<SubjectClass>>,
        name: &str,
        args: &[Value],
        kwargs: &KeywordArgs,
        block: Option<&Block>,
    ) -> DispatchResult {
        if let Some(class) = start {
            if let Some(entry) = class.resolve_entry(FALLBACK_SLOT) {
                let call = MethodCall {
                    receiver: self,
                    name,
                    args,
                    kwargs,
                    block,
                };
                return (entry.body)(&call);
            }
        }
        Err(DispatchError::UndefinedMethod {
            class: self.inner.class.name().to_string(),
            method: name.to_string(),
        })
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("object_id", &self.inner.object_id)
            .field("class", &self.inner.class.name())
            .finish()
    }
}

impl PartialEq for Instance {
    fn eq(&self, other: &Self) -> bool {
        self.inner.object_id == other.inner.object_id
    }
}

impl Eq for Instance {}

impl std::hash::Hash for Instance {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.inner.object_id.hash(state);
    }
}

/// Pattern-decomposition probe: ask a value to expose itself as an ordered
/// sequence.
///
/// Lists answer directly. Instances are *invoked* through the
/// [`SEQUENCE_COERCE_SLOT`] operation — so the probe goes through full
/// dynamic dispatch, including any installed fallback. A `Null` result, an
/// undefined slot, or any non-sequence value means "not applicable"
/// (`Ok(None)`); other dispatch failures propagate.
pub fn coerce_to_sequence(value: &Value) -> Result<Option<Vec<Value>>, DispatchError> {
    match value {
        Value::List(items) => Ok(Some(items.clone())),
        Value::Instance(instance) => {
            match instance.invoke(SEQUENCE_COERCE_SLOT, &[], &KeywordArgs::new(), None) {
                Ok(Value::List(items)) => Ok(Some(items)),
                Ok(_) => Ok(None),
                Err(DispatchError::UndefinedMethod { .. }) => Ok(None),
                Err(err) => Err(err),
            }
        }
        _ => Ok(None),
    }
}
