//! Doppel interception core
//!
//! This crate is the dynamic method-interception layer of the doppel
//! test-double framework: it makes a stand-in class transparently answer
//! calls to operations it does not define by routing them to an
//! expectation resolver, and it can undo that routing completely between
//! test cases.
//!
//! - **Object model**: stand-in classes and instances with dynamic
//!   dispatch and a per-class fallback slot (`object` module)
//! - **Dispatch boundary**: call descriptors and the resolver trait the
//!   surrounding framework implements (`dispatch` module)
//! - **Injections**: bind/reset lifecycle installing and removing the
//!   interception hook (`injections` module)
//! - **Capabilities**: process-wide keyword-argument capability flag
//!   (`caps` module)
//!
//! # Example
//!
//! ```rust,ignore
//! use doppel_core::{InjectionRegistry, SubjectClass, Value};
//!
//! let registry = InjectionRegistry::new(resolver);
//! let class = SubjectClass::new("Service");
//!
//! // Route unknown operations on Service instances to the resolver.
//! let injection = registry.find_or_create(&class)?;
//!
//! let service = class.instantiate();
//! let result = service.invoke("fetch", &[Value::Int(1)], &kwargs, None)?;
//!
//! // Restore the original behavior between test cases.
//! injection.reset()?;
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod caps;
pub mod dispatch;
pub mod injections;
pub mod object;
pub mod value;

pub use dispatch::{
    CallDescriptor, DispatchError, DispatchResolver, DispatchResult, PRESERVED_FALLBACK_ALIAS,
};
pub use injections::{BoundClassTable, BoundHandle, FallbackInjection, InjectionRegistry};
pub use object::{
    coerce_to_sequence, CapabilityProbe, ClassId, Instance, MethodCall, MethodFn, ObjectError,
    ObjectResult, SubjectClass, Visibility, FALLBACK_SLOT, SEQUENCE_COERCE_SLOT,
};
pub use value::{Block, KeywordArgs, Value};
