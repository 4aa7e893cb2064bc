//! Injection lifecycle: installing and removing interception hooks
//!
//! An injection takes over a class's fallback slot so that calls to
//! operations the class does not define are routed to the expectation
//! resolver, and it can reverse that takeover completely:
//!
//! - [`InjectionRegistry`] — at most one active injection record per class,
//!   created on demand and bound immediately.
//! - [`FallbackInjection`] — the per-class record; `bind` preserves
//!   whatever fallback behavior existed before, `reset` restores it.
//! - [`BoundClassTable`] — append-only table resolving the handle a
//!   generated hook captured back to its class.

pub mod bound_classes;
pub mod fallback_injection;
pub mod registry;

pub use bound_classes::{BoundClassTable, BoundHandle};
pub use fallback_injection::FallbackInjection;
pub use registry::InjectionRegistry;
