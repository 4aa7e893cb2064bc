//! Append-only table of classes an interception hook was generated for

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use dashmap::DashMap;

use crate::object::SubjectClass;

/// Handle referencing a subject class in a [`BoundClassTable`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BoundHandle(usize);

impl BoundHandle {
    /// Raw numeric value of the handle
    pub fn raw(self) -> usize {
        self.0
    }
}

/// Append-only registry mapping handles to the classes hooks were generated
/// for.
///
/// Handles are issued monotonically and never reused, and entries are never
/// removed: generated hooks capture only the handle value and must keep
/// resolving for as long as the process runs, across any number of
/// reset/rebind cycles. The table therefore grows without bound over
/// repeated bind cycles; this is an accepted cost for process-lifetime test
/// runs, and a long-running host performing many cycles will accumulate
/// entries.
pub struct BoundClassTable {
    entries: DashMap<BoundHandle, Arc<SubjectClass>>,
    next_handle: AtomicUsize,
}

impl BoundClassTable {
    /// Create a new empty table
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            next_handle: AtomicUsize::new(0),
        }
    }

    /// Register a class and return the handle issued for it.
    ///
    /// Every registration issues a fresh handle, including repeat
    /// registrations of the same class across rebind cycles.
    pub fn register(&self, class: Arc<SubjectClass>) -> BoundHandle {
        let handle = BoundHandle(self.next_handle.fetch_add(1, Ordering::Relaxed));
        self.entries.insert(handle, class);
        handle
    }

    /// Resolve a handle back to its class
    pub fn get(&self, handle: BoundHandle) -> Option<Arc<SubjectClass>> {
        self.entries.get(&handle).map(|entry| entry.clone())
    }

    /// Number of handles ever issued
    pub fn count(&self) -> usize {
        self.entries.len()
    }
}

impl Default for BoundClassTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_get() {
        let table = BoundClassTable::new();
        let class = SubjectClass::new("Widget");

        let handle = table.register(class.clone());
        let resolved = table.get(handle).unwrap();
        assert_eq!(resolved.id(), class.id());
        assert_eq!(table.count(), 1);
    }

    #[test]
    fn test_handles_are_monotonic() {
        let table = BoundClassTable::new();
        let class = SubjectClass::new("Widget");

        let first = table.register(class.clone());
        let second = table.register(class.clone());
        let third = table.register(class);

        assert_eq!(first.raw(), 0);
        assert_eq!(second.raw(), 1);
        assert_eq!(third.raw(), 2);
    }

    #[test]
    fn test_same_class_gets_fresh_handle_per_registration() {
        let table = BoundClassTable::new();
        let class = SubjectClass::new("Widget");

        let first = table.register(class.clone());
        let second = table.register(class.clone());

        assert_ne!(first, second);
        // Both keep resolving to the same class.
        assert_eq!(table.get(first).unwrap().id(), class.id());
        assert_eq!(table.get(second).unwrap().id(), class.id());
        assert_eq!(table.count(), 2);
    }

    #[test]
    fn test_unknown_handle_resolves_to_none() {
        let table = BoundClassTable::new();
        assert!(table.get(BoundHandle(99)).is_none());
    }
}
