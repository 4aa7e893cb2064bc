//! Registry of injection records, at most one per class

use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::dispatch::DispatchResolver;
use crate::injections::bound_classes::BoundClassTable;
use crate::injections::fallback_injection::FallbackInjection;
use crate::object::{ClassId, ObjectResult, SubjectClass};

/// Owns the resolver handle, the bound-class table, and one injection
/// record per class.
///
/// Creation-on-demand is the only construction path for records: a record
/// is bound immediately when created, so no record exists without having
/// been bound at least once. Records persist across `reset` — only the
/// installed behavior is reversed.
pub struct InjectionRegistry {
    resolver: Arc<dyn DispatchResolver>,
    bound_classes: Arc<BoundClassTable>,
    records: Mutex<FxHashMap<ClassId, Arc<FallbackInjection>>>,
}

impl InjectionRegistry {
    /// Create a registry forwarding intercepted calls to `resolver`
    pub fn new(resolver: Arc<dyn DispatchResolver>) -> Self {
        Self {
            resolver,
            bound_classes: Arc::new(BoundClassTable::new()),
            records: Mutex::new(FxHashMap::default()),
        }
    }

    /// Return the record for `subject_class`, creating and binding one if
    /// absent.
    ///
    /// Idempotent: repeated calls for the same class return the same
    /// record. Fails only when binding cannot mutate the class (frozen),
    /// in which case no record is retained.
    pub fn find_or_create(
        &self,
        subject_class: &Arc<SubjectClass>,
    ) -> ObjectResult<Arc<FallbackInjection>> {
        let mut records = self.records.lock();
        if let Some(existing) = records.get(&subject_class.id()) {
            return Ok(existing.clone());
        }

        let injection = Arc::new(FallbackInjection::new(
            subject_class.clone(),
            self.resolver.clone(),
            self.bound_classes.clone(),
        ));
        injection.bind()?;
        records.insert(subject_class.id(), injection.clone());
        Ok(injection)
    }

    /// Whether a record has been created for this class.
    ///
    /// Keyed strictly by [`ClassId`]; remains true after `reset`, since
    /// records persist and only installed behavior is reversed.
    pub fn exists(&self, subject_class: &Arc<SubjectClass>) -> bool {
        self.records.lock().contains_key(&subject_class.id())
    }

    /// Reset every record, keeping the records themselves.
    ///
    /// Per-test teardown sweep: restores original fallback behavior on all
    /// classes this registry ever bound.
    pub fn reset_all(&self) -> ObjectResult<()> {
        let records: Vec<_> = self.records.lock().values().cloned().collect();
        for record in records {
            record.reset()?;
        }
        Ok(())
    }

    /// Table of classes hooks were generated for
    pub fn bound_classes(&self) -> &Arc<BoundClassTable> {
        &self.bound_classes
    }
}
