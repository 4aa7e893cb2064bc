//! Per-class injection record: takes over and restores the fallback slot

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::caps;
use crate::dispatch::{
    CallDescriptor, DispatchError, DispatchResolver, DispatchResult, PRESERVED_FALLBACK_ALIAS,
};
use crate::injections::bound_classes::{BoundClassTable, BoundHandle};
use crate::object::{
    MethodCall, ObjectResult, SubjectClass, Visibility, FALLBACK_SLOT, SEQUENCE_COERCE_SLOT,
};
use crate::value::{KeywordArgs, Value};

/// Bind/reset lifecycle state for one class.
///
/// While bound, the class's fallback slot holds the interception hook and
/// the behavior that previously occupied the slot is reachable under
/// [`PRESERVED_FALLBACK_ALIAS`]. `bind` and `reset` are both idempotent,
/// and a record can cycle bind → reset → bind any number of times.
///
/// The fallback slot must be owned by at most one interception layer at a
/// time. A second layer rewriting the slot on the same class is a
/// precondition violation: the last writer wins and restoration order is
/// unspecified.
pub struct FallbackInjection {
    subject_class: Arc<SubjectClass>,
    resolver: Arc<dyn DispatchResolver>,
    bound_classes: Arc<BoundClassTable>,
    placeholder_installed: AtomicBool,
}

impl FallbackInjection {
    pub(crate) fn new(
        subject_class: Arc<SubjectClass>,
        resolver: Arc<dyn DispatchResolver>,
        bound_classes: Arc<BoundClassTable>,
    ) -> Self {
        Self {
            subject_class,
            resolver,
            bound_classes,
            placeholder_installed: AtomicBool::new(false),
        }
    }

    /// Class this record was created for
    pub fn subject_class(&self) -> &Arc<SubjectClass> {
        &self.subject_class
    }

    /// Whether the last effective bind installed a placeholder fallback
    /// because the class had none of its own
    pub fn placeholder_installed(&self) -> bool {
        self.placeholder_installed.load(Ordering::Relaxed)
    }

    /// Whether interception is currently installed, derived from the
    /// presence of the preserved-alias entry on the class
    pub fn bound(&self) -> bool {
        self.subject_class.has_own_method(PRESERVED_FALLBACK_ALIAS)
    }

    /// Install the interception hook, preserving recoverability.
    ///
    /// No-op when the preserved alias already exists on the class. The only
    /// failure mode is method-table mutation on a frozen class, which is a
    /// precondition violation and surfaces immediately.
    pub fn bind(&self) -> ObjectResult<()> {
        if self.subject_class.has_own_method(PRESERVED_FALLBACK_ALIAS) {
            return Ok(());
        }

        let had_fallback = self.subject_class.instance_method_defined(FALLBACK_SLOT);
        self.placeholder_installed
            .store(!had_fallback, Ordering::Relaxed);
        if !had_fallback {
            // Placeholder whose only behavior is deferring to the inherited
            // fallback chain, so the alias step always has something to
            // preserve.
            let parent = self.subject_class.parent().cloned();
            self.subject_class
                .define_method(FALLBACK_SLOT, Visibility::Private, move |call| {
                    call.receiver.invoke_fallback_from(
                        parent.as_ref(),
                        call.name,
                        call.args,
                        call.kwargs,
                        call.block,
                    )
                })?;
        }

        // Decomposition machinery probes this slot through full dynamic
        // dispatch while the hook owns the fallback slot; without a
        // definition the probe itself would reach the resolver.
        if !self
            .subject_class
            .instance_method_defined(SEQUENCE_COERCE_SLOT)
        {
            self.subject_class
                .define_method(SEQUENCE_COERCE_SLOT, Visibility::Public, |_| Ok(Value::Null))?;
        }

        self.subject_class
            .alias_method(PRESERVED_FALLBACK_ALIAS, FALLBACK_SLOT)?;
        self.install_hook()?;
        Ok(())
    }

    /// Remove the interception hook and restore the preserved behavior.
    ///
    /// No-op when interception was never bound or already reset. The
    /// sequence-coercion definition installed by `bind` is permanent and is
    /// not removed here.
    pub fn reset(&self) -> ObjectResult<()> {
        if !self.subject_class.has_own_method(PRESERVED_FALLBACK_ALIAS) {
            return Ok(());
        }

        self.subject_class.remove_method(FALLBACK_SLOT)?;
        if !self.placeholder_installed() {
            self.subject_class
                .alias_method(FALLBACK_SLOT, PRESERVED_FALLBACK_ALIAS)?;
        }
        self.subject_class.remove_method(PRESERVED_FALLBACK_ALIAS)?;
        Ok(())
    }

    fn install_hook(&self) -> ObjectResult<()> {
        let handle = self.bound_classes.register(self.subject_class.clone());
        let hook = make_hook(
            handle,
            self.bound_classes.clone(),
            self.resolver.clone(),
            caps::keyword_arguments_supported(),
        );
        self.subject_class
            .define_method(FALLBACK_SLOT, Visibility::Private, hook)
    }
}

/// Generate the interception hook installed into a class's fallback slot.
///
/// The hook captures only the handle value, not the class itself, and
/// resolves it through the table at call time; the forwarding shape is
/// fixed by `keyword_channel` once at generation time, not per call.
pub(crate) fn make_hook(
    handle: BoundHandle,
    bound_classes: Arc<BoundClassTable>,
    resolver: Arc<dyn DispatchResolver>,
    keyword_channel: bool,
) -> impl for<'a> Fn(&MethodCall<'a>) -> DispatchResult + Send + Sync + 'static {
    move |call| {
        if call.receiver.responds_to(call.name, true) {
            return forward_to_preserved(call);
        }

        let subject_class = bound_classes.get(handle).ok_or_else(|| {
            DispatchError::ResolverFailure(format!("no bound class for handle {}", handle.raw()))
        })?;

        let (args, kwargs) = if keyword_channel {
            (call.args.to_vec(), call.kwargs.clone())
        } else {
            let mut args = call.args.to_vec();
            if !call.kwargs.is_empty() {
                args.push(Value::Map(call.kwargs.clone()));
            }
            (args, KeywordArgs::new())
        };

        resolver.resolve(CallDescriptor {
            receiver: call.receiver.clone(),
            subject_class,
            method_name: call.name.to_string(),
            args,
            kwargs,
            block: call.block.cloned(),
        })
    }
}

/// Forward a call to the preserved fallback with identical arguments
fn forward_to_preserved(call: &MethodCall<'_>) -> DispatchResult {
    match call.receiver.class().resolve_entry(PRESERVED_FALLBACK_ALIAS) {
        Some(entry) => (entry.body)(call),
        None => Err(DispatchError::UndefinedMethod {
            class: call.receiver.class().name().to_string(),
            method: call.name.to_string(),
        }),
    }
}
