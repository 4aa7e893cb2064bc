//! Integration tests for the interception lifecycle
//!
//! Tests cover:
//! - Full-fidelity forwarding of intercepted calls to the resolver
//! - Preserved-fallback precedence for advertised operation names
//! - Reversibility of bind, including the permanent sequence-coercion guard
//! - Registry membership semantics across bind/reset cycles
//! - Resolver failure propagation

use std::sync::Arc;

use parking_lot::Mutex;

use doppel_core::{
    coerce_to_sequence, Block, CallDescriptor, DispatchError, DispatchResolver, DispatchResult,
    InjectionRegistry, KeywordArgs, SubjectClass, Value, SEQUENCE_COERCE_SLOT,
};

/// Resolver test double: records every descriptor and returns a scripted
/// result.
struct RecordingResolver {
    calls: Mutex<Vec<CallDescriptor>>,
    result: DispatchResult,
}

impl RecordingResolver {
    fn returning(value: Value) -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            result: Ok(value),
        })
    }

    fn failing(error: DispatchError) -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            result: Err(error),
        })
    }

    fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

impl DispatchResolver for RecordingResolver {
    fn resolve(&self, call: CallDescriptor) -> DispatchResult {
        self.calls.lock().push(call);
        self.result.clone()
    }
}

fn no_kwargs() -> KeywordArgs {
    KeywordArgs::new()
}

#[test]
fn test_unknown_operation_reaches_resolver_with_full_fidelity() {
    let resolver = RecordingResolver::returning(Value::from("resolved"));
    let registry = InjectionRegistry::new(resolver.clone());
    let class = SubjectClass::new("Foo");
    registry.find_or_create(&class).unwrap();

    let instance = class.instantiate();
    let mut kwargs = KeywordArgs::new();
    kwargs.insert("retries".to_string(), Value::Int(3));
    let block = Block::new(|_| Value::Bool(true));

    let result = instance
        .invoke(
            "unknown_op",
            &[Value::Int(1), Value::Int(2)],
            &kwargs,
            Some(&block),
        )
        .unwrap();
    assert_eq!(result, Value::from("resolved"));
    assert_eq!(resolver.call_count(), 1);

    let calls = resolver.calls.lock();
    let descriptor = &calls[0];
    assert_eq!(descriptor.receiver, instance);
    assert_eq!(descriptor.subject_class.id(), class.id());
    assert_eq!(descriptor.method_name, "unknown_op");
    assert_eq!(descriptor.args, vec![Value::Int(1), Value::Int(2)]);
    assert_eq!(descriptor.kwargs.get("retries"), Some(&Value::Int(3)));
    let forwarded = descriptor.block.as_ref().unwrap();
    assert_eq!(forwarded, &block);
    assert_eq!(forwarded.call(&[]), Value::Bool(true));
}

#[test]
fn test_scenario_no_prior_fallback_binds_and_reverses() {
    let resolver = RecordingResolver::returning(Value::Null);
    let registry = InjectionRegistry::new(resolver.clone());
    let class = SubjectClass::new("Foo");

    // Before any bind: undefined-operation failure.
    let instance = class.instantiate();
    let before = instance
        .invoke("unknown_op", &[Value::Int(1), Value::Int(2)], &no_kwargs(), None)
        .unwrap_err();
    assert!(matches!(before, DispatchError::UndefinedMethod { .. }));

    let injection = registry.find_or_create(&class).unwrap();
    instance
        .invoke("unknown_op", &[Value::Int(1), Value::Int(2)], &no_kwargs(), None)
        .unwrap();
    {
        let calls = resolver.calls.lock();
        assert_eq!(calls[0].method_name, "unknown_op");
        assert!(calls[0].kwargs.is_empty());
        assert!(calls[0].block.is_none());
    }

    // After reset the same call raises the same failure as before binding.
    injection.reset().unwrap();
    let after = instance
        .invoke("unknown_op", &[Value::Int(1), Value::Int(2)], &no_kwargs(), None)
        .unwrap_err();
    match (before, after) {
        (
            DispatchError::UndefinedMethod {
                class: class_before,
                method: method_before,
            },
            DispatchError::UndefinedMethod {
                class: class_after,
                method: method_after,
            },
        ) => {
            assert_eq!(class_before, class_after);
            assert_eq!(method_before, method_after);
        }
        other => panic!("unexpected errors: {other:?}"),
    }
    assert_eq!(resolver.call_count(), 1);
}

#[test]
fn test_scenario_custom_fallback_with_capability_probe() {
    let resolver = RecordingResolver::returning(Value::from("from resolver"));
    let registry = InjectionRegistry::new(resolver.clone());

    let class = SubjectClass::new("Bar");
    class.define_fallback(|_| Ok(Value::Int(42))).unwrap();
    class
        .set_capability_probe(|_, name, _| name == "known")
        .unwrap();
    registry.find_or_create(&class).unwrap();

    let instance = class.instantiate();

    // Advertised name: preserved fallback answers, resolver never sees it.
    assert_eq!(
        instance.invoke("known", &[], &no_kwargs(), None).unwrap(),
        Value::Int(42)
    );
    assert_eq!(resolver.call_count(), 0);

    // Unadvertised name: bypasses the custom fallback entirely.
    assert_eq!(
        instance.invoke("other", &[], &no_kwargs(), None).unwrap(),
        Value::from("from resolver")
    );
    assert_eq!(resolver.call_count(), 1);
    assert_eq!(resolver.calls.lock()[0].method_name, "other");
}

#[test]
fn test_registry_membership_across_lifecycle() {
    let resolver = RecordingResolver::returning(Value::Null);
    let registry = InjectionRegistry::new(resolver);
    let class = SubjectClass::new("Tracked");

    assert!(!registry.exists(&class));
    let injection = registry.find_or_create(&class).unwrap();
    assert!(registry.exists(&class));

    // The record persists; only the installed behavior is reversed.
    injection.reset().unwrap();
    assert!(registry.exists(&class));
    assert!(!injection.bound());
}

#[test]
fn test_bind_is_idempotent_through_registry() {
    let resolver = RecordingResolver::returning(Value::Null);
    let registry = InjectionRegistry::new(resolver);
    let class = SubjectClass::new("Once");

    let first = registry.find_or_create(&class).unwrap();
    let second = registry.find_or_create(&class).unwrap();
    first.bind().unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(registry.bound_classes().count(), 1);
}

#[test]
fn test_resolver_failure_propagates_unchanged() {
    let resolver = RecordingResolver::failing(DispatchError::UnmatchedExpectation {
        method: "fetch".to_string(),
        reason: "no stub configured".to_string(),
    });
    let registry = InjectionRegistry::new(resolver);
    let class = SubjectClass::new("Strict");
    registry.find_or_create(&class).unwrap();

    let instance = class.instantiate();
    let err = instance
        .invoke("fetch", &[], &no_kwargs(), None)
        .unwrap_err();
    match err {
        DispatchError::UnmatchedExpectation { method, reason } => {
            assert_eq!(method, "fetch");
            assert_eq!(reason, "no stub configured");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn test_sequence_guard_persists_after_reset() {
    let resolver = RecordingResolver::returning(Value::Null);
    let registry = InjectionRegistry::new(resolver.clone());
    let class = SubjectClass::new("Guarded");

    assert!(!class.instance_method_defined(SEQUENCE_COERCE_SLOT));
    let injection = registry.find_or_create(&class).unwrap();
    injection.reset().unwrap();

    // Restoration is complete except for this documented residue.
    assert!(class.instance_method_defined(SEQUENCE_COERCE_SLOT));
    let value = Value::Instance(class.instantiate());
    assert_eq!(coerce_to_sequence(&value).unwrap(), None);
    assert_eq!(resolver.call_count(), 0);
}

#[test]
fn test_handles_accumulate_and_stay_valid_across_rebind_cycles() {
    let resolver = RecordingResolver::returning(Value::Null);
    let registry = InjectionRegistry::new(resolver.clone());
    let class = SubjectClass::new("Cycled");

    let injection = registry.find_or_create(&class).unwrap();
    for _ in 0..3 {
        injection.reset().unwrap();
        injection.bind().unwrap();
    }

    // One handle per effective bind, none reclaimed.
    assert_eq!(registry.bound_classes().count(), 4);

    // The freshly installed hook still routes to the resolver.
    let instance = class.instantiate();
    instance.invoke("ping", &[], &no_kwargs(), None).unwrap();
    assert_eq!(resolver.call_count(), 1);
    assert_eq!(resolver.calls.lock()[0].subject_class.id(), class.id());
}

#[test]
fn test_inherited_custom_fallback_is_preserved() {
    let resolver = RecordingResolver::returning(Value::Null);
    let registry = InjectionRegistry::new(resolver.clone());

    let parent = SubjectClass::new("Base");
    parent.define_fallback(|_| Ok(Value::Int(9))).unwrap();
    let child = SubjectClass::with_parent("Derived", parent);
    child.set_capability_probe(|_, _, _| true).unwrap();

    let injection = registry.find_or_create(&child).unwrap();
    let instance = child.instantiate();

    // Every name is advertised, so the inherited fallback keeps answering.
    assert_eq!(
        instance.invoke("whatever", &[], &no_kwargs(), None).unwrap(),
        Value::Int(9)
    );
    assert_eq!(resolver.call_count(), 0);

    injection.reset().unwrap();
    assert_eq!(
        instance.invoke("whatever", &[], &no_kwargs(), None).unwrap(),
        Value::Int(9)
    );
}
