//! Call descriptors and the expectation-resolver boundary
//!
//! The interception hook packages every intercepted call into a
//! [`CallDescriptor`] and hands it to the embedder-supplied
//! [`DispatchResolver`]. Resolver failures propagate unchanged to the
//! caller of the intercepted operation; that is the path by which
//! unmatched-expectation failures become visible as test failures.

use std::fmt;
use std::sync::Arc;

use crate::object::{Instance, SubjectClass};
use crate::value::{Block, KeywordArgs, Value};

/// Name under which a class's prior fallback definition is preserved while
/// an interception hook occupies the hook slot.
///
/// Reserved: user code must not define methods under this name.
pub const PRESERVED_FALLBACK_ALIAS: &str = "__doppel_original_fallback__";

/// Errors surfaced by dynamic dispatch and the resolver
#[derive(Debug, Clone, thiserror::Error)]
pub enum DispatchError {
    /// No defined method and no fallback handled the call
    #[error("undefined method `{method}` for instance of `{class}`")]
    UndefinedMethod {
        /// Class of the receiver
        class: String,
        /// Operation name that failed to dispatch
        method: String,
    },

    /// The resolver had no expectation matching the intercepted call
    #[error("no expectation matches `{method}`: {reason}")]
    UnmatchedExpectation {
        /// Intercepted operation name
        method: String,
        /// Resolver-provided explanation
        reason: String,
    },

    /// Resolver-internal failure
    #[error("dispatch failed: {0}")]
    ResolverFailure(String),
}

/// Result of a dynamic dispatch
pub type DispatchResult = Result<Value, DispatchError>;

/// Everything the resolver needs to match an intercepted call against
/// configured expectations.
pub struct CallDescriptor {
    /// Instance the call was made on
    pub receiver: Instance,
    /// Class the interception hook was bound to
    pub subject_class: Arc<SubjectClass>,
    /// Intercepted operation name
    pub method_name: String,
    /// Positional arguments, exactly as passed
    pub args: Vec<Value>,
    /// Keyword arguments, exactly as passed (empty when the host carries no
    /// separate keyword channel)
    pub kwargs: KeywordArgs,
    /// Trailing block, if one was passed
    pub block: Option<Block>,
}

impl fmt::Debug for CallDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallDescriptor")
            .field("receiver", &self.receiver)
            .field("subject_class", &self.subject_class.name())
            .field("method_name", &self.method_name)
            .field("args", &self.args)
            .field("kwargs", &self.kwargs)
            .field("block", &self.block.is_some())
            .finish()
    }
}

/// External expectation-matching engine.
///
/// Implementations decide what an intercepted call returns; this core only
/// guarantees that every call reaches `resolve` with full fidelity and that
/// the original class behavior can be restored afterward.
pub trait DispatchResolver: Send + Sync {
    /// Match one intercepted call against configured expectations.
    ///
    /// Errors propagate unchanged to the caller of the intercepted
    /// operation.
    fn resolve(&self, call: CallDescriptor) -> DispatchResult;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = DispatchError::UndefinedMethod {
            class: "Widget".to_string(),
            method: "spin".to_string(),
        };
        assert_eq!(err.to_string(), "undefined method `spin` for instance of `Widget`");

        let err = DispatchError::UnmatchedExpectation {
            method: "spin".to_string(),
            reason: "no stub configured".to_string(),
        };
        assert_eq!(err.to_string(), "no expectation matches `spin`: no stub configured");
    }

    #[test]
    fn test_descriptor_debug_includes_class_and_name() {
        let class = SubjectClass::new("Widget");
        let descriptor = CallDescriptor {
            receiver: class.instantiate(),
            subject_class: class,
            method_name: "spin".to_string(),
            args: vec![Value::Int(1)],
            kwargs: KeywordArgs::new(),
            block: None,
        };

        let rendered = format!("{:?}", descriptor);
        assert!(rendered.contains("Widget"));
        assert!(rendered.contains("spin"));
    }
}
