//! Policy for identifiers and attributes that do not resolve.
//!
//! The policy is process-wide: rendering pipelines switch it once at startup
//! rather than threading it through every call. It lives in an atomic so
//! concurrent renders observe a consistent setting without locking.

use std::sync::atomic::{AtomicU8, Ordering};

use serde::{Deserialize, Serialize};

use crate::{
    exception::{RenderError, RenderResult, TemplateError},
    expressions::CodeRange,
    value::Value,
};

/// How a missing binding behaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, strum::Display, Serialize, Deserialize)]
pub enum UndefinedPolicy {
    /// Renders as empty, is falsy, and propagates through operations.
    #[default]
    Silent,
    /// Any consumption raises `UndefinedError` naming the missing binding.
    Strict,
    /// Renders as a `[Undefined: name]` diagnostic marker.
    Debug,
}

static POLICY: AtomicU8 = AtomicU8::new(0);

/// Sets the process-wide undefined policy.
pub fn set_undefined_policy(policy: UndefinedPolicy) {
    POLICY.store(policy as u8, Ordering::Relaxed);
}

/// Reads the process-wide undefined policy.
#[must_use]
pub fn undefined_policy() -> UndefinedPolicy {
    match POLICY.load(Ordering::Relaxed) {
        1 => UndefinedPolicy::Strict,
        2 => UndefinedPolicy::Debug,
        _ => UndefinedPolicy::Silent,
    }
}

/// Resolves a missed lookup according to the active policy: either the
/// undefined placeholder carrying the originating name, or an error under
/// the strict policy.
pub(crate) fn resolve_missing(name: &str, position: CodeRange) -> RenderResult<Value> {
    match undefined_policy() {
        UndefinedPolicy::Strict => Err(RenderError::from(TemplateError::undefined(name).at(position))),
        UndefinedPolicy::Silent | UndefinedPolicy::Debug => Ok(Value::undefined(name)),
    }
}
