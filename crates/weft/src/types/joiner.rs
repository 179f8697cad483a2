//! The `joiner()` helper: emits nothing first, a separator thereafter.

use std::sync::{Arc, Mutex, PoisonError};

use indexmap::IndexMap;

use crate::value::{HostFunction, Value};

/// Builds a joiner callable for the given separator.
///
/// The first invocation returns an empty string, every later one returns the
/// separator. The classic use is comma-separating output produced inside a
/// conditional loop body.
#[must_use]
pub fn joiner(separator: impl Into<String>) -> Value {
    let separator = separator.into();
    let used = Arc::new(Mutex::new(false));
    Value::Callable(HostFunction::new(move |_, _| {
        let mut used = used.lock().unwrap_or_else(PoisonError::into_inner);
        if *used {
            Ok(Value::Safe(separator.clone()))
        } else {
            *used = true;
            Ok(Value::Safe(String::new()))
        }
    }))
}

/// The `joiner(sep=", ")` global constructor.
pub(crate) fn joiner_constructor() -> Value {
    Value::Callable(HostFunction::new(
        |positional: &[Value], named: &IndexMap<String, Value>| {
            let separator = positional
                .first()
                .or_else(|| named.get("sep"))
                .map_or_else(|| ", ".to_owned(), ToString::to_string);
            Ok(joiner(separator))
        },
    ))
}
