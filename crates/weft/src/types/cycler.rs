//! The `cycler()` helper: cycles through a fixed value list.

use std::sync::{Arc, Mutex};

use indexmap::IndexMap;

use crate::{
    exception::TemplateError,
    value::{AttrAccess, HostFunction, Value},
};

/// Cycles through a fixed list of values.
///
/// `next()` returns the current value and advances; `current` reads without
/// advancing; `reset()` rewinds to the first value. The position lives in a
/// mutex because helper objects are shared by `Arc` and may be read from a
/// batch filter worker.
#[derive(Debug)]
pub struct Cycler {
    items: Vec<Value>,
    index: Mutex<usize>,
}

impl Cycler {
    #[must_use]
    pub fn new(items: Vec<Value>) -> Self {
        Self {
            items,
            index: Mutex::new(0),
        }
    }

    fn current(&self) -> Value {
        let index = *self.index.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        self.items.get(index).cloned().unwrap_or_default()
    }

    fn advance(&self) -> Value {
        let mut index = self.index.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let value = self.items.get(*index).cloned().unwrap_or_default();
        *index = (*index + 1) % self.items.len().max(1);
        value
    }

    fn reset(&self) {
        *self.index.lock().unwrap_or_else(std::sync::PoisonError::into_inner) = 0;
    }
}

impl AttrAccess for Cycler {
    fn attr(self: Arc<Self>, name: &str) -> Option<Value> {
        match name {
            "current" => Some(self.current()),
            "next" => {
                let cycler = Arc::clone(&self);
                Some(Value::Callable(HostFunction::new(move |_, _| Ok(cycler.advance()))))
            }
            "reset" => {
                let cycler = Arc::clone(&self);
                Some(Value::Callable(HostFunction::new(move |_, _| {
                    cycler.reset();
                    Ok(Value::None)
                })))
            }
            _ => None,
        }
    }

    fn type_name(&self) -> &'static str {
        "cycler"
    }
}

/// The `cycler(...)` global constructor.
pub(crate) fn cycler_constructor() -> Value {
    Value::Callable(HostFunction::new(
        |positional: &[Value], _named: &IndexMap<String, Value>| {
            if positional.is_empty() {
                return Err(TemplateError::value_error("cycler() needs at least one value"));
            }
            Ok(Value::Object(Arc::new(Cycler::new(positional.to_vec()))))
        },
    ))
}
