//! Construction of the `loop` metadata binding for for-loop bodies.

use indexmap::IndexMap;

use crate::{
    exception::TemplateError,
    value::{HostFunction, Value},
};

/// Builds the `loop` dict for one iteration.
///
/// Keys: `index` (1-based), `index0`, `revindex`, `revindex0`, `first`,
/// `last`, `length`, plus a `cycle(...)` callable that selects among its
/// arguments by the current index. A fresh dict is built per iteration so a
/// body that stashes `loop` into a list observes the values of its own
/// iteration, not the final one.
#[must_use]
pub(crate) fn loop_info(index0: usize, length: usize) -> Value {
    let index = index0 + 1;
    let mut map = IndexMap::new();
    map.insert("index".to_owned(), Value::Int(index as i64));
    map.insert("index0".to_owned(), Value::Int(index0 as i64));
    map.insert("revindex".to_owned(), Value::Int((length - index0) as i64));
    map.insert("revindex0".to_owned(), Value::Int((length - index) as i64));
    map.insert("first".to_owned(), Value::Bool(index0 == 0));
    map.insert("last".to_owned(), Value::Bool(index == length));
    map.insert("length".to_owned(), Value::Int(length as i64));
    map.insert(
        "cycle".to_owned(),
        Value::Callable(HostFunction::new(move |positional: &[Value], _| {
            if positional.is_empty() {
                return Err(TemplateError::value_error("loop.cycle() needs at least one value"));
            }
            Ok(positional[index0 % positional.len()].clone())
        })),
    );
    Value::Dict(map)
}
