//! The filter registry and the built-in filter set.
//!
//! A filter is a pure function from a value plus evaluated arguments to a
//! new value. The evaluator flattens `x | a | b(arg)` into one input
//! evaluation followed by in-order application; the registry only resolves
//! names. Chain mechanics live in the evaluator, batch mechanics in the
//! environment.

use std::sync::Arc;

use ahash::AHashMap;

use crate::{
    escape::escape_html,
    value::Value,
    exception::TemplateError,
};

/// A registered filter function: `(input, args) -> output`.
pub type FilterFn = Arc<dyn Fn(&Value, &[Value]) -> Result<Value, TemplateError> + Send + Sync>;

/// Name → filter map. Construction installs the built-in set; hosts may
/// register more or override by name.
#[derive(Clone)]
pub struct FilterRegistry {
    filters: AHashMap<String, FilterFn>,
}

impl std::fmt::Debug for FilterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterRegistry").field("len", &self.filters.len()).finish()
    }
}

impl Default for FilterRegistry {
    fn default() -> Self {
        let mut registry = Self {
            filters: AHashMap::new(),
        };
        registry.install_defaults();
        registry
    }
}

impl FilterRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        name: impl Into<String>,
        filter: impl Fn(&Value, &[Value]) -> Result<Value, TemplateError> + Send + Sync + 'static,
    ) {
        self.filters.insert(name.into(), Arc::new(filter));
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<FilterFn> {
        self.filters.get(name).cloned()
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.filters.contains_key(name)
    }

    fn install_defaults(&mut self) {
        self.register("upper", |value, _| Ok(Value::String(value.to_string().to_uppercase())));
        self.register("lower", |value, _| Ok(Value::String(value.to_string().to_lowercase())));
        self.register("capitalize", |value, _| {
            let s = value.to_string();
            let mut chars = s.chars();
            let capitalized = match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase(),
                None => String::new(),
            };
            Ok(Value::String(capitalized))
        });
        self.register("title", |value, _| {
            let s = value.to_string();
            let mut out = String::with_capacity(s.len());
            let mut at_word_start = true;
            for c in s.chars() {
                if at_word_start {
                    out.extend(c.to_uppercase());
                } else {
                    out.extend(c.to_lowercase());
                }
                at_word_start = c.is_whitespace();
            }
            Ok(Value::String(out))
        });
        self.register("trim", |value, _| Ok(Value::String(value.to_string().trim().to_owned())));
        let length: FilterFn = Arc::new(|value: &Value, _: &[Value]| match value {
            Value::String(s) | Value::Safe(s) => Ok(Value::Int(s.chars().count() as i64)),
            Value::List(items) => Ok(Value::Int(items.len() as i64)),
            Value::Dict(map) => Ok(Value::Int(map.len() as i64)),
            other => Err(TemplateError::type_error(format!(
                "value of type {} has no length",
                other.type_name()
            ))),
        });
        self.filters.insert("length".to_owned(), Arc::clone(&length));
        self.filters.insert("count".to_owned(), length);
        self.register("first", |value, _| {
            Ok(value.make_iterable()?.into_iter().next().unwrap_or_else(|| Value::undefined("first")))
        });
        self.register("last", |value, _| {
            Ok(value.make_iterable()?.into_iter().next_back().unwrap_or_else(|| Value::undefined("last")))
        });
        self.register("reverse", |value, _| match value {
            Value::String(s) | Value::Safe(s) => Ok(Value::String(s.chars().rev().collect())),
            other => {
                let mut items = other.make_iterable()?;
                items.reverse();
                Ok(Value::List(items))
            }
        });
        self.register("join", |value, args| {
            let separator = args.first().map(ToString::to_string).unwrap_or_default();
            let parts: Vec<String> = value.make_iterable()?.iter().map(ToString::to_string).collect();
            Ok(Value::String(parts.join(&separator)))
        });
        self.register("default", |value, args| {
            let fallback = args.first().cloned().unwrap_or_default();
            match value {
                Value::Undefined { .. } | Value::None => Ok(fallback),
                other => Ok(other.clone()),
            }
        });
        self.register("replace", |value, args| {
            let [from, to] = args else {
                return Err(TemplateError::value_error("replace expects two arguments"));
            };
            Ok(Value::String(
                value.to_string().replace(&from.to_string(), &to.to_string()),
            ))
        });
        self.register("abs", |value, _| match value {
            Value::Int(v) => Ok(Value::Int(v.abs())),
            Value::Float(v) => Ok(Value::Float(v.abs())),
            other => Err(TemplateError::type_error(format!(
                "abs expects a number, got {}",
                other.type_name()
            ))),
        });
        self.register("round", |value, args| {
            let digits = match args.first() {
                Some(Value::Int(d)) => *d,
                None => 0,
                Some(other) => {
                    return Err(TemplateError::type_error(format!(
                        "round digits must be an int, got {}",
                        other.type_name()
                    )));
                }
            };
            let factor = 10f64.powi(digits as i32);
            match value {
                Value::Int(v) => Ok(Value::Int(*v)),
                Value::Float(v) => Ok(Value::Float((v * factor).round() / factor)),
                other => Err(TemplateError::type_error(format!(
                    "round expects a number, got {}",
                    other.type_name()
                ))),
            }
        });
        self.register("int", |value, _| match value {
            Value::Int(v) => Ok(Value::Int(*v)),
            Value::Float(v) => Ok(Value::Int(*v as i64)),
            Value::Bool(b) => Ok(Value::Int(i64::from(*b))),
            Value::String(s) | Value::Safe(s) => s
                .trim()
                .parse::<i64>()
                .map(Value::Int)
                .map_err(|_| TemplateError::value_error(format!("cannot convert {s:?} to int"))),
            other => Err(TemplateError::type_error(format!(
                "cannot convert {} to int",
                other.type_name()
            ))),
        });
        self.register("float", |value, _| match value {
            Value::Int(v) => Ok(Value::Float(*v as f64)),
            Value::Float(v) => Ok(Value::Float(*v)),
            Value::String(s) | Value::Safe(s) => s
                .trim()
                .parse::<f64>()
                .map(Value::Float)
                .map_err(|_| TemplateError::value_error(format!("cannot convert {s:?} to float"))),
            other => Err(TemplateError::type_error(format!(
                "cannot convert {} to float",
                other.type_name()
            ))),
        });
        self.register("string", |value, _| Ok(Value::String(value.to_string())));
        self.register("list", |value, _| Ok(Value::List(value.make_iterable()?)));
        self.register("sort", |value, _| {
            let mut items = value.make_iterable()?;
            let mut failed = false;
            items.sort_by(|a, b| {
                a.try_cmp(b).unwrap_or_else(|| {
                    failed = true;
                    std::cmp::Ordering::Equal
                })
            });
            if failed {
                return Err(TemplateError::type_error("sort: values are not comparable"));
            }
            Ok(Value::List(items))
        });
        self.register("unique", |value, _| {
            let mut seen: Vec<Value> = Vec::new();
            for item in value.make_iterable()? {
                if !seen.contains(&item) {
                    seen.push(item);
                }
            }
            Ok(Value::List(seen))
        });
        self.register("safe", |value, _| match value {
            Value::Safe(s) => Ok(Value::Safe(s.clone())),
            other => Ok(Value::Safe(other.output_string())),
        });
        self.register("escape", |value, _| match value {
            Value::Safe(s) => Ok(Value::Safe(s.clone())),
            other => Ok(Value::Safe(escape_html(&other.output_string()))),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn apply(registry: &FilterRegistry, name: &str, value: &Value, args: &[Value]) -> Value {
        registry.get(name).expect(name)(value, args).unwrap()
    }

    #[test]
    fn string_filters() {
        let registry = FilterRegistry::new();
        assert_eq!(apply(&registry, "upper", &Value::from("abc"), &[]), Value::from("ABC"));
        assert_eq!(apply(&registry, "trim", &Value::from("  x "), &[]), Value::from("x"));
        assert_eq!(apply(&registry, "capitalize", &Value::from("hello WORLD"), &[]), Value::from("Hello world"));
        assert_eq!(
            apply(&registry, "replace", &Value::from("a-b"), &[Value::from("-"), Value::from("+")]),
            Value::from("a+b")
        );
    }

    #[test]
    fn length_counts_chars_items_and_keys() {
        let registry = FilterRegistry::new();
        assert_eq!(apply(&registry, "length", &Value::from("héllo"), &[]), Value::Int(5));
        assert_eq!(
            apply(&registry, "length", &Value::from(vec![1i64, 2, 3]), &[]),
            Value::Int(3)
        );
        let err = registry.get("length").unwrap()(&Value::Int(5), &[]).unwrap_err();
        assert!(err.message().contains("no length"));
    }

    #[test]
    fn join_coerces_items() {
        let registry = FilterRegistry::new();
        assert_eq!(
            apply(&registry, "join", &Value::from(vec![1i64, 2]), &[Value::from(", ")]),
            Value::from("1, 2")
        );
    }

    #[test]
    fn default_fills_none_and_undefined_only() {
        let registry = FilterRegistry::new();
        let fallback = [Value::from("x")];
        assert_eq!(apply(&registry, "default", &Value::undefined("v"), &fallback), Value::from("x"));
        assert_eq!(apply(&registry, "default", &Value::None, &fallback), Value::from("x"));
        assert_eq!(apply(&registry, "default", &Value::Int(0), &fallback), Value::Int(0));
    }

    #[test]
    fn sort_rejects_mixed_types() {
        let registry = FilterRegistry::new();
        let mixed = Value::List(vec![Value::Int(1), Value::from("a")]);
        let err = registry.get("sort").unwrap()(&mixed, &[]).unwrap_err();
        assert!(err.message().contains("not comparable"));
    }

    #[test]
    fn escape_marks_output_safe() {
        let registry = FilterRegistry::new();
        assert_eq!(
            apply(&registry, "escape", &Value::from("<b>"), &[]),
            Value::Safe("&lt;b&gt;".to_owned())
        );
    }
}
