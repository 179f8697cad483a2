//! The test registry: predicates for `value is test` expressions.

use std::sync::Arc;

use ahash::AHashMap;

use crate::{exception::TemplateError, value::Value};

/// A registered test: `(input, args) -> bool`.
pub type TestFn = Arc<dyn Fn(&Value, &[Value]) -> Result<bool, TemplateError> + Send + Sync>;

/// Name → test map with the built-in predicates installed.
#[derive(Clone)]
pub struct TestRegistry {
    tests: AHashMap<String, TestFn>,
}

impl std::fmt::Debug for TestRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestRegistry").field("len", &self.tests.len()).finish()
    }
}

impl Default for TestRegistry {
    fn default() -> Self {
        let mut registry = Self { tests: AHashMap::new() };
        registry.install_defaults();
        registry
    }
}

impl TestRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        name: impl Into<String>,
        test: impl Fn(&Value, &[Value]) -> Result<bool, TemplateError> + Send + Sync + 'static,
    ) {
        self.tests.insert(name.into(), Arc::new(test));
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<TestFn> {
        self.tests.get(name).cloned()
    }

    fn install_defaults(&mut self) {
        self.register("none", |value, _| Ok(matches!(value, Value::None)));
        self.register("defined", |value, _| Ok(!matches!(value, Value::Undefined { .. })));
        self.register("undefined", |value, _| Ok(matches!(value, Value::Undefined { .. })));
        self.register("string", |value, _| {
            Ok(matches!(value, Value::String(_) | Value::Safe(_)))
        });
        self.register("number", |value, _| {
            Ok(matches!(value, Value::Int(_) | Value::Float(_)))
        });
        self.register("boolean", |value, _| Ok(matches!(value, Value::Bool(_))));
        self.register("sequence", |value, _| {
            Ok(matches!(value, Value::List(_) | Value::String(_) | Value::Safe(_)))
        });
        self.register("mapping", |value, _| Ok(matches!(value, Value::Dict(_))));
        self.register("callable", |value, _| {
            Ok(matches!(value, Value::Callable(_) | Value::Macro(_)))
        });
        self.register("even", |value, _| match value {
            Value::Int(v) => Ok(v % 2 == 0),
            other => Err(wrong_type("even", other)),
        });
        self.register("odd", |value, _| match value {
            Value::Int(v) => Ok(v % 2 != 0),
            other => Err(wrong_type("odd", other)),
        });
        self.register("divisibleby", |value, args| {
            let Value::Int(v) = value else {
                return Err(wrong_type("divisibleby", value));
            };
            match args.first() {
                Some(Value::Int(0)) => Err(TemplateError::value_error("divisibleby: divisor is zero")),
                Some(Value::Int(d)) => Ok(v % d == 0),
                _ => Err(TemplateError::value_error("divisibleby expects an int argument")),
            }
        });
        self.register("upper", |value, _| match value.as_str() {
            Some(s) => Ok(!s.is_empty() && s.chars().all(|c| !c.is_lowercase())),
            None => Err(wrong_type("upper", value)),
        });
        self.register("lower", |value, _| match value.as_str() {
            Some(s) => Ok(!s.is_empty() && s.chars().all(|c| !c.is_uppercase())),
            None => Err(wrong_type("lower", value)),
        });
        self.register("in", |value, args| {
            let container = args
                .first()
                .ok_or_else(|| TemplateError::value_error("'in' test expects a container argument"))?;
            crate::eval::value_contains(container, value)
        });
    }
}

fn wrong_type(test: &str, value: &Value) -> TemplateError {
    TemplateError::type_error(format!("test '{test}' not applicable to {}", value.type_name()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check(name: &str, value: &Value, args: &[Value]) -> bool {
        TestRegistry::new().get(name).expect(name)(value, args).unwrap()
    }

    #[test]
    fn type_predicates() {
        assert!(check("none", &Value::None, &[]));
        assert!(check("string", &Value::from("x"), &[]));
        assert!(check("number", &Value::Float(1.5), &[]));
        assert!(check("mapping", &Value::Dict(indexmap::IndexMap::new()), &[]));
        assert!(!check("sequence", &Value::Int(1), &[]));
    }

    #[test]
    fn parity_tests() {
        assert!(check("even", &Value::Int(4), &[]));
        assert!(check("odd", &Value::Int(-3), &[]));
        assert!(check("divisibleby", &Value::Int(9), &[Value::Int(3)]));
        assert!(!check("divisibleby", &Value::Int(10), &[Value::Int(3)]));
    }

    #[test]
    fn divisibleby_rejects_zero() {
        let err = TestRegistry::new().get("divisibleby").unwrap()(&Value::Int(4), &[Value::Int(0)]).unwrap_err();
        assert!(err.message().contains("zero"));
    }
}
