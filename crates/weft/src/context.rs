//! Variable scopes and the autoescape-aware wrapper around them.

use std::sync::Arc;

use indexmap::IndexMap;

use crate::{
    escape::{AutoEscaper, EscapeContext},
    value::Value,
};

/// A scoped variable map.
///
/// Scoping is structural: entering a loop body, macro body, block, or import
/// clones the context, and the child shadows the parent without ever
/// mutating it. Dropping the child restores the parent's view implicitly.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Context {
    vars: IndexMap<String, Value>,
}

impl Context {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a context from a JSON object. Non-object documents carry no
    /// variable names and yield an empty context.
    #[must_use]
    pub fn from_json(json: serde_json::Value) -> Self {
        match Value::from_json(json) {
            Value::Dict(map) => Self { vars: map },
            _ => Self::new(),
        }
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.vars.get(name)
    }

    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.vars.insert(name.into(), value);
    }

    /// Creates an independent child scope. Writes to the child are invisible
    /// to this context.
    #[must_use]
    pub fn scoped(&self) -> Self {
        self.clone()
    }

    /// Snapshot of every visible variable.
    #[must_use]
    pub fn all(&self) -> &IndexMap<String, Value> {
        &self.vars
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

impl FromIterator<(String, Value)> for Context {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            vars: iter.into_iter().collect(),
        }
    }
}

/// A [`Context`] plus the active escaping policy.
///
/// The evaluator threads one of these through the whole render; scoped
/// clones share the escaper installation (cheap pointer clone) while the
/// variable map forks.
#[derive(Debug, Clone, Default)]
pub struct ContextWrapper {
    context: Context,
    autoescaper: Option<Arc<dyn AutoEscaper>>,
    escape_context: EscapeContext,
}

impl ContextWrapper {
    #[must_use]
    pub fn new(context: Context) -> Self {
        Self {
            context,
            autoescaper: None,
            escape_context: EscapeContext::default(),
        }
    }

    #[must_use]
    pub fn with_escaper(context: Context, escaper: Arc<dyn AutoEscaper>) -> Self {
        Self {
            context,
            autoescaper: Some(escaper),
            escape_context: EscapeContext::default(),
        }
    }

    /// True iff an autoescaper is installed.
    #[must_use]
    pub fn is_autoescape_enabled(&self) -> bool {
        self.autoescaper.is_some()
    }

    #[must_use]
    pub fn auto_escaper(&self) -> Option<&Arc<dyn AutoEscaper>> {
        self.autoescaper.as_ref()
    }

    pub fn set_auto_escaper(&mut self, escaper: Option<Arc<dyn AutoEscaper>>) {
        self.autoescaper = escaper;
    }

    #[must_use]
    pub fn escape_context(&self) -> EscapeContext {
        self.escape_context
    }

    pub fn set_escape_context(&mut self, escape_context: EscapeContext) {
        self.escape_context = escape_context;
    }

    /// Child scope with the same escaping policy.
    #[must_use]
    pub fn scoped(&self) -> Self {
        Self {
            context: self.context.scoped(),
            autoescaper: self.autoescaper.clone(),
            escape_context: self.escape_context,
        }
    }

    /// Same escaping policy over a different variable scope. Used by macro
    /// invocation, which evaluates its body in the macro's definition
    /// context rather than the caller's.
    #[must_use]
    pub fn rescoped(&self, context: Context) -> Self {
        Self {
            context,
            autoescaper: self.autoescaper.clone(),
            escape_context: self.escape_context,
        }
    }

    #[must_use]
    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut Context {
        &mut self.context
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.context.get(name)
    }

    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.context.set(name, value);
    }
}

impl From<Context> for ContextWrapper {
    fn from(context: Context) -> Self {
        Self::new(context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn child_writes_are_invisible_to_parent() {
        let mut parent = Context::new();
        parent.set("x", Value::Int(1));

        let mut child = parent.scoped();
        child.set("x", Value::Int(2));
        child.set("y", Value::Int(3));

        assert_eq!(parent.get("x"), Some(&Value::Int(1)));
        assert_eq!(parent.get("y"), None);
        assert_eq!(child.get("x"), Some(&Value::Int(2)));
    }

    #[test]
    fn autoescape_enabled_iff_escaper_installed() {
        let wrapper = ContextWrapper::new(Context::new());
        assert!(!wrapper.is_autoescape_enabled());

        let escaper: Arc<dyn AutoEscaper> = Arc::new(crate::escape::DefaultEscaper);
        let wrapper = ContextWrapper::with_escaper(Context::new(), escaper);
        assert!(wrapper.is_autoescape_enabled());
    }
}
