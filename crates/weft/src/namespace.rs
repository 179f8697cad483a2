//! Macros and template namespaces.
//!
//! A macro is a closure: it captures a structural snapshot of the context at
//! its definition site, so later assignments in the defining scope do not
//! leak into macro evaluation. A namespace is the exported view of an
//! imported template: its top-level macros and `set` variables.

use std::sync::Arc;

use indexmap::IndexMap;

use crate::{
    context::Context,
    exception::TemplateError,
    expressions::ExprLoc,
    nodes::{AssignTarget, MacroParam, Node},
    value::Value,
};

/// A macro and the context it closed over.
#[derive(Debug)]
pub struct MacroValue {
    pub name: String,
    /// Parameters in declaration order; defaults stay unevaluated until call.
    pub params: Vec<MacroParam>,
    pub body: Vec<Node>,
    /// Snapshot of the defining scope. Macro bodies evaluate against a child
    /// of this, never against the caller's context.
    pub context: Context,
}

impl MacroValue {
    /// Binds call arguments into a fresh child of the definition context.
    ///
    /// Positional arguments bind to parameters in order, named arguments
    /// override, and parameters still unbound afterwards fall back to their
    /// defaults. Defaults are expressions, not values, so they are returned
    /// for the evaluator to resolve lazily against the call context.
    ///
    /// Errors: more positional arguments than parameters, a named argument
    /// that is not a parameter, or a missing parameter with no default.
    pub(crate) fn bind_call(
        &self,
        positional: Vec<Value>,
        named: IndexMap<String, Value>,
    ) -> Result<(Context, Vec<(String, ExprLoc)>), TemplateError> {
        if positional.len() > self.params.len() {
            return Err(TemplateError::macro_error(format!(
                "macro '{}' takes {} argument(s), got {}",
                self.name,
                self.params.len(),
                positional.len()
            )));
        }

        let mut scope = self.context.scoped();
        let mut bound: Vec<bool> = vec![false; self.params.len()];

        for (index, (param, value)) in self.params.iter().zip(positional).enumerate() {
            scope.set(param.name.clone(), value);
            bound[index] = true;
        }

        for (name, value) in named {
            let Some(index) = self.params.iter().position(|p| p.name == name) else {
                return Err(TemplateError::macro_error(format!(
                    "macro '{}' has no parameter '{name}'",
                    self.name
                )));
            };
            bound[index] = true;
            scope.set(name, value);
        }

        let mut lazy_defaults = Vec::new();
        for (param, is_bound) in self.params.iter().zip(&bound) {
            if *is_bound {
                continue;
            }
            match &param.default {
                Some(default) => lazy_defaults.push((param.name.clone(), default.clone())),
                None => {
                    return Err(TemplateError::macro_error(format!(
                        "macro '{}' missing required parameter '{}'",
                        self.name, param.name
                    )));
                }
            }
        }

        Ok((scope, lazy_defaults))
    }
}

/// The exported view of an imported template.
///
/// Immutable once extraction completes; repeated imports of the same
/// template share one instance through the environment's namespace cache.
#[derive(Debug)]
pub struct TemplateNamespace {
    pub template_name: String,
    pub macros: IndexMap<String, Arc<MacroValue>>,
    pub variables: IndexMap<String, Value>,
}

impl TemplateNamespace {
    /// Empty placeholder namespace, used for tolerant imports of templates
    /// the loader does not know.
    #[must_use]
    pub fn empty(template_name: impl Into<String>) -> Self {
        Self {
            template_name: template_name.into(),
            macros: IndexMap::new(),
            variables: IndexMap::new(),
        }
    }

    /// Resolves an exported symbol: macros win over variables.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Value> {
        if let Some(macro_value) = self.macros.get(name) {
            return Some(Value::Macro(Arc::clone(macro_value)));
        }
        self.variables.get(name).cloned()
    }
}

/// Walks a template body and collects its exports.
///
/// Top-level macros and `set` assignments are collected directly; the walk
/// also descends into `if`, `for`, and `block` bodies so conditionally
/// defined macros are discoverable. Each `set` value is evaluated eagerly
/// through `eval` against the namespace's private context; a failing
/// evaluation records a diagnostic placeholder instead of silently dropping
/// the name.
pub(crate) fn collect_exports(
    nodes: &[Node],
    scope: &mut Context,
    macros: &mut IndexMap<String, Arc<MacroValue>>,
    variables: &mut IndexMap<String, Value>,
    eval: &mut dyn FnMut(&ExprLoc, &Context) -> Result<Value, TemplateError>,
) {
    for node in nodes {
        match node {
            Node::Macro { name, params, body, .. } => {
                let macro_value = Arc::new(MacroValue {
                    name: name.clone(),
                    params: params.clone(),
                    body: body.clone(),
                    context: scope.clone(),
                });
                scope.set(name.clone(), Value::Macro(Arc::clone(&macro_value)));
                macros.insert(name.clone(), macro_value);
            }
            Node::Set {
                target: AssignTarget::Name(name),
                value,
                ..
            } => {
                let resolved = match eval(value, scope) {
                    Ok(value) => value,
                    Err(err) => {
                        tracing::warn!(name = %name, error = %err, "namespace variable failed to evaluate");
                        Value::undefined(format!("{name}: {err}"))
                    }
                };
                scope.set(name.clone(), resolved.clone());
                variables.insert(name.clone(), resolved);
            }
            Node::If { body, elifs, or_else, .. } => {
                collect_exports(body, scope, macros, variables, eval);
                for (_, elif_body) in elifs {
                    collect_exports(elif_body, scope, macros, variables, eval);
                }
                collect_exports(or_else, scope, macros, variables, eval);
            }
            Node::For { body, or_else, .. } => {
                collect_exports(body, scope, macros, variables, eval);
                collect_exports(or_else, scope, macros, variables, eval);
            }
            Node::Block { body, .. } => {
                collect_exports(body, scope, macros, variables, eval);
            }
            _ => {}
        }
    }
}
