//! Statement-level AST types.
//!
//! A template is a [`Node::Template`] whose body is a node list; the
//! evaluator walks it top to bottom and concatenates each node's rendered
//! output. Expression types live in [`crate::expressions`].

use std::{fmt, sync::Arc};

use serde::{Deserialize, Serialize};

use crate::{
    context::ContextWrapper,
    exception::TemplateError,
    expressions::{CodeRange, ExprLoc, UnpackTarget},
    value::Value,
};

/// One macro parameter: a name plus an optional default expression.
///
/// Defaults are stored unevaluated and resolved lazily against the macro
/// call context, so a default may reference earlier parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MacroParam {
    pub name: String,
    pub default: Option<ExprLoc>,
}

impl MacroParam {
    #[must_use]
    pub fn required(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            default: None,
        }
    }

    #[must_use]
    pub fn with_default(name: impl Into<String>, default: ExprLoc) -> Self {
        Self {
            name: name.into(),
            default: Some(default),
        }
    }
}

/// Assignment target of a `set` statement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AssignTarget {
    /// `{% set name = ... %}` - binds in the active context.
    Name(String),
    /// `{% set obj.attr = ... %}` - mutates an attribute on an object.
    Attr { object: ExprLoc, attr: String },
    /// `{% set obj[key] = ... %}` - mutates an item of a dict or sequence.
    Item { object: ExprLoc, index: ExprLoc },
}

/// User-supplied evaluator for an [`Node::Extension`] tag.
///
/// Wrapped in a newtype so the AST keeps its derived `Debug`/`Clone` and
/// serde support: the callback is process-local state and is skipped during
/// serialization (a deserialized extension node has no evaluator and renders
/// as `ExtensionError`).
#[derive(Clone)]
pub struct ExtensionEval(
    pub Arc<dyn Fn(&Node, &mut ContextWrapper) -> Result<Value, TemplateError> + Send + Sync>,
);

impl fmt::Debug for ExtensionEval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ExtensionEval(..)")
    }
}

/// A statement node in the template AST.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Node {
    /// Root of a template: its name and body.
    Template { name: String, body: Vec<Node> },
    /// Literal text emitted verbatim.
    Text { content: String, position: CodeRange },
    /// Output statement: `{{ expr }}`. The value is coerced to string and
    /// passed through the autoescaper when one is installed.
    Variable { expr: ExprLoc },
    /// Conditional: main branch, `elif` ladder in source order, `else` body.
    If {
        test: ExprLoc,
        body: Vec<Node>,
        elifs: Vec<(ExprLoc, Vec<Node>)>,
        or_else: Vec<Node>,
        position: CodeRange,
    },
    /// For loop with optional `else` body.
    ///
    /// The `else` body renders only when the iterable was empty or the loop
    /// completed without `break`.
    For {
        target: UnpackTarget,
        iter: ExprLoc,
        body: Vec<Node>,
        or_else: Vec<Node>,
        position: CodeRange,
    },
    /// Exits the innermost loop.
    Break { position: CodeRange },
    /// Advances the innermost loop to its next iteration.
    Continue { position: CodeRange },
    /// Assignment: `{% set target = value %}`.
    Set {
        target: AssignTarget,
        value: ExprLoc,
        position: CodeRange,
    },
    /// Macro definition. Binds a macro value closing over the context as it
    /// is at the point of definition.
    Macro {
        name: String,
        params: Vec<MacroParam>,
        body: Vec<Node>,
        position: CodeRange,
    },
    /// Named block, overridable by derived templates.
    Block {
        name: String,
        body: Vec<Node>,
        position: CodeRange,
    },
    /// Declares the parent template. Must appear in the template body before
    /// any block it expects to override.
    Extends { parent: String, position: CodeRange },
    /// Renders another template inline with the current context.
    Include {
        name: String,
        ignore_missing: bool,
        position: CodeRange,
    },
    /// `{% import "name" as alias %}` - binds the template's namespace.
    Import {
        template: String,
        alias: String,
        position: CodeRange,
    },
    /// `{% from "name" import a, b as c %}` - binds selected exports.
    FromImport {
        template: String,
        /// `(exported_name, local_alias)` pairs; `None` keeps the name.
        names: Vec<(String, Option<String>)>,
        position: CodeRange,
    },
    /// `{% call macro(...) %}body{% endcall %}` - invokes a macro with the
    /// body exposed to it as the `caller` binding.
    CallBlock {
        call: ExprLoc,
        body: Vec<Node>,
        position: CodeRange,
    },
    /// Custom tag evaluated through a host-provided callback.
    Extension {
        tag: String,
        #[serde(skip)]
        evaluator: Option<ExtensionEval>,
        position: CodeRange,
    },
}

impl Node {
    /// Position of the node, for error reporting. Container nodes without a
    /// recorded position report the origin.
    #[must_use]
    pub fn position(&self) -> CodeRange {
        match self {
            Self::Template { .. } => CodeRange::default(),
            Self::Variable { expr } => expr.position,
            Self::Text { position, .. }
            | Self::If { position, .. }
            | Self::For { position, .. }
            | Self::Break { position }
            | Self::Continue { position }
            | Self::Set { position, .. }
            | Self::Macro { position, .. }
            | Self::Block { position, .. }
            | Self::Extends { position, .. }
            | Self::Include { position, .. }
            | Self::Import { position, .. }
            | Self::FromImport { position, .. }
            | Self::CallBlock { position, .. }
            | Self::Extension { position, .. } => *position,
        }
    }

    /// Template name when this is a root node.
    #[must_use]
    pub fn template_name(&self) -> Option<&str> {
        match self {
            Self::Template { name, .. } => Some(name),
            _ => None,
        }
    }

    /// Body slice for root nodes; other nodes yield themselves as a
    /// single-element slice so entry points accept either shape.
    #[must_use]
    pub fn top_level_body(&self) -> &[Self] {
        match self {
            Self::Template { body, .. } => body,
            other => std::slice::from_ref(other),
        }
    }

    /// The parent template name, when the body declares one.
    #[must_use]
    pub(crate) fn extends_parent(&self) -> Option<&str> {
        self.top_level_body().iter().find_map(|node| match node {
            Self::Extends { parent, .. } => Some(parent.as_str()),
            _ => None,
        })
    }
}
