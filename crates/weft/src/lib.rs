//! A tree-walking evaluation core for Jinja-style templates.
//!
//! The crate consumes a pre-parsed template AST ([`Node`]/[`Expr`]) plus a
//! variable [`Context`] and renders a string. It covers expression and
//! control-flow evaluation, filter chains, macros and imports, template
//! inheritance with TTL/LRU caching, and autoescape-aware output. Lexing and
//! parsing template source into the AST is a collaborator's job, as is
//! loading template source ([`TemplateLoader`] receives names and returns
//! ASTs).
//!
//! ```
//! use weft::{Context, Environment, ExprLoc, Expr, MemoryLoader, Node, Value};
//!
//! let template = Node::Template {
//!     name: "hello".to_owned(),
//!     body: vec![Node::Variable {
//!         expr: ExprLoc::at_origin(Expr::Name("name".to_owned())),
//!     }],
//! };
//! let env = Environment::new(MemoryLoader::new().with("hello", template));
//!
//! let mut context = Context::new();
//! context.set("name", Value::from("world"));
//! assert_eq!(env.render("hello", context).unwrap(), "world");
//! ```

mod cache;
mod context;
mod ctx_hash;
mod environment;
mod escape;
mod eval;
mod exception;
mod expressions;
mod filters;
mod inherit;
mod loader;
mod namespace;
mod nodes;
mod run;
mod testers;
mod types;
mod undefined;
mod value;

pub use crate::{
    cache::{CacheStats, TtlCache},
    context::{Context, ContextWrapper},
    ctx_hash::hash_context,
    environment::{CACHE_CAPACITY, Environment, FilterJob, HIERARCHY_CACHE_TTL, RESOLVED_CACHE_TTL},
    escape::{AutoEscaper, DefaultEscaper, EscapeContext, escape_css, escape_html, escape_js_string, escape_url},
    exception::{ErrorKind, TemplateError},
    expressions::{
        CallArgs, CmpOperator, CodeRange, Expr, ExprLoc, Literal, LogicOperator, Operator, UnpackTarget,
    },
    filters::{FilterFn, FilterRegistry},
    inherit::{InheritanceHierarchy, ResolvedTemplate},
    loader::{MemoryLoader, TemplateLoader},
    namespace::{MacroValue, TemplateNamespace},
    nodes::{AssignTarget, ExtensionEval, MacroParam, Node},
    testers::{TestFn, TestRegistry},
    types::{Cycler, joiner},
    undefined::{UndefinedPolicy, set_undefined_policy, undefined_policy},
    value::{AttrAccess, HostFunction, Value},
};
