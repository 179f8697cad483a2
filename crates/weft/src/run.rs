//! Statement evaluation and the render entry point.
//!
//! [`Renderer`] walks a template's node list and appends each node's output
//! to a shared buffer. Control flow travels the error channel: `break` and
//! `continue` raise typed signals that the nearest enclosing for-loop
//! intercepts, which keeps output produced earlier in the iteration intact.
//! Expression evaluation lives in [`crate::eval`].

use std::sync::Arc;

use tracing::trace;

use crate::{
    context::ContextWrapper,
    environment::Environment,
    escape::apply_escaping,
    exception::{RenderError, RenderResult, TemplateError},
    expressions::{CodeRange, Expr, ExprLoc, UnpackTarget},
    inherit::InheritanceHierarchy,
    namespace::MacroValue,
    nodes::{AssignTarget, Node},
    types::loop_info,
    value::Value,
};

/// One render in progress: the environment plus the inheritance state needed
/// for `super()` resolution.
pub(crate) struct Renderer<'env> {
    pub(crate) env: &'env Environment,
    /// Hierarchy of the template being rendered, when it was resolved
    /// through the inheritance path.
    pub(crate) hierarchy: Option<Arc<InheritanceHierarchy>>,
    /// `(block name, definition depth)` for each block currently rendering;
    /// `super()` reads the top entry.
    pub(crate) block_stack: Vec<(String, usize)>,
    template_name: Option<String>,
}

impl<'env> Renderer<'env> {
    pub(crate) fn new(env: &'env Environment) -> Self {
        Self {
            env,
            hierarchy: None,
            block_stack: Vec::new(),
            template_name: None,
        }
    }

    pub(crate) fn for_template(
        env: &'env Environment,
        hierarchy: Option<Arc<InheritanceHierarchy>>,
        template_name: &str,
    ) -> Self {
        Self {
            env,
            hierarchy,
            block_stack: Vec::new(),
            template_name: Some(template_name.to_owned()),
        }
    }

    /// Renders a template root to completion.
    ///
    /// This is the boundary where internal errors become public ones: a
    /// control signal arriving here had no enclosing loop and surfaces as a
    /// `SyntaxError`.
    pub(crate) fn render_entry(&mut self, node: &Node, ctx: &mut ContextWrapper) -> Result<String, TemplateError> {
        trace!(template = self.template_name.as_deref().unwrap_or("<anonymous>"), "render start");
        let mut out = String::new();
        self.render_nodes(node.top_level_body(), ctx, &mut out)
            .map_err(|err| {
                let err = err.into_template_error();
                match &self.template_name {
                    Some(name) => err.in_template(name),
                    None => err,
                }
            })?;
        Ok(out)
    }

    /// Renders a node list in order, halting on the first error or signal.
    pub(crate) fn render_nodes(
        &mut self,
        nodes: &[Node],
        ctx: &mut ContextWrapper,
        out: &mut String,
    ) -> RenderResult<()> {
        for node in nodes {
            self.render_node(node, ctx, out)?;
        }
        Ok(())
    }

    /// Renders a node list into a fresh buffer. Used where output must be
    /// captured rather than appended: blocks via `super()`, macro bodies,
    /// call-block bodies.
    pub(crate) fn render_to_string(&mut self, nodes: &[Node], ctx: &mut ContextWrapper) -> RenderResult<String> {
        let mut out = String::new();
        self.render_nodes(nodes, ctx, &mut out)?;
        Ok(out)
    }

    fn render_node(&mut self, node: &Node, ctx: &mut ContextWrapper, out: &mut String) -> RenderResult<()> {
        match node {
            Node::Template { body, .. } => self.render_nodes(body, ctx, out),
            Node::Text { content, .. } => {
                out.push_str(content);
                Ok(())
            }
            Node::Variable { expr } => {
                let value = self.eval_expr(expr, ctx)?;
                self.emit(&value, ctx, out);
                Ok(())
            }
            Node::If {
                test,
                body,
                elifs,
                or_else,
                ..
            } => self.render_if(test, body, elifs, or_else, ctx, out),
            Node::For {
                target,
                iter,
                body,
                or_else,
                position,
            } => self.render_for(target, iter, body, or_else, *position, ctx, out),
            Node::Break { position } => Err(RenderError::Break(*position)),
            Node::Continue { position } => Err(RenderError::Continue(*position)),
            Node::Set { target, value, position } => {
                let value = self.eval_expr(value, ctx)?;
                self.assign(target, value, *position, ctx)
            }
            Node::Macro {
                name, params, body, ..
            } => {
                // the macro closes over the context as it is right now
                let macro_value = Arc::new(MacroValue {
                    name: name.clone(),
                    params: params.clone(),
                    body: body.clone(),
                    context: ctx.context().clone(),
                });
                ctx.set(name.clone(), Value::Macro(macro_value));
                Ok(())
            }
            Node::Block { name, body, .. } => self.render_block(name, body, ctx, out),
            // consumed during inheritance resolution; inert when a root
            // template is rendered directly
            Node::Extends { .. } => Ok(()),
            Node::Include {
                name,
                ignore_missing,
                position,
            } => self.render_include(name, *ignore_missing, *position, ctx, out),
            Node::Import {
                template,
                alias,
                position,
            } => {
                let namespace = self.env.namespace_for(template).map_err(|err| RenderError::from(err.at(*position)))?;
                ctx.set(alias.clone(), Value::Namespace(namespace));
                Ok(())
            }
            Node::FromImport {
                template,
                names,
                position,
            } => {
                let namespace = self.env.namespace_for(template).map_err(|err| RenderError::from(err.at(*position)))?;
                for (export, alias) in names {
                    let value = namespace.get(export).ok_or_else(|| {
                        RenderError::from(
                            TemplateError::undefined(&format!("{template}::{export}")).at(*position),
                        )
                    })?;
                    ctx.set(alias.clone().unwrap_or_else(|| export.clone()), value);
                }
                Ok(())
            }
            Node::CallBlock { call, body, position } => self.render_call_block(call, body, *position, ctx, out),
            Node::Extension {
                tag,
                evaluator,
                position,
            } => {
                let Some(evaluator) = evaluator else {
                    return Err(RenderError::from(
                        TemplateError::extension_error(format!("no evaluator registered for tag '{tag}'"))
                            .at(*position),
                    ));
                };
                let value = (evaluator.0)(node, ctx).map_err(|err| RenderError::from(err.at(*position)))?;
                self.emit(&value, ctx, out);
                Ok(())
            }
        }
    }

    /// Applies the escaping policy and appends the value to the output.
    fn emit(&self, value: &Value, ctx: &ContextWrapper, out: &mut String) {
        let escaper = ctx.auto_escaper().map(|escaper| &**escaper);
        out.push_str(&apply_escaping(value, escaper, ctx.escape_context()));
    }

    fn render_if(
        &mut self,
        test: &ExprLoc,
        body: &[Node],
        elifs: &[(ExprLoc, Vec<Node>)],
        or_else: &[Node],
        ctx: &mut ContextWrapper,
        out: &mut String,
    ) -> RenderResult<()> {
        if self.eval_expr(test, ctx)?.truthy() {
            return self.render_nodes(body, ctx, out);
        }
        for (condition, elif_body) in elifs {
            if self.eval_expr(condition, ctx)?.truthy() {
                return self.render_nodes(elif_body, ctx, out);
            }
        }
        self.render_nodes(or_else, ctx, out)
    }

    /// The for-loop state machine.
    ///
    /// Empty iterable renders the `else` body. Otherwise the body runs once
    /// per item inside one scoped child context, with the loop variable(s)
    /// and a fresh `loop` info dict bound each iteration. `break` ends the
    /// loop, `continue` advances it; after a `break` the `else` body does
    /// not run.
    #[expect(clippy::too_many_arguments, reason = "mirrors the node's fields")]
    fn render_for(
        &mut self,
        target: &UnpackTarget,
        iter: &ExprLoc,
        body: &[Node],
        or_else: &[Node],
        position: CodeRange,
        ctx: &mut ContextWrapper,
        out: &mut String,
    ) -> RenderResult<()> {
        let iterable = self.eval_expr(iter, ctx)?;
        let items = iterable
            .make_iterable_for_unpack(target.arity())
            .map_err(|err| RenderError::from(err.at(iter.position)))?;

        let mut scope = ctx.scoped();
        if items.is_empty() {
            return self.render_nodes(or_else, &mut scope, out);
        }

        let length = items.len();
        let mut broke = false;
        for (index, item) in items.into_iter().enumerate() {
            bind_unpack(&mut scope, target, item, position)?;
            scope.set("loop", loop_info(index, length));
            match self.render_nodes(body, &mut scope, out) {
                Ok(()) => {}
                Err(RenderError::Break(_)) => {
                    broke = true;
                    break;
                }
                Err(RenderError::Continue(_)) => {}
                Err(err) => return Err(err),
            }
        }

        // `else` runs only on natural, unbroken completion
        if !broke {
            self.render_nodes(or_else, &mut scope, out)?;
        }
        Ok(())
    }

    fn render_block(&mut self, name: &str, body: &[Node], ctx: &mut ContextWrapper, out: &mut String) -> RenderResult<()> {
        self.block_stack.push((name.to_owned(), 0));
        let mut scope = ctx.scoped();
        let result = self.render_nodes(body, &mut scope, out);
        self.block_stack.pop();
        result
    }

    fn render_include(
        &mut self,
        name: &str,
        ignore_missing: bool,
        position: CodeRange,
        ctx: &mut ContextWrapper,
        out: &mut String,
    ) -> RenderResult<()> {
        if ignore_missing && !self.env.loader().template_exists(name) {
            return Ok(());
        }
        let (resolved, hierarchy) = self
            .env
            .resolve(name, ctx.context())
            .map_err(|err| RenderError::from(err.at(position)))?;

        // the included template renders with its own inheritance state but
        // sees the caller's variables
        let mut sub = Renderer::for_template(self.env, Some(hierarchy), name);
        let mut scope = ctx.scoped();
        let rendered = sub
            .render_entry(&resolved.node, &mut scope)
            .map_err(|err| RenderError::from(err.at(position)))?;
        out.push_str(&rendered);
        Ok(())
    }

    fn render_call_block(
        &mut self,
        call: &ExprLoc,
        body: &[Node],
        position: CodeRange,
        ctx: &mut ContextWrapper,
        out: &mut String,
    ) -> RenderResult<()> {
        let Expr::Call { callable, args } = &call.expr else {
            return Err(RenderError::from(
                TemplateError::type_error("call block expects a macro call").at(position),
            ));
        };

        let target = self.eval_expr(callable, ctx)?;
        let Value::Macro(macro_value) = target else {
            return Err(RenderError::from(
                TemplateError::macro_error(format!(
                    "call block target is {}, expected a macro",
                    target.type_name()
                ))
                .at(position),
            ));
        };

        // expose the body as a zero-parameter macro under the `caller` name
        let caller = Value::Macro(Arc::new(MacroValue {
            name: "caller".to_owned(),
            params: Vec::new(),
            body: body.to_vec(),
            context: ctx.context().clone(),
        }));

        let (positional, named) = self.eval_call_args(args, ctx)?;
        let value = self.call_macro(&macro_value, positional, named, Some(caller), ctx, position)?;
        self.emit(&value, ctx, out);
        Ok(())
    }

    /// Executes a `set` statement against its target kind.
    fn assign(
        &mut self,
        target: &AssignTarget,
        value: Value,
        position: CodeRange,
        ctx: &mut ContextWrapper,
    ) -> RenderResult<()> {
        match target {
            AssignTarget::Name(name) => {
                ctx.set(name.clone(), value);
                Ok(())
            }
            AssignTarget::Attr { object, attr } => {
                self.assign_path(object, PathSeg::Attr(attr.clone()), value, position, ctx)
            }
            AssignTarget::Item { object, index } => {
                let key = self.eval_expr(index, ctx)?;
                self.assign_path(object, PathSeg::Item(key), value, position, ctx)
            }
        }
    }

    /// Writes through an attribute/item path rooted at a context variable.
    ///
    /// Values have clone semantics, so the write fetches the root, rebuilds
    /// the nested value, and stores the root back. Paths not rooted at an
    /// identifier have nowhere to store to and are a `TypeError`.
    fn assign_path(
        &mut self,
        object: &ExprLoc,
        leaf: PathSeg,
        value: Value,
        position: CodeRange,
        ctx: &mut ContextWrapper,
    ) -> RenderResult<()> {
        let mut segments = vec![leaf];
        let mut cursor = object;
        let root = loop {
            match &cursor.expr {
                Expr::Name(name) => break name.clone(),
                Expr::AttrGet { object, attr } => {
                    segments.push(PathSeg::Attr(attr.clone()));
                    cursor = object;
                }
                Expr::Subscript { object, index } => {
                    let key = self.eval_expr(index, ctx)?;
                    segments.push(PathSeg::Item(key));
                    cursor = object;
                }
                _ => {
                    return Err(RenderError::from(
                        TemplateError::type_error("cannot assign to this expression").at(position),
                    ));
                }
            }
        };
        segments.reverse();

        let mut root_value = ctx
            .get(&root)
            .cloned()
            .ok_or_else(|| RenderError::from(TemplateError::undefined(&root).at(position)))?;
        write_path(&mut root_value, &segments, value).map_err(|err| RenderError::from(err.at(position)))?;
        ctx.set(root, root_value);
        Ok(())
    }
}

/// One step of an assignment path.
enum PathSeg {
    Attr(String),
    Item(Value),
}

fn write_path(target: &mut Value, segments: &[PathSeg], value: Value) -> Result<(), TemplateError> {
    let Some((head, rest)) = segments.split_first() else {
        *target = value;
        return Ok(());
    };

    match (target, head) {
        (Value::Dict(map), PathSeg::Attr(key)) => {
            if rest.is_empty() {
                map.insert(key.clone(), value);
                Ok(())
            } else {
                let entry = map
                    .get_mut(key)
                    .ok_or_else(|| TemplateError::undefined(key))?;
                write_path(entry, rest, value)
            }
        }
        (Value::Dict(map), PathSeg::Item(key)) => {
            let key = key.to_string();
            if rest.is_empty() {
                map.insert(key, value);
                Ok(())
            } else {
                let entry = map
                    .get_mut(&key)
                    .ok_or_else(|| TemplateError::undefined(&key))?;
                write_path(entry, rest, value)
            }
        }
        (Value::List(items), PathSeg::Item(index)) => {
            let raw = index
                .as_index()
                .ok_or_else(|| TemplateError::type_error("list indices must be integers"))?;
            let len = items.len() as i64;
            let normalized = if raw < 0 { raw + len } else { raw };
            if normalized < 0 || normalized >= len {
                return Err(TemplateError::value_error(format!(
                    "assignment index {raw} out of range for list of length {len}"
                )));
            }
            write_path(&mut items[normalized as usize], rest, value)
        }
        (other, _) => Err(TemplateError::type_error(format!(
            "cannot assign into value of type {}",
            other.type_name()
        ))),
    }
}

/// Binds a loop item to the target variable(s).
///
/// A tuple target requires the item itself to be iterable with exactly as
/// many elements as there are variables.
pub(crate) fn bind_unpack(
    scope: &mut ContextWrapper,
    target: &UnpackTarget,
    item: Value,
    position: CodeRange,
) -> RenderResult<()> {
    match target {
        UnpackTarget::Name(name) => {
            scope.set(name.clone(), item);
            Ok(())
        }
        UnpackTarget::Tuple {
            targets,
            position: target_position,
        } => {
            let position = if *target_position == CodeRange::default() {
                position
            } else {
                *target_position
            };
            let parts = item.make_iterable().map_err(|_| {
                RenderError::from(
                    TemplateError::unpack_error(format!(
                        "cannot unpack non-iterable {} value",
                        item.type_name()
                    ))
                    .at(position),
                )
            })?;
            if parts.len() != targets.len() {
                return Err(RenderError::from(
                    TemplateError::unpack_arity(parts.len(), targets.len()).at(position),
                ));
            }
            for (name, part) in targets.iter().zip(parts) {
                scope.set(name.clone(), part);
            }
            Ok(())
        }
    }
}
